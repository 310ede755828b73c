//! Minimal echo client: connects, sends one `ChatMessage`, prints whatever
//! the server echoes back, then disconnects after a short grace period.
//! Mirrors `examples/basic_clientserver/client.py`'s connect-send-update loop.

use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use relaynet::codec::builtin::registry_with_builtins;
use relaynet::codec::downcast;
use relaynet::endpoint::{Client, ClientState};
use relaynet::{logging, EndpointConfig};

#[path = "messages.rs"]
mod messages;
use messages::ChatMessage;

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:29050";
const GRACE_PERIOD: Duration = Duration::from_secs(2);

fn main() {
    let mut args = env::args().skip(1);
    let server_addr = args.next().unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
    let text = args.collect::<Vec<_>>().join(" ");
    let text = if text.is_empty() { "hello from echo-client".to_string() } else { text };

    let logger = logging::terminal("info");

    let mut registry = registry_with_builtins();
    registry.add::<ChatMessage>().expect("ChatMessage registers once");

    let mut client = Client::connect_with_logger(&server_addr, Arc::new(registry), &EndpointConfig::default(), logger)
        .unwrap_or_else(|err| panic!("failed to start connecting to {server_addr}: {err}"));

    client.on_connect_request_accepted(|| println!("connected"));
    client.on_connect_request_rejected(|| eprintln!("connection rejected"));
    client.on_message(|message| {
        if let Some(echoed) = downcast::<ChatMessage>(message.as_ref()) {
            println!("echo: {}", echoed.text);
        }
    });

    let mut sent = false;
    let mut grace_deadline: Option<Instant> = None;

    loop {
        client.update();

        match client.state() {
            ClientState::Connected if !sent => {
                client.send_reliable_message(&ChatMessage { text: text.clone() }).expect("send failed");
                sent = true;
                grace_deadline = Some(Instant::now() + GRACE_PERIOD);
            }
            ClientState::Errored => {
                eprintln!("connection to {server_addr} errored");
                std::process::exit(1);
            }
            ClientState::Disconnected if sent => return,
            _ => {}
        }

        if let Some(deadline) = grace_deadline {
            if Instant::now() >= deadline {
                let _ = client.disconnect();
                return;
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}
