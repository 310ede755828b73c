//! Minimal echo server: accepts any connection, echoes every `ChatMessage`
//! back to its sender. Mirrors `examples/basic_clientserver/server.py`'s
//! listen-update-sleep loop, adapted to callback-driven events.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use relaynet::codec::builtin::registry_with_builtins;
use relaynet::codec::downcast;
use relaynet::endpoint::Server;
use relaynet::{logging, EndpointConfig};

#[path = "messages.rs"]
mod messages;
use messages::ChatMessage;

const LISTEN_ADDR: &str = "0.0.0.0:29050";
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

fn main() {
    let logger = logging::terminal("info");

    let mut registry = registry_with_builtins();
    registry.add::<ChatMessage>().expect("ChatMessage registers once");

    let mut server = Server::listen_with_logger(LISTEN_ADDR, Arc::new(registry), EndpointConfig::default(), logger)
        .unwrap_or_else(|err| panic!("failed to listen on {LISTEN_ADDR}: {err}"));

    println!("echo-server listening on {}", server.local_addr().unwrap());

    // `on_message` cannot hand back a `&mut Server` to send the echo from
    // inside the callback (see DESIGN.md), so it stashes what arrived and
    // the main loop sends the replies once `update` returns.
    let pending: Rc<RefCell<Vec<(SocketAddr, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let pending_handle = pending.clone();
    server.on_message(move |peer, message| {
        if let Some(chat) = downcast::<ChatMessage>(message.as_ref()) {
            pending_handle.borrow_mut().push((peer, chat.text.clone()));
        }
    });
    server.on_disconnect(|peer| println!("{peer} disconnected"));

    let mut last_status = Instant::now();
    loop {
        server.update();

        for (peer, text) in pending.borrow_mut().drain(..) {
            println!("{peer}: {text}");
            if let Err(err) = server.send_reliable_message(peer, &ChatMessage { text }) {
                eprintln!("failed to echo back to {peer}: {err}");
            }
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            let stats = server.stats();
            println!("peers={} in_bytes={} out_bytes={}", stats.peer_count, stats.in_bytes, stats.out_bytes);
        }

        thread::sleep(Duration::from_millis(5));
    }
}
