use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{App, Arg};

use relaynet::codec::builtin::registry_with_builtins;
use relaynet::endpoint::Client;
use relaynet::endpoint::ClientState;
use relaynet::{logging, EndpointConfig};

/// Connects to a `relaynet` server and reports the handshake outcome and
/// latency, for exercising a deployment without writing a throwaway client.
fn main() {
    let matches = App::new("relaynet Probe")
        .version("1.0")
        .author("relaynet contributors")
        .about("Connects to a relaynet server and reports connection state and latency.")
        .arg(Arg::with_name("SERVER_ADDR").help("host:port of the server to probe").required(true))
        .arg(
            Arg::with_name("timeout-secs")
                .long("timeout-secs")
                .takes_value(true)
                .help("give up after this many seconds without reaching CONNECTED (default 5)"),
        )
        .get_matches();

    let server_addr = matches.value_of("SERVER_ADDR").unwrap();
    let give_up_after: u64 = matches
        .value_of("timeout-secs")
        .map(|value| value.parse().expect("timeout-secs must be an integer"))
        .unwrap_or(5);

    let logger = logging::terminal("info");
    let registry = Arc::new(registry_with_builtins());
    let config = EndpointConfig::default();

    let mut client = Client::connect_with_logger(server_addr, registry, &config, logger)
        .unwrap_or_else(|err| panic!("failed to start connecting to {server_addr}: {err}"));

    let deadline = std::time::Instant::now() + Duration::from_secs(give_up_after);
    loop {
        client.update();
        match client.state() {
            ClientState::Connected => {
                println!("connected to {server_addr}, latency = {:?}", client.latency());
                return;
            }
            ClientState::Errored => {
                eprintln!("connection to {server_addr} errored before completing the handshake");
                std::process::exit(1);
            }
            ClientState::Disconnected => {
                eprintln!("connection to {server_addr} was rejected");
                std::process::exit(1);
            }
            ClientState::Connecting => {}
        }

        if std::time::Instant::now() >= deadline {
            eprintln!("timed out waiting for {server_addr} to accept the connection");
            std::process::exit(1);
        }
        thread::sleep(Duration::from_millis(5));
    }
}
