use std::fmt;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use slog::{warn, Logger};

use crate::codec::builtin::{ConnectRequest, ConnectRequestAccepted, ConnectRequestRejected, PROTOCOL_VERSION};
use crate::codec::{AnyMessage, BoxedMessage, Message, MessageRegistry};
use crate::config::EndpointConfig;
use crate::connection::{Connection, ConnectionEvent};
use crate::error::{TransportError, TransportResult};
use crate::logging;

/// Where a [`Client`] is in its connection lifecycle. Mirrors
/// `legume.udp.client.Client`'s `CONNECTING`/`CONNECTED`/`DISCONNECTED`/
/// `ERRORED` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// A `std::net::UdpSocket` connected to a single server, driving one
/// [`Connection`] and dispatching its lifecycle to registered callbacks
/// rather than a polled event queue — `on_xxx(handler)`, mirroring
/// `legume.udp.client.Client.OnMessage`/`OnConnectRequestAccepted`/etc,
/// minus the weak-reference event-object machinery.
pub struct Client {
    socket: UdpSocket,
    registry: Arc<MessageRegistry>,
    connection: Connection,
    state: ClientState,
    disconnecting: bool,
    logger: Logger,

    on_connect_request_accepted: Option<Box<dyn FnMut()>>,
    on_connect_request_rejected: Option<Box<dyn FnMut()>>,
    on_message: Option<Box<dyn FnMut(BoxedMessage)>>,
    on_disconnect: Option<Box<dyn FnMut()>>,
    on_error: Option<Box<dyn FnMut(&TransportError)>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("socket", &self.socket)
            .field("registry", &self.registry)
            .field("connection", &self.connection)
            .field("state", &self.state)
            .field("disconnecting", &self.disconnecting)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Validates `addr`, opens a non-blocking socket, queues a reliable
    /// `ConnectRequest`, and enters `Connecting`. Re-calling `connect` on an
    /// already-active client is a *client error*; that check lives on the
    /// caller side here since a fresh `Client` is always inactive.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        registry: Arc<MessageRegistry>,
        config: &EndpointConfig,
    ) -> TransportResult<Client> {
        Client::connect_with_logger(addr, registry, config, logging::discard())
    }

    pub fn connect_with_logger<A: ToSocketAddrs>(
        addr: A,
        registry: Arc<MessageRegistry>,
        config: &EndpointConfig,
        logger: Logger,
    ) -> TransportResult<Client> {
        let server_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Argument("no address resolved for server".into()))?;
        if server_addr.port() == 0 {
            return Err(TransportError::Argument(format!("{} is not a valid port", server_addr.port())));
        }

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        socket.connect(server_addr)?;

        let mut connection = Connection::new(false, config, logger.clone());
        connection.send_reliable(&ConnectRequest { protocol: PROTOCOL_VERSION })?;

        Ok(Client {
            socket,
            registry,
            connection,
            state: ClientState::Connecting,
            disconnecting: false,
            logger,
            on_connect_request_accepted: None,
            on_connect_request_rejected: None,
            on_message: None,
            on_disconnect: None,
            on_error: None,
        })
    }

    pub fn on_connect_request_accepted(&mut self, handler: impl FnMut() + 'static) {
        self.on_connect_request_accepted = Some(Box::new(handler));
    }

    pub fn on_connect_request_rejected(&mut self, handler: impl FnMut() + 'static) {
        self.on_connect_request_rejected = Some(Box::new(handler));
    }

    pub fn on_message(&mut self, handler: impl FnMut(BoxedMessage) + 'static) {
        self.on_message = Some(Box::new(handler));
    }

    pub fn on_disconnect(&mut self, handler: impl FnMut() + 'static) {
        self.on_disconnect = Some(Box::new(handler));
    }

    pub fn on_error(&mut self, handler: impl FnMut(&TransportError) + 'static) {
        self.on_error = Some(Box::new(handler));
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    pub fn latency(&self) -> std::time::Duration {
        self.connection.latency()
    }

    pub fn latency_ms(&self) -> u64 {
        self.connection.latency_ms()
    }

    /// Queues `message` for delivery exactly once, with no retry on loss.
    /// *Client error* unless [`ClientState::Connected`].
    pub fn send_message<T: Message>(&mut self, message: &T) -> TransportResult<usize> {
        self.require_connected()?;
        self.connection.send(message)
    }

    /// Queues `message` for retransmission until the server acknowledges it.
    pub fn send_reliable_message<T: Message>(&mut self, message: &T) -> TransportResult<usize> {
        self.require_connected()?;
        self.connection.send_reliable(message)
    }

    /// Queues `message` for retransmission and in-order delivery relative to
    /// other ordered messages sent on this connection.
    pub fn send_ordered_message<T: Message>(&mut self, message: &T) -> TransportResult<usize> {
        self.require_connected()?;
        self.connection.send_ordered(message)
    }

    /// Queues a graceful `Disconnected` notice and enters the disconnecting
    /// substate; `state()` stays `Connected` until `update` observes the
    /// outgoing queue has drained. Idempotent: a second call while already
    /// disconnected (or disconnecting) is a no-op.
    pub fn disconnect(&mut self) -> TransportResult<()> {
        if self.state == ClientState::Connected && !self.disconnecting {
            self.connection.disconnect()?;
            self.disconnecting = true;
        }
        Ok(())
    }

    fn require_connected(&self) -> TransportResult<()> {
        if self.state != ClientState::Connected {
            return Err(TransportError::Client(format!("cannot send while {:?}", self.state)));
        }
        Ok(())
    }

    /// Drains the socket, advances the connection by one tick, and fires
    /// whichever `on_xxx` callbacks the tick's events correspond to.
    /// Transport-level failures (timeout, a reset socket) surface through
    /// `on_error` rather than as a `Result`, per policy: programmer errors
    /// are synchronous, transport events are asynchronous.
    pub fn update(&mut self) {
        let mut buf = [0u8; 65_536];
        loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    if let Err(err) = self.connection.process_inbound_datagram(&self.registry, &buf[..n]) {
                        warn!(self.logger, "discarding malformed datagram"; "error" => %err);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == std::io::ErrorKind::ConnectionReset => continue,
                Err(err) => {
                    self.state = ClientState::Errored;
                    let transport_err = TransportError::from(err);
                    if let Some(handler) = self.on_error.as_mut() {
                        handler(&transport_err);
                    }
                    return;
                }
            }
        }

        let outcome = self.connection.update();
        for event in outcome.events {
            match event {
                ConnectionEvent::PeerDisconnected => {
                    self.state = ClientState::Disconnected;
                    if let Some(handler) = self.on_disconnect.as_mut() {
                        handler();
                    }
                }
                ConnectionEvent::Message(message) => match message.type_id() {
                    ConnectRequestAccepted::TYPE_ID => {
                        self.state = ClientState::Connected;
                        if let Some(handler) = self.on_connect_request_accepted.as_mut() {
                            handler();
                        }
                    }
                    ConnectRequestRejected::TYPE_ID => {
                        self.state = ClientState::Errored;
                        if let Some(handler) = self.on_connect_request_rejected.as_mut() {
                            handler();
                        }
                    }
                    _ => {
                        if let Some(handler) = self.on_message.as_mut() {
                            handler(message);
                        }
                    }
                },
            }
        }

        if outcome.timed_out {
            self.state = ClientState::Errored;
            if let Some(handler) = self.on_error.as_mut() {
                handler(&TransportError::TimedOut);
            }
        }

        for datagram in outcome.outbound_datagrams {
            if let Err(err) = self.socket.send(&datagram) {
                if err.kind() != std::io::ErrorKind::WouldBlock {
                    warn!(self.logger, "failed to send datagram"; "error" => %err);
                }
            }
        }

        if self.disconnecting && self.state == ClientState::Connected && !self.connection.has_outgoing() {
            self.state = ClientState::Disconnected;
            self.disconnecting = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::net::{SocketAddr, UdpSocket as RawSocket};
    use std::rc::Rc;
    use std::time::Duration;

    use crate::codec::builtin::{registry_with_builtins, MessageAck};
    use crate::codec::encode_message;
    use crate::frame::TransportHeader;

    fn registry() -> Arc<MessageRegistry> {
        Arc::new(registry_with_builtins())
    }

    #[test]
    fn connect_queues_a_connect_request_and_enters_connecting() {
        let client = Client::connect("127.0.0.1:1", registry(), &EndpointConfig::default()).unwrap();
        assert_eq!(client.state(), ClientState::Connecting);
        assert!(!client.connected());
    }

    #[test]
    fn sending_before_connected_is_rejected() {
        let mut client = Client::connect("127.0.0.1:1", registry(), &EndpointConfig::default()).unwrap();
        let err = client.send_message(&ConnectRequest { protocol: PROTOCOL_VERSION }).unwrap_err();
        assert!(matches!(err, TransportError::Client(_)));
    }

    #[test]
    fn port_zero_is_rejected_as_an_argument_error() {
        let err = Client::connect("127.0.0.1:0", registry(), &EndpointConfig::default()).unwrap_err();
        assert!(matches!(err, TransportError::Argument(_)));
    }

    /// Stands in for a server: a raw loopback socket that replies to
    /// whatever the client's first flushed datagram contains.
    fn recv_with_retry(socket: &RawSocket, buf: &mut [u8]) -> (usize, SocketAddr) {
        for _ in 0..200 {
            match socket.recv_from(buf) {
                Ok(result) => return result,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(err) => panic!("unexpected recv error: {err}"),
            }
        }
        panic!("timed out waiting for a datagram");
    }

    #[test]
    fn client_reaches_connected_on_accept() {
        let fake_server = RawSocket::bind("127.0.0.1:0").unwrap();
        fake_server.set_nonblocking(true).unwrap();
        let server_addr = fake_server.local_addr().unwrap();

        let accepted = Rc::new(RefCell::new(false));
        let accepted_handle = accepted.clone();

        let mut client = Client::connect(server_addr, registry(), &EndpointConfig::default()).unwrap();
        client.on_connect_request_accepted(move || *accepted_handle.borrow_mut() = true);

        client.update(); // flushes the ConnectRequest
        let mut buf = [0u8; 1024];
        let (_, client_addr) = recv_with_retry(&fake_server, &mut buf);

        let header = TransportHeader::new(1, 0, false, true);
        let mut reply = Vec::new();
        header.encode(&mut reply);
        reply.extend_from_slice(&encode_message(&ConnectRequestAccepted {}).unwrap());
        fake_server.send_to(&reply, client_addr).unwrap();

        for _ in 0..200 {
            client.update();
            if client.connected() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        assert!(client.connected());
        assert!(*accepted.borrow());
    }

    #[test]
    fn disconnect_stays_connected_until_outgoing_queue_drains() {
        let fake_server = RawSocket::bind("127.0.0.1:0").unwrap();
        fake_server.set_nonblocking(true).unwrap();
        let server_addr = fake_server.local_addr().unwrap();

        let mut client = Client::connect(server_addr, registry(), &EndpointConfig::default()).unwrap();

        client.update(); // flushes the ConnectRequest
        let mut buf = [0u8; 1024];
        let (_, client_addr) = recv_with_retry(&fake_server, &mut buf);

        let header = TransportHeader::new(1, 0, false, true);
        let mut reply = Vec::new();
        header.encode(&mut reply);
        reply.extend_from_slice(&encode_message(&ConnectRequestAccepted {}).unwrap());
        fake_server.send_to(&reply, client_addr).unwrap();

        for _ in 0..200 {
            client.update();
            if client.connected() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(client.connected());

        // The accept reply already queued an ack (message_id=2) that the
        // client flushed as part of the loop above; drain it so it doesn't
        // get mistaken for the Disconnected notice below.
        let mut drained = [0u8; 1024];
        recv_with_retry(&fake_server, &mut drained);

        // disconnect() queues a third, reliable Disconnected notice; it is
        // only flushed to the wire on the next update(), and the client
        // stays Connected until that notice is acknowledged.
        client.disconnect().unwrap();
        assert_eq!(client.state(), ClientState::Connected);
        client.update();
        assert_eq!(client.state(), ClientState::Connected);

        recv_with_retry(&fake_server, &mut drained);

        let header = TransportHeader::new(1, 0, false, true);
        let mut ack = Vec::new();
        header.encode(&mut ack);
        ack.extend_from_slice(&encode_message(&MessageAck { message_to_ack: 3 }).unwrap());
        fake_server.send_to(&ack, client_addr).unwrap();

        for _ in 0..200 {
            client.update();
            if client.state() == ClientState::Disconnected {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn client_reaches_errored_on_reject() {
        let fake_server = RawSocket::bind("127.0.0.1:0").unwrap();
        fake_server.set_nonblocking(true).unwrap();
        let server_addr = fake_server.local_addr().unwrap();

        let mut client = Client::connect(server_addr, registry(), &EndpointConfig::default()).unwrap();

        client.update();
        let mut buf = [0u8; 1024];
        let (_, client_addr) = recv_with_retry(&fake_server, &mut buf);

        let header = TransportHeader::new(1, 0, false, true);
        let mut reply = Vec::new();
        header.encode(&mut reply);
        reply.extend_from_slice(&encode_message(&ConnectRequestRejected {}).unwrap());
        fake_server.send_to(&reply, client_addr).unwrap();

        for _ in 0..200 {
            client.update();
            if client.state() == ClientState::Errored {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(client.state(), ClientState::Errored);
    }
}
