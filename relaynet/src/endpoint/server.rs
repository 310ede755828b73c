use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use hashbrown::HashMap;
use slog::{debug, info, o, warn, Logger};

use crate::codec::builtin::{ConnectRequest, ConnectRequestAccepted, ConnectRequestRejected, PROTOCOL_VERSION};
use crate::codec::{downcast, BoxedMessage, Message, MessageRegistry};
use crate::config::EndpointConfig;
use crate::connection::{Connection, ConnectionEvent};
use crate::cursor::ByteCursor;
use crate::error::{TransportError, TransportResult};
use crate::frame::TransportHeader;
use crate::logging;

/// Aggregate counters across every connected peer, for a status line or demo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub peer_count: usize,
    pub in_bytes: u64,
    pub out_bytes: u64,
}

/// A `std::net::UdpSocket` bound to a local address, multiplexing many
/// peers' [`Connection`]s by their [`SocketAddr`]. Mirrors
/// `legume.udp.server.Server`, which keeps one `Peer` per connected
/// address behind the same socket; event objects become `on_xxx(handler)`
/// registrations instead.
pub struct Server {
    socket: UdpSocket,
    registry: Arc<MessageRegistry>,
    config: EndpointConfig,
    logger: Logger,
    peers: HashMap<SocketAddr, Connection>,
    /// Peers that were rejected or asked to disconnect: retained only long
    /// enough to drain their outgoing (reliable) notice, then dropped.
    draining: HashMap<SocketAddr, Connection>,

    on_connect_request: Option<Box<dyn FnMut(SocketAddr, &ConnectRequest) -> bool>>,
    on_message: Option<Box<dyn FnMut(SocketAddr, BoxedMessage)>>,
    on_disconnect: Option<Box<dyn FnMut(SocketAddr)>>,
    on_error: Option<Box<dyn FnMut(SocketAddr, &TransportError)>>,
}

impl Server {
    pub fn listen<A: ToSocketAddrs>(addr: A, registry: Arc<MessageRegistry>, config: EndpointConfig) -> TransportResult<Server> {
        Server::listen_with_logger(addr, registry, config, logging::discard())
    }

    pub fn listen_with_logger<A: ToSocketAddrs>(
        addr: A,
        registry: Arc<MessageRegistry>,
        config: EndpointConfig,
        logger: Logger,
    ) -> TransportResult<Server> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Server {
            socket,
            registry,
            config,
            logger,
            peers: HashMap::new(),
            draining: HashMap::new(),
            on_connect_request: None,
            on_message: None,
            on_disconnect: None,
            on_error: None,
        })
    }

    /// Consulted for every new peer's `ConnectRequest`, in addition to the
    /// protocol-version check the server always does. With no callback
    /// installed, any request with a matching protocol is accepted — the
    /// default `legume.udp.serverpeer.Peer` falls back to when nothing is
    /// bound to `OnConnectRequest`.
    pub fn on_connect_request(&mut self, handler: impl FnMut(SocketAddr, &ConnectRequest) -> bool + 'static) {
        self.on_connect_request = Some(Box::new(handler));
    }

    pub fn on_message(&mut self, handler: impl FnMut(SocketAddr, BoxedMessage) + 'static) {
        self.on_message = Some(Box::new(handler));
    }

    pub fn on_disconnect(&mut self, handler: impl FnMut(SocketAddr) + 'static) {
        self.on_disconnect = Some(Box::new(handler));
    }

    pub fn on_error(&mut self, handler: impl FnMut(SocketAddr, &TransportError) + 'static) {
        self.on_error = Some(Box::new(handler));
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Lists only peers whose handshake has completed.
    pub fn peers(&self) -> impl Iterator<Item = &SocketAddr> {
        self.peers.keys()
    }

    pub fn is_connected(&self, peer: SocketAddr) -> bool {
        self.peers.contains_key(&peer)
    }

    pub fn latency(&self, peer: SocketAddr) -> TransportResult<std::time::Duration> {
        Ok(self.peer_ref(peer)?.latency())
    }

    pub fn latency_ms(&self, peer: SocketAddr) -> TransportResult<u64> {
        Ok(self.peer_ref(peer)?.latency_ms())
    }

    pub fn stats(&self) -> ServerStats {
        self.peers.values().fold(
            ServerStats { peer_count: self.peers.len(), in_bytes: 0, out_bytes: 0 },
            |mut stats, connection| {
                stats.in_bytes += connection.in_bytes();
                stats.out_bytes += connection.out_bytes();
                stats
            },
        )
    }

    /// Sends `message` to one peer, fire-and-forget.
    pub fn send_message<T: Message>(&mut self, peer: SocketAddr, message: &T) -> TransportResult<usize> {
        self.peer_mut(peer)?.send(message)
    }

    /// Sends `message` to one peer, retried until acknowledged.
    pub fn send_reliable_message<T: Message>(&mut self, peer: SocketAddr, message: &T) -> TransportResult<usize> {
        self.peer_mut(peer)?.send_reliable(message)
    }

    /// Sends `message` to one peer, retried and delivered in order.
    pub fn send_ordered_message<T: Message>(&mut self, peer: SocketAddr, message: &T) -> TransportResult<usize> {
        self.peer_mut(peer)?.send_ordered(message)
    }

    /// Sends `message` fire-and-forget to every connected peer.
    pub fn send_message_to_all<T: Message>(&mut self, message: &T) {
        for (addr, connection) in self.peers.iter_mut() {
            if let Err(err) = connection.send(message) {
                warn!(self.logger, "send_message_to_all failed for a peer"; "peer" => %addr, "error" => %err);
            }
        }
    }

    /// Sends `message`, retried until acknowledged, to every connected peer.
    pub fn send_reliable_message_to_all<T: Message>(&mut self, message: &T) {
        for (addr, connection) in self.peers.iter_mut() {
            if let Err(err) = connection.send_reliable(message) {
                warn!(self.logger, "send_reliable_message_to_all failed for a peer"; "peer" => %addr, "error" => %err);
            }
        }
    }

    /// Queues a graceful `Disconnected` notice to `peer` and immediately
    /// moves it out of `peers` and into `draining` — same terminal path as a
    /// rejected handshake. From this call on, `peer` is no longer "connected"
    /// (`is_connected`/`peers` stop reporting it, further sends fail with
    /// *server error*) even though its `Disconnected` notice is still
    /// draining in the background.
    pub fn disconnect(&mut self, peer: SocketAddr) -> TransportResult<()> {
        let mut connection = self.peers.remove(&peer).ok_or_else(|| TransportError::Server(format!("no such peer: {peer}")))?;
        let result = connection.disconnect();
        self.draining.insert(peer, connection);
        result.map(|_| ())
    }

    pub fn disconnect_all(&mut self) {
        let addrs: Vec<SocketAddr> = self.peers.keys().copied().collect();
        for addr in addrs {
            if let Err(err) = self.disconnect(addr) {
                warn!(self.logger, "disconnect_all failed for a peer"; "peer" => %addr, "error" => %err);
            }
        }
    }

    fn peer_mut(&mut self, peer: SocketAddr) -> TransportResult<&mut Connection> {
        self.peers.get_mut(&peer).ok_or_else(|| TransportError::Server(format!("no such peer: {peer}")))
    }

    fn peer_ref(&self, peer: SocketAddr) -> TransportResult<&Connection> {
        self.peers.get(&peer).ok_or_else(|| TransportError::Server(format!("no such peer: {peer}")))
    }

    /// Drains every pending datagram off the socket (routing unrecognized
    /// addresses through the handshake), advances every live peer by one
    /// tick, reaps whoever timed out or disconnected, and flushes each
    /// peer's outbound datagrams. Fires `on_message`/`on_disconnect`/
    /// `on_error` as those events occur.
    pub fn update(&mut self) {
        let mut buf = [0u8; 65_536];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, addr)) => self.route_inbound(addr, &buf[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == std::io::ErrorKind::ConnectionReset => continue,
                Err(err) => {
                    warn!(self.logger, "socket error while polling"; "error" => %err);
                    break;
                }
            }
        }

        self.drain_draining_peers();

        let mut dead = Vec::new();
        for (&addr, connection) in self.peers.iter_mut() {
            let outcome = connection.update();
            for event in outcome.events {
                match event {
                    ConnectionEvent::PeerDisconnected => dead.push(addr),
                    ConnectionEvent::Message(message) => {
                        if let Some(handler) = self.on_message.as_mut() {
                            handler(addr, message);
                        }
                    }
                }
            }
            if outcome.timed_out {
                if let Some(handler) = self.on_error.as_mut() {
                    handler(addr, &TransportError::TimedOut);
                }
                dead.push(addr);
            }
            for datagram in outcome.outbound_datagrams {
                if let Err(err) = self.socket.send_to(&datagram, addr) {
                    warn!(self.logger, "failed to send to peer"; "peer" => %addr, "error" => %err);
                }
            }
        }

        for addr in dead {
            if self.peers.remove(&addr).is_some() {
                info!(self.logger, "peer disconnected"; "peer" => %addr);
                if let Some(handler) = self.on_disconnect.as_mut() {
                    handler(addr);
                }
            }
        }
    }

    /// Flushes the reliable accept/reject notice for every peer waiting on
    /// one, dropping it once the notice has been acknowledged or the peer
    /// stops responding.
    fn drain_draining_peers(&mut self) {
        let mut finished = Vec::new();
        for (&addr, connection) in self.draining.iter_mut() {
            let outcome = connection.update();
            for datagram in outcome.outbound_datagrams {
                let _ = self.socket.send_to(&datagram, addr);
            }
            if !connection.has_outgoing() || outcome.timed_out {
                finished.push(addr);
            }
        }
        for addr in finished {
            self.draining.remove(&addr);
        }
    }

    fn route_inbound(&mut self, addr: SocketAddr, bytes: &[u8]) {
        if let Some(connection) = self.peers.get_mut(&addr) {
            if let Err(err) = connection.process_inbound_datagram(&self.registry, bytes) {
                warn!(self.logger, "discarding malformed datagram"; "peer" => %addr, "error" => %err);
            }
            return;
        }

        if self.draining.contains_key(&addr) {
            return;
        }

        self.accept(addr, bytes);
    }

    /// Handles the first datagram from an address the server has no
    /// `Connection` for yet. Only a `ConnectRequest` is legal here;
    /// anything else is silently dropped, the way `legume.udp.server`
    /// ignores traffic from addresses with no `Peer`.
    fn accept(&mut self, addr: SocketAddr, bytes: &[u8]) {
        let mut cursor = ByteCursor::new(bytes.to_vec());
        if let Err(err) = TransportHeader::decode(&mut cursor) {
            warn!(self.logger, "malformed handshake datagram"; "peer" => %addr, "error" => %err);
            return;
        }

        let type_id = match cursor.read_u8() {
            Ok(id) => id,
            Err(_) => return,
        };
        let message = match self.registry.decode(type_id, &mut cursor) {
            Ok(message) => message,
            Err(err) => {
                warn!(self.logger, "unrecognized handshake message"; "peer" => %addr, "error" => %err);
                return;
            }
        };
        let request = match downcast::<ConnectRequest>(message.as_ref()) {
            Some(request) => request,
            None => {
                debug!(self.logger, "ignoring non-handshake message from unknown peer"; "peer" => %addr);
                return;
            }
        };

        let version_ok = request.protocol == PROTOCOL_VERSION;
        let accepted =
            version_ok && self.on_connect_request.as_mut().map_or(true, |callback| callback(addr, request));

        let mut connection = Connection::new(true, &self.config, self.logger.new(o!("peer" => addr.to_string())));
        // Replays the raw handshake datagram through the normal inbound
        // pipeline so the ConnectRequest gets acked and deduped like any
        // other reliable message. Without this the client's copy sits
        // unacked and keeps retransmitting; once the peer is in `peers` that
        // retransmit would otherwise be delivered to `on_message`.
        if let Err(err) = connection.process_inbound_datagram(&self.registry, bytes) {
            warn!(self.logger, "failed to replay handshake datagram"; "peer" => %addr, "error" => %err);
            return;
        }

        if accepted {
            info!(self.logger, "accepted new connection"; "peer" => %addr);
            let _ = connection.send_reliable(&ConnectRequestAccepted {});
            let outcome = connection.update();
            for datagram in outcome.outbound_datagrams {
                let _ = self.socket.send_to(&datagram, addr);
            }
            self.peers.insert(addr, connection);
        } else {
            info!(self.logger, "rejected connection"; "peer" => %addr, "requested_protocol" => request.protocol);
            let _ = connection.send_reliable(&ConnectRequestRejected {});
            let outcome = connection.update();
            for datagram in outcome.outbound_datagrams {
                let _ = self.socket.send_to(&datagram, addr);
            }
            self.draining.insert(addr, connection);
        }
    }
}
