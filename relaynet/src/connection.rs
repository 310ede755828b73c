use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use rand::Rng;
use slog::{debug, warn, Logger};

use crate::clock::{Clock, SystemClock};
use crate::codec::builtin::{
    ConnectRequest, ConnectRequestAccepted, ConnectRequestRejected, Disconnected, KeepAliveRequest, KeepAliveResponse,
    MessageAck, Ping, Pong,
};
use crate::codec::{downcast, encode_message, AnyMessage, BoxedMessage, Message, MessageRegistry};
use crate::config::EndpointConfig;
use crate::cursor::ByteCursor;
use crate::error::{BufferError, TransportError, TransportResult};
use crate::frame::TransportHeader;
use crate::ping::PingSampler;

#[derive(Debug)]
struct OutgoingMessage {
    message_id: u16,
    bytes: Vec<u8>,
    require_ack: bool,
    last_send_attempt: Option<Instant>,
}

impl OutgoingMessage {
    fn len(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug)]
struct InboundMessage {
    header: TransportHeader,
    message: BoxedMessage,
}

/// Bounded FIFO of recently-seen message ids, so a retransmit whose ack was
/// itself lost does not get delivered twice.
#[derive(Debug)]
struct RecentIds {
    capacity: usize,
    order: VecDeque<u16>,
    seen: HashSet<u16>,
}

impl RecentIds {
    fn new(capacity: usize) -> RecentIds {
        RecentIds { capacity: capacity.max(1), order: VecDeque::new(), seen: HashSet::new() }
    }

    fn contains(&self, id: u16) -> bool {
        self.seen.contains(&id)
    }

    fn insert(&mut self, id: u16) {
        if self.seen.insert(id) {
            self.order.push_back(id);
            if self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
        }
    }
}

/// What an application sees after a call to [`Connection::update`]: either
/// a built-in lifecycle signal, or a fully decoded application message.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The peer announced a graceful disconnect.
    PeerDisconnected,
    /// An application (non-control) message was delivered, in order if it
    /// asked to be.
    Message(BoxedMessage),
}

/// Everything a call to [`Connection::update`] produced: events for the
/// application, and datagrams the caller's socket should send to the peer.
pub struct UpdateOutcome {
    pub events: Vec<ConnectionEvent>,
    pub outbound_datagrams: Vec<Vec<u8>>,
    pub timed_out: bool,
}

enum Classified {
    KeepAliveRequest { id: u16 },
    KeepAliveResponse { id: u16 },
    Ping { id: u16 },
    Pong { id: u16 },
    MessageAck { message_to_ack: i32 },
    Disconnected,
    /// A handshake control message arriving on an already-established
    /// connection — a retransmit of the peer's `ConnectRequest` that raced
    /// the accept/reject reply, most often. Swallowed rather than delivered:
    /// these type ids are reserved and must never reach `on_message`.
    Handshake,
    Application(BoxedMessage),
}

fn classify(message: BoxedMessage) -> Classified {
    match message.type_id() {
        KeepAliveRequest::TYPE_ID => {
            let id = downcast::<KeepAliveRequest>(message.as_ref()).expect("type id matched KeepAliveRequest").id;
            Classified::KeepAliveRequest { id }
        }
        KeepAliveResponse::TYPE_ID => {
            let id = downcast::<KeepAliveResponse>(message.as_ref()).expect("type id matched KeepAliveResponse").id;
            Classified::KeepAliveResponse { id }
        }
        Ping::TYPE_ID => {
            let id = downcast::<Ping>(message.as_ref()).expect("type id matched Ping").id;
            Classified::Ping { id }
        }
        Pong::TYPE_ID => {
            let id = downcast::<Pong>(message.as_ref()).expect("type id matched Pong").id;
            Classified::Pong { id }
        }
        MessageAck::TYPE_ID => {
            let message_to_ack =
                downcast::<MessageAck>(message.as_ref()).expect("type id matched MessageAck").message_to_ack;
            Classified::MessageAck { message_to_ack }
        }
        Disconnected::TYPE_ID => Classified::Disconnected,
        ConnectRequest::TYPE_ID | ConnectRequestAccepted::TYPE_ID | ConnectRequestRejected::TYPE_ID => {
            Classified::Handshake
        }
        _ => Classified::Application(message),
    }
}

/// The per-peer reliability engine: everything needed to turn a stream of
/// inbound datagrams and outbound `send` calls into ordered, deduplicated,
/// optionally-retried delivery. Owns no socket; [`crate::endpoint::Client`]
/// and [`crate::endpoint::Server`] drive it with bytes read from one and
/// feed its output datagrams back to one.
///
/// Mirrors `legume.udp.connection.Connection`.
#[derive(Debug)]
pub struct Connection<C: Clock = SystemClock> {
    clock: C,
    logger: Logger,
    is_server: bool,
    disconnecting: bool,

    timeout: Duration,
    ping_frequency: Duration,
    mtu: usize,
    min_resend_delay: Duration,
    simulated_loss_percent: u8,

    last_receive: Instant,
    last_send: Instant,
    keep_alive_send: Instant,
    keep_alive_message_id: u16,
    keepalive_count: u64,

    ping_id: u16,
    ping_send: Instant,
    ping_meter: PingSampler,
    transport_latency: Duration,

    outgoing: VecDeque<OutgoingMessage>,
    held_out_of_order: Vec<InboundMessage>,
    ready: Vec<InboundMessage>,

    next_expected_ordered: u16,
    next_outgoing_ordered: u16,
    next_outgoing_message_id: u16,

    recent_ids: RecentIds,

    in_bytes: u64,
    out_bytes: u64,
    in_packets: u64,
    out_packets: u64,
    in_messages: u64,
    out_messages: u64,
}

/// Default transport latency assumed before the ping sampler has a real
/// estimate. High on purpose, to avoid hammering an unmeasured link.
const INITIAL_TRANSPORT_LATENCY: Duration = Duration::from_millis(300);

impl Connection<SystemClock> {
    pub fn new(is_server: bool, config: &EndpointConfig, logger: Logger) -> Connection<SystemClock> {
        Connection::with_clock(is_server, config, logger, SystemClock)
    }
}

impl<C: Clock> Connection<C> {
    pub fn with_clock(is_server: bool, config: &EndpointConfig, logger: Logger, clock: C) -> Connection<C> {
        let now = clock.now();
        Connection {
            clock,
            logger,
            is_server,
            disconnecting: false,
            timeout: config.timeout(),
            ping_frequency: config.ping_frequency(),
            mtu: config.mtu,
            min_resend_delay: config.min_resend_delay(),
            simulated_loss_percent: config.simulated_loss_percent,
            last_receive: now,
            last_send: now,
            keep_alive_send: now,
            keep_alive_message_id: 0,
            keepalive_count: 0,
            ping_id: 0,
            ping_send: now,
            ping_meter: PingSampler::new(config.ping_window),
            transport_latency: INITIAL_TRANSPORT_LATENCY,
            outgoing: VecDeque::new(),
            held_out_of_order: Vec::new(),
            ready: Vec::new(),
            next_expected_ordered: 1,
            next_outgoing_ordered: 1,
            next_outgoing_message_id: 0,
            recent_ids: RecentIds::new(config.recent_ids_capacity),
            in_bytes: 0,
            out_bytes: 0,
            in_packets: 0,
            out_packets: 0,
            in_messages: 0,
            out_messages: 0,
        }
    }

    pub fn latency(&self) -> Duration {
        self.ping_meter.get_ping()
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency().as_millis() as u64
    }

    /// True once [`Connection::disconnect`] has queued the graceful
    /// `Disconnected` notice; the connection is in spec.md's "disconnecting"
    /// substate until that notice's outgoing queue drains.
    pub fn disconnecting(&self) -> bool {
        self.disconnecting
    }

    pub fn in_bytes(&self) -> u64 {
        self.in_bytes
    }

    pub fn out_bytes(&self) -> u64 {
        self.out_bytes
    }

    pub fn in_packets(&self) -> u64 {
        self.in_packets
    }

    pub fn out_packets(&self) -> u64 {
        self.out_packets
    }

    pub fn in_messages(&self) -> u64 {
        self.in_messages
    }

    pub fn out_messages(&self) -> u64 {
        self.out_messages
    }

    pub fn keepalive_count(&self) -> u64 {
        self.keepalive_count
    }

    pub fn reorder_queue_len(&self) -> usize {
        self.held_out_of_order.len()
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Sends a fire-and-forget message: delivered at most once, with no
    /// retry if the datagram carrying it is lost.
    pub fn send<T: Message>(&mut self, message: &T) -> TransportResult<usize> {
        self.send_with_flags(message, false, false)
    }

    /// Sends a message that will be retransmitted until the peer
    /// acknowledges it, but may be delivered out of order relative to
    /// other messages.
    pub fn send_reliable<T: Message>(&mut self, message: &T) -> TransportResult<usize> {
        self.send_with_flags(message, false, true)
    }

    /// Sends a message that is both retransmitted until acknowledged and
    /// delivered in the same order it was sent, relative to other ordered
    /// messages on this connection.
    pub fn send_ordered<T: Message>(&mut self, message: &T) -> TransportResult<usize> {
        self.send_with_flags(message, true, true)
    }

    /// Queues a graceful `Disconnected` notice and enters the disconnecting
    /// substate. Idempotent: a second call queues nothing further.
    pub fn disconnect(&mut self) -> TransportResult<usize> {
        if self.disconnecting {
            return Ok(0);
        }
        self.disconnecting = true;
        self.send_reliable(&Disconnected {})
    }

    fn send_with_flags<T: Message>(&mut self, message: &T, ordered: bool, reliable: bool) -> TransportResult<usize> {
        self.last_send = self.clock.now();

        let message_id = self.next_message_id();
        let ordered_sequence = if ordered { self.next_ordered_sequence() } else { 0 };
        let header = TransportHeader::new(message_id, ordered_sequence, ordered, reliable);

        let mut bytes = Vec::with_capacity(TransportHeader::WIRE_SIZE + 16);
        header.encode(&mut bytes);
        bytes.extend_from_slice(&encode_message(message)?);

        let total_len = bytes.len();
        if total_len > self.mtu {
            return Err(TransportError::Buffer(BufferError::ExceedsMtu { size: total_len, mtu: self.mtu }));
        }

        self.out_bytes += total_len as u64;
        self.out_messages += 1;
        self.outgoing.push_back(OutgoingMessage {
            message_id,
            bytes,
            require_ack: ordered || reliable,
            last_send_attempt: None,
        });

        Ok(total_len)
    }

    fn next_message_id(&mut self) -> u16 {
        self.next_outgoing_message_id = self.next_outgoing_message_id.wrapping_add(1);
        self.next_outgoing_message_id
    }

    fn next_ordered_sequence(&mut self) -> u16 {
        self.next_outgoing_ordered = self.next_outgoing_ordered.wrapping_add(1);
        self.next_outgoing_ordered
    }

    /// Feeds one received datagram's bytes in. A datagram may contain
    /// several packed messages; each is deduplicated, and ordered ones are
    /// either delivered immediately or held until their predecessor
    /// arrives.
    pub fn process_inbound_datagram(&mut self, registry: &MessageRegistry, bytes: &[u8]) -> TransportResult<()> {
        self.in_packets += 1;
        self.in_bytes += bytes.len() as u64;

        let mut cursor = ByteCursor::new(bytes.to_vec());
        while !cursor.is_empty() {
            let header = TransportHeader::decode(&mut cursor)?;
            let type_id = cursor.read_u8()?;
            let message = registry.decode(type_id, &mut cursor)?;
            self.in_messages += 1;

            if self.recent_ids.contains(header.message_id) {
                debug!(self.logger, "dropping duplicate message"; "message_id" => header.message_id);
                continue;
            }

            let inbound = InboundMessage { header, message };
            if header.is_ordered() {
                if self.can_deliver_ordered(header.ordered_sequence) {
                    self.deliver(inbound);
                } else {
                    self.hold(inbound);
                }
            } else {
                self.deliver(inbound);
            }
        }
        Ok(())
    }

    fn can_deliver_ordered(&self, sequence: u16) -> bool {
        self.next_expected_ordered.wrapping_add(1) == sequence
    }

    fn deliver(&mut self, inbound: InboundMessage) {
        self.recent_ids.insert(inbound.header.message_id);
        if inbound.header.is_ordered() {
            self.next_expected_ordered = inbound.header.ordered_sequence;
        }
        self.ready.push(inbound);
    }

    fn hold(&mut self, inbound: InboundMessage) {
        self.recent_ids.insert(inbound.header.message_id);
        self.held_out_of_order.push(inbound);
    }

    /// Promotes held messages to the ready queue until a pass makes no
    /// progress, so a burst that fills every gap in one update becomes
    /// deliverable in the same tick instead of trickling out one per tick.
    fn promote_ready_held_messages(&mut self) {
        loop {
            let mut promoted = false;
            let mut i = 0;
            while i < self.held_out_of_order.len() {
                if self.can_deliver_ordered(self.held_out_of_order[i].header.ordered_sequence) {
                    let inbound = self.held_out_of_order.remove(i);
                    self.next_expected_ordered = inbound.header.ordered_sequence;
                    self.ready.push(inbound);
                    promoted = true;
                } else {
                    i += 1;
                }
            }
            if !promoted {
                break;
            }
        }
    }

    /// Drains and processes everything received since the last call, sends
    /// any acks/pings/keepalives that are now due, and packs whatever is
    /// ready to go out into MTU-bounded datagrams.
    pub fn update(&mut self) -> UpdateOutcome {
        let now = self.clock.now();
        self.promote_ready_held_messages();

        if !self.ready.is_empty() {
            self.last_receive = now;
        }

        let mut events = Vec::new();
        for inbound in std::mem::take(&mut self.ready) {
            if inbound.header.is_ordered() || inbound.header.is_reliable() {
                let ack = MessageAck { message_to_ack: inbound.header.message_id as i32 };
                if let Err(err) = self.send_with_flags(&ack, false, false) {
                    warn!(self.logger, "failed to queue ack"; "error" => %err);
                }
            }

            match classify(inbound.message) {
                Classified::KeepAliveRequest { id } => {
                    self.keepalive_count += 1;
                    let response = KeepAliveResponse { id };
                    if let Err(err) = self.send_with_flags(&response, false, false) {
                        warn!(self.logger, "failed to queue keep-alive response"; "error" => %err);
                    }
                }
                Classified::KeepAliveResponse { id } => {
                    if id == self.keep_alive_message_id {
                        let sample = now.saturating_duration_since(self.keep_alive_send).as_secs_f64();
                        self.ping_meter.add_sample(sample);
                    } else {
                        debug!(self.logger, "discarding stale keep-alive response"; "id" => id);
                    }
                }
                Classified::Ping { id } => {
                    let pong = Pong { id };
                    if let Err(err) = self.send_with_flags(&pong, false, false) {
                        warn!(self.logger, "failed to queue pong"; "error" => %err);
                    }
                }
                Classified::Pong { id } => {
                    if id == self.ping_id {
                        let sample = now.saturating_duration_since(self.ping_send).as_secs_f64();
                        self.ping_meter.add_sample(sample);
                    } else {
                        debug!(self.logger, "discarding stale pong"; "id" => id);
                    }
                }
                Classified::MessageAck { message_to_ack } => {
                    self.acknowledge(message_to_ack);
                }
                Classified::Disconnected => {
                    events.push(ConnectionEvent::PeerDisconnected);
                }
                Classified::Handshake => {
                    debug!(self.logger, "discarding handshake message on an established connection");
                }
                Classified::Application(message) => {
                    events.push(ConnectionEvent::Message(message));
                }
            }
        }

        if self.ping_meter.has_estimate() {
            self.transport_latency = self.ping_meter.get_ping().max(self.min_resend_delay);
        }

        if now >= self.ping_send + self.ping_frequency {
            if self.is_server {
                self.keep_alive_send = now;
            }
            self.send_ping(now);
        }

        if self.is_server && now.saturating_duration_since(self.keep_alive_send) > self.timeout / 2 {
            self.send_keep_alive(now);
        }

        let timed_out = now.saturating_duration_since(self.last_receive) > self.timeout;
        let outbound_datagrams = self.pack_outbound(now);

        UpdateOutcome { events, outbound_datagrams, timed_out }
    }

    fn acknowledge(&mut self, message_id: i32) {
        let id = message_id as u16;
        if let Some(pos) = self.outgoing.iter().position(|m| m.message_id == id) {
            self.outgoing.remove(pos);
        } else {
            debug!(self.logger, "duplicate or unknown ack"; "message_id" => id);
        }
    }

    fn send_ping(&mut self, now: Instant) {
        self.ping_id = self.ping_id.wrapping_add(1);
        let ping = Ping { id: self.ping_id };
        if let Err(err) = self.send_with_flags(&ping, false, false) {
            warn!(self.logger, "failed to queue ping"; "error" => %err);
        }
        self.ping_send = now;
    }

    fn send_keep_alive(&mut self, now: Instant) {
        self.keep_alive_message_id = self.keep_alive_message_id.wrapping_add(1);
        let request = KeepAliveRequest { id: self.keep_alive_message_id };
        if let Err(err) = self.send_with_flags(&request, false, false) {
            warn!(self.logger, "failed to queue keep-alive request"; "error" => %err);
        }
        self.keep_alive_send = now;
        self.keepalive_count += 1;
    }

    /// Packs whatever is sendable right now into one or more MTU-bounded
    /// datagrams. A message requiring ack is only (re)packed once its
    /// resend delay has elapsed since its last send attempt.
    fn pack_outbound(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut datagrams = Vec::new();
        loop {
            let mut datagram = Vec::new();
            let mut sent_ids = Vec::new();

            for outgoing in self.outgoing.iter_mut() {
                if let Some(last) = outgoing.last_send_attempt {
                    if !outgoing.require_ack {
                        continue;
                    }
                    let resend_delay = self.transport_latency.max(self.min_resend_delay);
                    if now < last + resend_delay {
                        continue;
                    }
                }

                if datagram.len() + outgoing.len() > self.mtu {
                    continue;
                }

                datagram.extend_from_slice(&outgoing.bytes);
                outgoing.last_send_attempt = Some(now);
                sent_ids.push(outgoing.message_id);
            }

            if datagram.is_empty() {
                break;
            }

            self.outgoing.retain(|m| m.require_ack || !sent_ids.contains(&m.message_id));

            if self.simulated_loss_percent > 0
                && rand::thread_rng().gen_range(1..=100u8) <= self.simulated_loss_percent
            {
                debug!(self.logger, "dropping outbound datagram"; "simulated_loss_percent" => self.simulated_loss_percent);
                continue;
            }

            self.out_packets += 1;
            datagrams.push(datagram);
        }
        datagrams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec::I32;
    use crate::define_message;
    use crate::logging::discard;

    define_message! {
        Probe, id = 100, name = "Probe" => {
            value: I32,
        }
    }

    fn registry() -> MessageRegistry {
        let mut registry = MessageRegistry::new();
        registry.add::<KeepAliveRequest>().unwrap();
        registry.add::<KeepAliveResponse>().unwrap();
        registry.add::<Ping>().unwrap();
        registry.add::<Pong>().unwrap();
        registry.add::<MessageAck>().unwrap();
        registry.add::<Disconnected>().unwrap();
        registry.add::<ConnectRequest>().unwrap();
        registry.add::<Probe>().unwrap();
        registry.add::<Oversized>().unwrap();
        registry
    }

    fn connection(is_server: bool) -> Connection<ManualClock> {
        let config = EndpointConfig::default();
        Connection::with_clock(is_server, &config, discard(), ManualClock::new())
    }

    fn encode_datagram<T: Message>(message_id: u16, ordered_sequence: u16, ordered: bool, reliable: bool, message: &T) -> Vec<u8> {
        let header = TransportHeader::new(message_id, ordered_sequence, ordered, reliable);
        let mut bytes = Vec::new();
        header.encode(&mut bytes);
        bytes.extend_from_slice(&encode_message(message).unwrap());
        bytes
    }

    #[test]
    fn fire_and_forget_message_is_sent_once_and_dropped() {
        let mut conn = connection(false);
        conn.send(&Probe { value: 1 }).unwrap();
        assert!(conn.has_outgoing());

        let outcome = conn.update();
        assert_eq!(outcome.outbound_datagrams.len(), 1);
        assert!(!conn.has_outgoing());
    }

    #[test]
    fn reliable_message_is_retransmitted_until_acked() {
        let mut conn = connection(false);
        conn.send_reliable(&Probe { value: 7 }).unwrap();

        let first = conn.update();
        assert_eq!(first.outbound_datagrams.len(), 1);
        assert!(conn.has_outgoing(), "unacked reliable message stays queued");

        // Not enough time has passed: no resend yet.
        let too_soon = conn.update();
        assert!(too_soon.outbound_datagrams.is_empty());

        conn.clock.advance(Duration::from_millis(500));
        let resent = conn.update();
        assert_eq!(resent.outbound_datagrams.len(), 1);
        assert_eq!(resent.outbound_datagrams[0], first.outbound_datagrams[0]);

        // Acknowledge the original message id (1, the first message sent).
        let ack = MessageAck { message_to_ack: 1 };
        let datagram = encode_datagram(2, 0, false, false, &ack);
        conn.process_inbound_datagram(&registry(), &datagram).unwrap();
        conn.update();

        assert!(!conn.has_outgoing());
    }

    #[test]
    fn ordered_messages_are_delivered_in_send_order_despite_arriving_reversed() {
        let mut conn = connection(false);
        let registry = registry();

        // Wire sequence numbers start at 2 for the first ordered message.
        let second = encode_datagram(2, 3, true, true, &Probe { value: 2 });
        let first = encode_datagram(1, 2, true, true, &Probe { value: 1 });

        conn.process_inbound_datagram(&registry, &second).unwrap();
        assert_eq!(conn.reorder_queue_len(), 1, "seq 3 arrives before its predecessor and is held");

        conn.process_inbound_datagram(&registry, &first).unwrap();
        let outcome = conn.update();

        let delivered: Vec<i32> = outcome
            .events
            .into_iter()
            .filter_map(|event| match event {
                ConnectionEvent::Message(message) => Some(downcast::<Probe>(message.as_ref()).unwrap().value),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, vec![1, 2]);
        assert_eq!(conn.reorder_queue_len(), 0);
    }

    #[test]
    fn duplicate_datagram_is_delivered_only_once() {
        let mut conn = connection(false);
        let registry = registry();
        let datagram = encode_datagram(5, 0, false, true, &Probe { value: 9 });

        conn.process_inbound_datagram(&registry, &datagram).unwrap();
        conn.process_inbound_datagram(&registry, &datagram).unwrap();

        let outcome = conn.update();
        let messages: Vec<_> = outcome.events.iter().filter(|e| matches!(e, ConnectionEvent::Message(_))).collect();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn keep_alive_request_is_answered_and_counted() {
        let mut server = connection(true);
        let registry = registry();

        let request = encode_datagram(1, 0, false, false, &KeepAliveRequest { id: 42 });
        server.process_inbound_datagram(&registry, &request).unwrap();
        let outcome = server.update();

        assert_eq!(server.keepalive_count(), 1);
        assert_eq!(outcome.outbound_datagrams.len(), 1);
    }

    #[test]
    fn ping_sample_updates_latency_estimate() {
        let mut conn = connection(false);
        let registry = registry();

        conn.ping_id = 3;
        conn.ping_send = conn.clock.now();
        conn.clock.advance(Duration::from_millis(40));

        let pong = encode_datagram(1, 0, false, false, &Pong { id: 3 });
        conn.process_inbound_datagram(&registry, &pong).unwrap();
        conn.update();

        assert!(conn.latency() >= Duration::from_millis(30));
        assert_eq!(conn.latency_ms(), conn.latency().as_millis() as u64);
    }

    #[test]
    fn handshake_message_on_an_established_connection_is_swallowed_not_delivered() {
        let mut conn = connection(true);
        let registry = registry();

        let datagram = encode_datagram(1, 0, false, true, &ConnectRequest { protocol: 0 });
        conn.process_inbound_datagram(&registry, &datagram).unwrap();
        let outcome = conn.update();

        assert!(outcome.events.iter().all(|event| !matches!(event, ConnectionEvent::Message(_))));
    }

    #[test]
    fn disconnect_enters_the_disconnecting_substate() {
        let mut conn = connection(false);
        assert!(!conn.disconnecting());

        conn.disconnect().unwrap();
        assert!(conn.disconnecting());
        assert!(conn.has_outgoing());
    }

    #[test]
    fn disconnect_is_idempotent_and_does_not_requeue() {
        let mut single = connection(false);
        single.disconnect().unwrap();
        let single_out = single.update().outbound_datagrams;

        let mut double = connection(false);
        double.disconnect().unwrap();
        double.disconnect().unwrap();
        let double_out = double.update().outbound_datagrams;

        assert_eq!(single_out, double_out);
    }

    #[test]
    fn connection_times_out_without_traffic() {
        let mut conn = connection(false);
        conn.clock.advance(conn.timeout + Duration::from_secs(1));
        let outcome = conn.update();
        assert!(outcome.timed_out);
    }

    define_message! {
        #[allow(dead_code)]
        Oversized, id = 102, name = "Oversized" => {
            text: crate::codec::VarString,
        }
    }

    #[test]
    fn oversized_message_is_rejected_before_queueing() {
        let mut conn = connection(false);
        let result = conn.send(&Oversized { text: "x".repeat(4000) });
        assert!(matches!(result, Err(TransportError::Buffer(BufferError::ExceedsMtu { .. }))));
        assert!(!conn.has_outgoing());
    }
}
