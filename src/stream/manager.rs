use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::Error;
use crate::packet::PacketRecord;

use super::connection::{Connection, ConnectionHandle, ConnectionTable, Dispatch, RoleSource, Side};
use super::{
    default_registry, ConnectionKey, HandlerRegistry, Segment, StreamContext, StreamHandler,
    Transaction,
};

/// Configuration for the StreamManager.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum bytes held back for reordering, per connection.
    pub max_pending_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: 16 * 1024 * 1024, // 16 MB per connection
        }
    }
}

/// Central orchestrator for TCP stream processing.
///
/// Feeds every packet into its connection's reassembly buffers, hands the
/// released bytes to the handler registered for the connection's service
/// port and collects the transactions handlers complete.
pub struct StreamManager {
    connections: ConnectionTable,
    registry: HandlerRegistry,
    config: StreamConfig,
    /// Packets seen so far.
    arrivals: u64,
}

/// Connection identity stamped on transactions.
struct Origin {
    id: u64,
    client: SocketAddr,
    server: SocketAddr,
}

impl Origin {
    fn of(conn: &Connection) -> Self {
        Self {
            id: conn.id,
            client: conn.client(),
            server: conn.server(),
        }
    }
}

impl StreamManager {
    pub fn new(registry: HandlerRegistry, config: StreamConfig) -> Self {
        Self {
            connections: ConnectionTable::new(),
            registry,
            config,
            arrivals: 0,
        }
    }

    /// Create with default config and the default handlers.
    pub fn with_defaults() -> Self {
        Self::new(default_registry(), StreamConfig::default())
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Get mutable access to the registry for handler registration.
    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of connections still open.
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Get a live connection by its endpoints.
    pub fn connection(&self, key: &ConnectionKey) -> Option<&Connection> {
        self.connections
            .lookup(key)
            .and_then(|handle| self.connections.get(handle))
    }

    /// Process one TCP packet.
    ///
    /// Returns the transactions completed by it, possibly from several
    /// connections when it closes one connection and opens another.
    pub fn process_packet(&mut self, packet: &PacketRecord) -> Vec<Transaction> {
        let mut out = Vec::new();
        self.arrivals += 1;

        let flags = packet.flags;
        let key = ConnectionKey::new(packet.src_ip, packet.src_port, packet.dst_ip, packet.dst_port);
        let side = key.side(packet.src_ip, packet.src_port);

        // 1. Find or open the connection
        let handle = match self.connections.lookup(&key) {
            Some(handle) if flags.is_syn_only() && self.is_port_reuse(handle, side, packet.seq) => {
                debug!(port_a = key.port(Side::A), port_b = key.port(Side::B), "port reuse");
                self.terminate(handle, &mut out);
                self.open(key, side, packet)
            }
            Some(handle) => handle,
            None if !flags.syn && !flags.fin && packet.payload.is_empty() => return out,
            None => self.open(key, side, packet),
        };

        let Some(conn) = self.connections.get_mut(handle) else {
            return out;
        };
        conn.last_activity = packet.timestamp;
        conn.observe_handshake(side, flags);

        // 2. Anchor on SYN; the SYN itself takes one sequence number
        let mut data_seq = packet.seq;
        if flags.syn {
            data_seq = packet.seq.wrapping_add(1);
            if let Some(backlog) = conn.buffer_mut(side).anchor_syn(packet.seq) {
                let backlog = backlog.into_iter().map(|segment| (side, segment)).collect();
                replay(&self.registry, conn, backlog, &mut out);
            }
        }

        // 3. Reassemble and dispatch
        if !packet.payload.is_empty() {
            let segment = Segment {
                seq: data_seq,
                data: packet.payload.clone(),
                arrival: self.arrivals,
                timestamp: packet.timestamp,
            };
            let released = conn.buffer_mut(side).push(segment);
            deliver(&self.registry, conn, side, released, packet.timestamp, &mut out);
            enforce_bound(&self.registry, conn, side, self.config.max_pending_bytes, &mut out);
        }

        // 4. Handle FIN
        if flags.fin {
            let end = data_seq.wrapping_add(packet.payload.len() as u32);
            conn.buffer_mut(side).set_fin(end);
        }

        // 5. Handle connection termination
        if flags.rst || conn.is_fully_closed() {
            self.terminate(handle, &mut out);
        }

        out
    }

    /// Close every connection still open, oldest first.
    pub fn finish(&mut self) -> Vec<Transaction> {
        let mut out = Vec::new();
        for handle in self.connections.handles() {
            self.terminate(handle, &mut out);
        }
        out
    }

    /// Run the whole pipeline over a packet source.
    pub fn transactions<I>(self, packets: I) -> Transactions<I::IntoIter>
    where
        I: IntoIterator<Item = Result<PacketRecord, Error>>,
    {
        Transactions {
            packets: packets.into_iter(),
            manager: self,
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn is_port_reuse(&self, handle: ConnectionHandle, side: Side, isn: u32) -> bool {
        self.connections
            .get(handle)
            .and_then(|conn| conn.buffer(side).syn_isn())
            .is_some_and(|old| old != isn)
    }

    fn open(&mut self, key: ConnectionKey, side: Side, packet: &PacketRecord) -> ConnectionHandle {
        let flags = packet.flags;
        let (client_is_a, role) = if flags.is_syn_only() {
            (side == Side::A, RoleSource::Syn)
        } else if flags.is_syn_ack() {
            (side == Side::B, RoleSource::SynAck)
        } else {
            let port_a = key.port(Side::A);
            let port_b = key.port(Side::B);
            let a_is_server = match (
                self.registry.is_registered(port_a),
                self.registry.is_registered(port_b),
            ) {
                (true, false) => true,
                (false, true) => false,
                _ => port_a <= port_b,
            };
            (!a_is_server, RoleSource::Port)
        };

        let handle = self
            .connections
            .insert(key, client_is_a, role, packet.timestamp);
        if let Some(conn) = self.connections.get(handle) {
            debug!(
                connection = conn.id,
                client = %conn.client(),
                server = %conn.server(),
                role = ?role,
                "new connection"
            );
        }
        handle
    }

    /// Release what can still be released, let the handler finish and free
    /// the slot.
    fn terminate(&mut self, handle: ConnectionHandle, out: &mut Vec<Transaction>) {
        let Some(mut conn) = self.connections.remove(handle) else {
            return;
        };

        force_anchor(&self.registry, &mut conn, out);
        let discarded = conn.buffer_mut(Side::A).discard_tail() + conn.buffer_mut(Side::B).discard_tail();

        let origin = Origin::of(&conn);
        if let Dispatch::Handler(handler) = &mut conn.dispatch {
            handler.finish();
            let emitted = poll(handler.as_mut(), &origin, conn.last_activity, out);
            conn.transactions += emitted;
        }

        let (sent, received) = conn.stats();
        debug!(
            connection = conn.id,
            client = %origin.client,
            server = %origin.server,
            sent_bytes = sent.bytes_released,
            received_bytes = received.bytes_released,
            retransmits = sent.retransmits + received.retransmits,
            out_of_order = sent.out_of_order + received.out_of_order,
            gapped = sent.gapped || received.gapped,
            discarded,
            transactions = conn.transactions,
            "connection closed"
        );
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Hand released bytes to the connection's handler.
fn deliver(
    registry: &HandlerRegistry,
    conn: &mut Connection,
    side: Side,
    chunks: Vec<Bytes>,
    timestamp: f64,
    out: &mut Vec<Transaction>,
) {
    if chunks.is_empty() {
        return;
    }
    if let Dispatch::Unresolved = conn.dispatch {
        conn.dispatch = resolve(registry, conn);
    }

    let direction = conn.direction(side);
    let origin = Origin::of(conn);
    let mut emitted = 0;
    if let Dispatch::Handler(handler) = &mut conn.dispatch {
        for chunk in &chunks {
            handler.consume(direction, chunk);
            emitted += poll(handler.as_mut(), &origin, timestamp, out);
        }
    }
    conn.transactions += emitted;
}

/// Pick the handler on first release.
fn resolve(registry: &HandlerRegistry, conn: &Connection) -> Dispatch {
    let service = registry
        .service_port(conn.key.port(Side::A), conn.key.port(Side::B))
        .and_then(|port| registry.get(port).map(|factory| (port, factory)));

    match service {
        Some((service_port, factory)) => {
            let context = StreamContext {
                connection_id: conn.id,
                client: conn.client(),
                server: conn.server(),
                service_port,
            };
            debug!(connection = conn.id, protocol = factory.name(), "handler attached");
            Dispatch::Handler(factory.create(&context))
        }
        None => {
            trace!(connection = conn.id, "no handler, passing through");
            Dispatch::PassThrough
        }
    }
}

fn poll(
    handler: &mut dyn StreamHandler,
    origin: &Origin,
    timestamp: f64,
    out: &mut Vec<Transaction>,
) -> u64 {
    let mut emitted = 0;
    while let Some((request, reply)) = handler.transaction_ready() {
        out.push(Transaction {
            timestamp,
            protocol: handler.name(),
            connection_id: origin.id,
            client: origin.client,
            server: origin.server,
            request,
            reply,
        });
        emitted += 1;
    }
    emitted
}

/// Push buffered segments in arrival order.
fn replay(
    registry: &HandlerRegistry,
    conn: &mut Connection,
    mut backlog: Vec<(Side, Segment)>,
    out: &mut Vec<Transaction>,
) {
    backlog.sort_by_key(|(_, segment)| segment.arrival);
    for (side, segment) in backlog {
        let timestamp = segment.timestamp;
        let released = conn.buffer_mut(side).push(segment);
        deliver(registry, conn, side, released, timestamp, out);
    }
}

/// Anchor every direction still waiting for a SYN and replay both backlogs
/// interleaved as they arrived.
fn force_anchor(registry: &HandlerRegistry, conn: &mut Connection, out: &mut Vec<Transaction>) {
    let mut backlog = Vec::new();
    for side in [Side::A, Side::B] {
        backlog.extend(
            conn.buffer_mut(side)
                .force_anchor()
                .into_iter()
                .map(|segment| (side, segment)),
        );
    }
    if !backlog.is_empty() {
        replay(registry, conn, backlog, out);
    }
}

/// Keep the connection under its pending limit.
///
/// Unanchored directions are anchored first; if that is not enough the
/// direction holding the most pending bytes gives up its backlog, the side
/// that just pushed on a tie.
fn enforce_bound(
    registry: &HandlerRegistry,
    conn: &mut Connection,
    side: Side,
    max_pending_bytes: usize,
    out: &mut Vec<Transaction>,
) {
    if conn.pending_bytes() <= max_pending_bytes {
        return;
    }
    force_anchor(registry, conn, out);
    if conn.pending_bytes() <= max_pending_bytes {
        return;
    }

    let other = side.other();
    let victim = if conn.buffer(other).pending_bytes() > conn.buffer(side).pending_bytes() {
        other
    } else {
        side
    };
    let dropped = conn.buffer_mut(victim).drop_pending();
    debug!(
        connection = conn.id,
        direction = %conn.direction(victim),
        dropped,
        "pending limit exceeded, dropping direction"
    );
}

/// Pull iterator over the transactions of a packet source.
///
/// A source error is yielded once and ends the iteration; connections still
/// open at that point are not flushed.
pub struct Transactions<I> {
    packets: I,
    manager: StreamManager,
    ready: VecDeque<Transaction>,
    done: bool,
}

impl<I> Transactions<I> {
    pub fn manager(&self) -> &StreamManager {
        &self.manager
    }
}

impl<I> Iterator for Transactions<I>
where
    I: Iterator<Item = Result<PacketRecord, Error>>,
{
    type Item = Result<Transaction, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(transaction) = self.ready.pop_front() {
                return Some(Ok(transaction));
            }
            if self.done {
                return None;
            }
            match self.packets.next() {
                Some(Ok(packet)) => self.ready.extend(self.manager.process_packet(&packet)),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    self.ready.extend(self.manager.finish());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TcpFlags;
    use crate::stream::parsers::smtp::{SmtpReply, SmtpRequest};
    use crate::stream::{Direction, HandlerFactory, Reply, Request};

    /// Records both legs of a connection and reports them once at the end.
    #[derive(Default)]
    struct Recorder {
        request: SmtpRequest,
        received: Vec<u8>,
        last: Option<Direction>,
        finished: bool,
    }

    impl StreamHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn consume(&mut self, direction: Direction, data: &[u8]) {
            if self.last != Some(direction) {
                let tag = match direction {
                    Direction::ToServer => b">".to_vec(),
                    Direction::ToClient => b"<".to_vec(),
                };
                self.request.mail_to.push(tag);
                self.last = Some(direction);
            }
            match direction {
                Direction::ToServer => self.request.message.extend_from_slice(data),
                Direction::ToClient => self.received.extend_from_slice(data),
            }
        }

        fn transaction_ready(&mut self) -> Option<(Request, Reply)> {
            if !std::mem::take(&mut self.finished) {
                return None;
            }
            let reply = SmtpReply {
                ok_responses: vec![std::mem::take(&mut self.received)],
                ..Default::default()
            };
            Some((
                Request::Smtp(std::mem::take(&mut self.request)),
                Reply::Smtp(reply),
            ))
        }

        fn finish(&mut self) {
            self.finished = true;
        }
    }

    struct RecorderFactory;

    impl HandlerFactory for RecorderFactory {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn create(&self, _context: &StreamContext) -> Box<dyn StreamHandler> {
            Box::new(Recorder::default())
        }
    }

    fn manager_with(config: StreamConfig) -> StreamManager {
        let mut registry = HandlerRegistry::new();
        registry.register(25, RecorderFactory);
        StreamManager::new(registry, config)
    }

    fn manager() -> StreamManager {
        manager_with(StreamConfig::default())
    }

    fn client() -> SocketAddr {
        "10.0.0.1:40000".parse().unwrap()
    }

    fn server() -> SocketAddr {
        "10.0.0.2:25".parse().unwrap()
    }

    fn flags(syn: bool, ack: bool, fin: bool, rst: bool) -> TcpFlags {
        TcpFlags { syn, ack, fin, rst }
    }

    fn from_client(seq: u32, flags: TcpFlags, payload: &'static [u8]) -> PacketRecord {
        PacketRecord::new(client(), server(), seq, flags, payload)
    }

    fn from_server(seq: u32, flags: TcpFlags, payload: &'static [u8]) -> PacketRecord {
        PacketRecord::new(server(), client(), seq, flags, payload)
    }

    /// Handshake, two exchanges and both FINs; packet `i` has timestamp `i`.
    fn session() -> Vec<PacketRecord> {
        let data = flags(false, true, false, false);
        let fin = flags(false, true, true, false);
        vec![
            from_client(100, flags(true, false, false, false), b""),
            from_server(500, flags(true, true, false, false), b""),
            from_client(101, data, b""),
            from_client(101, data, b"EHLO a\r\n"),
            from_server(501, data, b"220 hi\r\n"),
            from_client(109, data, b"QUIT\r\n"),
            from_server(509, data, b"221 bye\r\n"),
            from_client(115, fin, b""),
            from_server(518, fin, b""),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, packet)| packet.with_timestamp(i as f64))
        .collect()
    }

    fn run(manager: &mut StreamManager, packets: &[PacketRecord]) -> Vec<Transaction> {
        let mut out: Vec<Transaction> = packets
            .iter()
            .flat_map(|packet| manager.process_packet(packet))
            .collect();
        out.extend(manager.finish());
        out
    }

    fn sent(transaction: &Transaction) -> &[u8] {
        &transaction.request.as_smtp().unwrap().message
    }

    fn received(transaction: &Transaction) -> &[u8] {
        &transaction.reply.as_smtp().unwrap().ok_responses[0]
    }

    fn turns(transaction: &Transaction) -> Vec<&[u8]> {
        let request = transaction.request.as_smtp().unwrap();
        request.mail_to.iter().map(|t| t.as_slice()).collect()
    }

    // Test 1: In-order session closes on the last FIN
    #[test]
    fn test_in_order_session() {
        let mut manager = manager();
        let packets = session();
        let (last, rest) = packets.split_last().unwrap();

        for packet in rest {
            assert!(manager.process_packet(packet).is_empty());
        }
        let out = manager.process_packet(last);
        assert_eq!(out.len(), 1);
        assert_eq!(manager.open_connections(), 0);

        let transaction = &out[0];
        assert_eq!(transaction.protocol, "recorder");
        assert_eq!(transaction.connection_id, 1);
        assert_eq!(transaction.client, client());
        assert_eq!(transaction.server, server());
        assert_eq!(transaction.timestamp, 8.0);
        assert_eq!(sent(transaction), b"EHLO a\r\nQUIT\r\n");
        assert_eq!(received(transaction), b"220 hi\r\n221 bye\r\n");
        assert_eq!(turns(transaction), vec![&b">"[..], &b"<"[..], &b">"[..], &b"<"[..]]);
    }

    // Test 2: Duplicated packets change nothing
    #[test]
    fn test_duplicates() {
        let mut manager = manager();
        let packets: Vec<PacketRecord> = session()
            .into_iter()
            .flat_map(|packet| [packet.clone(), packet])
            .collect();

        let out = run(&mut manager, &packets);
        assert_eq!(out.len(), 1);
        assert_eq!(sent(&out[0]), b"EHLO a\r\nQUIT\r\n");
        assert_eq!(received(&out[0]), b"220 hi\r\n221 bye\r\n");
    }

    // Test 3: Reordered captures give the same streams
    #[test]
    fn test_permutations() {
        let packets = session();
        let orders: [&[usize]; 2] = [
            &[8, 7, 6, 5, 4, 3, 2, 1, 0],
            &[1, 5, 0, 8, 3, 6, 2, 4, 7],
        ];

        for order in orders {
            let permuted: Vec<PacketRecord> = order.iter().map(|&i| packets[i].clone()).collect();
            let mut manager = manager();
            let out = run(&mut manager, &permuted);

            assert_eq!(out.len(), 1, "order {order:?}");
            assert_eq!(out[0].client, client());
            assert_eq!(sent(&out[0]), b"EHLO a\r\nQUIT\r\n");
            assert_eq!(received(&out[0]), b"220 hi\r\n221 bye\r\n");
        }
    }

    // Test 4: Bytes behind a gap are discarded at the end
    #[test]
    fn test_gap() {
        let mut manager = manager();
        let packets: Vec<PacketRecord> = session()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != 4)
            .map(|(_, packet)| packet)
            .collect();

        let during: usize = packets
            .iter()
            .map(|packet| manager.process_packet(packet).len())
            .sum();
        assert_eq!(during, 0);
        assert_eq!(manager.open_connections(), 1);

        let out = manager.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(sent(&out[0]), b"EHLO a\r\nQUIT\r\n");
        assert!(received(&out[0]).is_empty());
    }

    // Test 5: Exceeding the pending limit gives the direction up
    #[test]
    fn test_pending_limit() {
        let mut manager = manager_with(StreamConfig {
            max_pending_bytes: 8,
        });
        let data = flags(false, true, false, false);
        manager.process_packet(&from_client(100, flags(true, false, false, false), b""));
        manager.process_packet(&from_client(101, data, b"hello"));
        manager.process_packet(&from_client(116, data, b"far too many bytes"));

        let key = ConnectionKey::new(client().ip(), client().port(), server().ip(), server().port());
        let (sent_stats, _) = manager.connection(&key).unwrap().stats();
        assert!(sent_stats.gapped);
        assert_eq!(sent_stats.bytes_discarded, 18);

        manager.process_packet(&from_client(106, data, b"world"));
        let out = manager.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(sent(&out[0]), b"hello");
    }

    // Test 6: RST terminates at once
    #[test]
    fn test_rst() {
        let mut manager = manager();
        let packets = session();
        for packet in &packets[..5] {
            assert!(manager.process_packet(packet).is_empty());
        }

        let rst = from_server(509, flags(false, false, false, true), b"").with_timestamp(5.0);
        let out = manager.process_packet(&rst);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, 5.0);
        assert_eq!(sent(&out[0]), b"EHLO a\r\n");
        assert_eq!(manager.open_connections(), 0);
    }

    // Test 7: Unregistered ports pass through without transactions
    #[test]
    fn test_pass_through() {
        let mut manager = manager();
        let web: SocketAddr = "10.0.0.2:80".parse().unwrap();
        let data = flags(false, true, false, false);
        let packets = vec![
            PacketRecord::new(client(), web, 100, flags(true, false, false, false), &b""[..]),
            PacketRecord::new(client(), web, 101, data, &b"GET / HTTP/1.0\r\n\r\n"[..]),
            PacketRecord::new(web, client(), 700, data, &b"HTTP/1.0 200 OK\r\n\r\n"[..]),
        ];

        assert!(run(&mut manager, &packets).is_empty());
        assert_eq!(manager.open_connections(), 0);
    }

    // Test 8: Without handshake both legs keep their interleaving
    #[test]
    fn test_mid_stream_capture() {
        let mut manager = manager();
        let packets: Vec<PacketRecord> = session()
            .into_iter()
            .filter(|packet| !packet.payload.is_empty())
            .collect();

        let out = run(&mut manager, &packets);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client, client());
        assert_eq!(sent(&out[0]), b"EHLO a\r\nQUIT\r\n");
        assert_eq!(received(&out[0]), b"220 hi\r\n221 bye\r\n");
        assert_eq!(turns(&out[0]), vec![&b">"[..], &b"<"[..], &b">"[..], &b"<"[..]]);
    }

    // Test 9: A new ISN on a live tuple starts a new connection
    #[test]
    fn test_port_reuse() {
        let mut manager = manager();
        let packets = session();

        // A retransmitted SYN is not a new connection.
        manager.process_packet(&packets[0]);
        for packet in &packets[..7] {
            assert!(manager.process_packet(packet).is_empty());
        }

        let reuse = from_client(9000, flags(true, false, false, false), b"");
        let out = manager.process_packet(&reuse);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].connection_id, 1);
        assert_eq!(sent(&out[0]), b"EHLO a\r\nQUIT\r\n");
        assert_eq!(manager.open_connections(), 1);

        let data = flags(false, true, false, false);
        manager.process_packet(&from_client(9001, data, b"EHLO b\r\n"));
        let out = manager.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].connection_id, 2);
        assert_eq!(sent(&out[0]), b"EHLO b\r\n");
    }

    // Test 10: Bare ACKs and RSTs do not open connections
    #[test]
    fn test_empty_packets_ignored() {
        let mut manager = manager();
        manager.process_packet(&from_client(101, flags(false, true, false, false), b""));
        manager.process_packet(&from_server(501, flags(false, false, false, true), b""));
        assert_eq!(manager.open_connections(), 0);
    }

    // Test 11: The iterator flushes at the end of the source
    #[test]
    fn test_transactions_iterator() {
        let packets: Vec<Result<PacketRecord, Error>> = session().into_iter().map(Ok).collect();
        let out: Vec<Transaction> = manager()
            .transactions(packets)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(sent(&out[0]), b"EHLO a\r\nQUIT\r\n");
    }

    // Test 12: A source error ends the iteration
    #[test]
    fn test_transactions_iterator_error() {
        let packets = session();
        let source: Vec<Result<PacketRecord, Error>> = vec![
            Ok(packets[0].clone()),
            Ok(packets[3].clone()),
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated",
            ))),
            Ok(packets[5].clone()),
        ];

        let mut transactions = manager().transactions(source);
        assert!(matches!(transactions.next(), Some(Err(Error::Io(_)))));
        assert!(transactions.next().is_none());
        assert_eq!(transactions.manager().open_connections(), 1);
    }

    // Test 13: The bound anchors a waiting direction before dropping anything
    #[test]
    fn test_pending_limit_anchors_backlog() {
        let mut manager = manager_with(StreamConfig {
            max_pending_bytes: 16,
        });
        let data = flags(false, true, false, false);
        // SYN+ACK lost: the server leg waits unanchored.
        manager.process_packet(&from_client(100, flags(true, false, false, false), b""));
        manager.process_packet(&from_server(501, data, b"220 hi there\r\n"));
        manager.process_packet(&from_client(109, data, b"QUIT\r\n"));

        let key = ConnectionKey::new(client().ip(), client().port(), server().ip(), server().port());
        let conn = manager.connection(&key).unwrap();
        let (sent_stats, received_stats) = conn.stats();
        assert!(!sent_stats.gapped);
        assert!(!received_stats.gapped);
        assert_eq!(conn.pending_bytes(), 6);

        manager.process_packet(&from_client(101, data, b"EHLO a\r\n"));
        let out = manager.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(sent(&out[0]), b"EHLO a\r\nQUIT\r\n");
        assert_eq!(received(&out[0]), b"220 hi there\r\n");
    }

    // Test 14: The direction holding the backlog is the one given up
    #[test]
    fn test_pending_limit_drops_largest() {
        let mut manager = manager_with(StreamConfig {
            max_pending_bytes: 16,
        });
        let data = flags(false, true, false, false);
        manager.process_packet(&from_client(100, flags(true, false, false, false), b""));
        manager.process_packet(&from_server(500, flags(true, true, false, false), b""));
        // Both legs start with a gap.
        manager.process_packet(&from_server(520, data, b"250 far ahead\r\n"));
        manager.process_packet(&from_client(120, data, b"QUIT\r\n"));

        let key = ConnectionKey::new(client().ip(), client().port(), server().ip(), server().port());
        let conn = manager.connection(&key).unwrap();
        let (sent_stats, received_stats) = conn.stats();
        assert!(!sent_stats.gapped);
        assert!(received_stats.gapped);
        assert_eq!(received_stats.bytes_discarded, 15);
        assert_eq!(conn.pending_bytes(), 6);
    }
}
