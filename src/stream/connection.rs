use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crate::packet::TcpFlags;

use super::{Direction, StreamBuffer, StreamHandler, StreamStats};

/// Normalized connection key (lower IP/port first for consistent lookup).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ConnectionKey {
    ip_a: IpAddr,
    port_a: u16,
    ip_b: IpAddr,
    port_b: u16,
}

impl ConnectionKey {
    /// Create a normalized connection key.
    /// Ensures (ip_a, port_a) <= (ip_b, port_b) lexicographically.
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) -> Self {
        if (src_ip, src_port) <= (dst_ip, dst_port) {
            Self {
                ip_a: src_ip,
                port_a: src_port,
                ip_b: dst_ip,
                port_b: dst_port,
            }
        } else {
            Self {
                ip_a: dst_ip,
                port_a: dst_port,
                ip_b: src_ip,
                port_b: src_port,
            }
        }
    }

    /// Which endpoint sent a packet from `src_ip:src_port`.
    pub fn side(&self, src_ip: IpAddr, src_port: u16) -> Side {
        if src_ip == self.ip_a && src_port == self.port_a {
            Side::A
        } else {
            Side::B
        }
    }

    pub fn endpoint(&self, side: Side) -> SocketAddr {
        match side {
            Side::A => SocketAddr::new(self.ip_a, self.port_a),
            Side::B => SocketAddr::new(self.ip_b, self.port_b),
        }
    }

    pub fn port(&self, side: Side) -> u16 {
        match side {
            Side::A => self.port_a,
            Side::B => self.port_b,
        }
    }
}

/// One endpoint of a normalized key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// How the client/server roles were decided, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoleSource {
    /// The client's SYN was seen.
    Syn,
    /// The server's SYN+ACK was seen.
    SynAck,
    /// Guessed from the ports.
    Port,
}

/// What happens to released bytes.
pub(crate) enum Dispatch {
    /// Nothing released yet.
    Unresolved,
    Handler(Box<dyn StreamHandler>),
    /// No handler applies; bytes are only counted.
    PassThrough,
}

/// A tracked TCP connection.
pub struct Connection {
    pub id: u64,
    pub key: ConnectionKey,

    /// True if ip_a/port_a is the client.
    pub client_is_a: bool,
    pub role: RoleSource,

    /// Timing (seconds).
    pub start_time: f64,
    pub last_activity: f64,

    pub transactions: u64,

    a: StreamBuffer,
    b: StreamBuffer,
    pub(crate) dispatch: Dispatch,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        key: ConnectionKey,
        client_is_a: bool,
        role: RoleSource,
        timestamp: f64,
    ) -> Self {
        Self {
            id,
            key,
            client_is_a,
            role,
            start_time: timestamp,
            last_activity: timestamp,
            transactions: 0,
            a: StreamBuffer::new(),
            b: StreamBuffer::new(),
            dispatch: Dispatch::Unresolved,
        }
    }

    fn client_side(&self) -> Side {
        if self.client_is_a {
            Side::A
        } else {
            Side::B
        }
    }

    pub fn client(&self) -> SocketAddr {
        self.key.endpoint(self.client_side())
    }

    pub fn server(&self) -> SocketAddr {
        self.key.endpoint(self.client_side().other())
    }

    /// Direction of data sent by `side`.
    pub fn direction(&self, side: Side) -> Direction {
        if side == self.client_side() {
            Direction::ToServer
        } else {
            Direction::ToClient
        }
    }

    pub fn buffer(&self, side: Side) -> &StreamBuffer {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn buffer_mut(&mut self, side: Side) -> &mut StreamBuffer {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    /// Whether any byte has been handed on yet.
    pub fn has_released(&self) -> bool {
        !matches!(self.dispatch, Dispatch::Unresolved)
    }

    /// Learn roles from handshake flags sent by `side`.
    ///
    /// Roles only change while nothing has been released, and only to a
    /// stronger source.
    pub fn observe_handshake(&mut self, side: Side, flags: TcpFlags) {
        let (source, client) = if flags.is_syn_only() {
            (RoleSource::Syn, side)
        } else if flags.is_syn_ack() {
            (RoleSource::SynAck, side.other())
        } else {
            return;
        };
        if self.has_released() || source >= self.role {
            return;
        }
        self.client_is_a = client == Side::A;
        self.role = source;
    }

    /// Pending bytes over both directions.
    pub fn pending_bytes(&self) -> usize {
        self.a.pending_bytes() + self.b.pending_bytes()
    }

    /// Both directions have released everything up to their FIN.
    pub fn is_fully_closed(&self) -> bool {
        self.a.is_closed() && self.b.is_closed()
    }

    /// Statistics as (sent, received).
    pub fn stats(&self) -> (StreamStats, StreamStats) {
        let client = self.client_side();
        (
            self.buffer(client).stats(),
            self.buffer(client.other()).stats(),
        )
    }
}

/// Stable reference to a connection slot.
///
/// A handle outlives its connection only as a stale value: the slot's
/// generation moves on when the connection is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    connection: Option<Connection>,
}

/// Arena of live connections, looked up by key.
pub struct ConnectionTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: HashMap<ConnectionKey, ConnectionHandle>,
    next_id: u64,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn lookup(&self, key: &ConnectionKey) -> Option<ConnectionHandle> {
        self.index.get(key).copied()
    }

    /// Create a connection, assigning the next id.
    pub fn insert(
        &mut self,
        key: ConnectionKey,
        client_is_a: bool,
        role: RoleSource,
        timestamp: f64,
    ) -> ConnectionHandle {
        let connection = Connection::new(self.next_id, key.clone(), client_is_a, role, timestamp);
        self.next_id += 1;

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.connection = Some(connection);
                ConnectionHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    connection: Some(connection),
                });
                ConnectionHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.index.insert(key, handle);
        handle
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.connection.as_ref())
    }

    pub fn get_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.connection.as_mut())
    }

    /// Remove a connection and invalidate its handle.
    pub fn remove(&mut self, handle: ConnectionHandle) -> Option<Connection> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let connection = slot.connection.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.index.remove(&connection.key);
        Some(connection)
    }

    /// Handles of all live connections, oldest first.
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        let mut live: Vec<(u64, ConnectionHandle)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.connection.as_ref().map(|c| {
                    (
                        c.id,
                        ConnectionHandle {
                            index: index as u32,
                            generation: slot.generation,
                        },
                    )
                })
            })
            .collect();
        live.sort_unstable_by_key(|(id, _)| *id);
        live.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}
