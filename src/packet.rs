//! TCP packet records.
//!
//! A [`PacketRecord`] is what the stream layer consumes: addressing, flags,
//! the sequence number and the payload of one TCP segment. [`decode_tcp`]
//! builds one from a captured frame with `etherparse`; [`TcpPackets`] adapts
//! a whole capture reader.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use etherparse::{EtherType, LaxNetSlice, LaxSlicedPacket, TransportSlice};
use tracing::trace;

use crate::error::{Error, PcapError};
use crate::io::RawPacket;

/// Link types with a decoder.
pub mod link_types {
    /// BSD loopback (4-byte address family header).
    pub const NULL: u16 = 0;
    /// Ethernet II.
    pub const ETHERNET: u16 = 1;
    /// Raw IP (OpenBSD value).
    pub const RAW_OPENBSD: u16 = 12;
    /// Raw IP.
    pub const RAW: u16 = 101;
    /// OpenBSD loopback.
    pub const LOOP: u16 = 108;
    /// Linux "cooked" capture.
    pub const LINUX_SLL: u16 = 113;
    /// Raw IPv4.
    pub const IPV4: u16 = 228;
    /// Raw IPv6.
    pub const IPV6: u16 = 229;
}

/// TCP flags relevant to stream tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    /// SYN without ACK, the first packet of a handshake.
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }

    /// SYN+ACK, the server's half of the handshake.
    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

/// One TCP segment as seen on the wire.
#[derive(Debug, Clone)]
pub struct PacketRecord {
    /// Frame number in the capture (0 when not read from a file)
    pub frame_number: u64,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub flags: TcpFlags,
    pub seq: u32,
    pub payload: Bytes,
}

impl PacketRecord {
    /// Build a record from socket addresses, mostly for synthetic input.
    pub fn new(
        src: SocketAddr,
        dst: SocketAddr,
        seq: u32,
        flags: TcpFlags,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            frame_number: 0,
            timestamp: 0.0,
            src_ip: src.ip(),
            src_port: src.port(),
            dst_ip: dst.ip(),
            dst_port: dst.port(),
            flags,
            seq,
            payload: payload.into(),
        }
    }

    /// Set the capture timestamp.
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn src(&self) -> SocketAddr {
        SocketAddr::new(self.src_ip, self.src_port)
    }

    pub fn dst(&self) -> SocketAddr {
        SocketAddr::new(self.dst_ip, self.dst_port)
    }
}

/// Decode a captured frame into a TCP record.
///
/// Returns `Ok(None)` for frames that are not TCP over IP, are IP fragments,
/// or are too damaged to slice. Frames cut by the snapshot length keep the
/// payload bytes that were captured. Only an unknown link type is an error,
/// since it applies to every frame of the capture.
pub fn decode_tcp(raw: &RawPacket) -> Result<Option<PacketRecord>, Error> {
    use link_types::*;

    let data = &raw.data[..];
    let sliced = match raw.link_type {
        ETHERNET => LaxSlicedPacket::from_ethernet(data).ok(),
        RAW | RAW_OPENBSD | IPV4 | IPV6 => LaxSlicedPacket::from_ip(data).ok(),
        LINUX_SLL => linux_sll(data),
        NULL | LOOP => data.get(4..).and_then(|ip| LaxSlicedPacket::from_ip(ip).ok()),
        link_type => {
            return Err(Error::Pcap(PcapError::UnsupportedLinkType { link_type }));
        }
    };

    let Some(sliced) = sliced else {
        trace!(frame = raw.frame_number, "skipping undecodable frame");
        return Ok(None);
    };

    let (src_ip, dst_ip): (IpAddr, IpAddr) = match &sliced.net {
        Some(LaxNetSlice::Ipv4(ipv4)) => (
            ipv4.header().source_addr().into(),
            ipv4.header().destination_addr().into(),
        ),
        Some(LaxNetSlice::Ipv6(ipv6)) => (
            ipv6.header().source_addr().into(),
            ipv6.header().destination_addr().into(),
        ),
        _ => return Ok(None),
    };

    let tcp = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => tcp,
        _ => return Ok(None),
    };
    if raw.is_truncated() {
        trace!(
            frame = raw.frame_number,
            captured = raw.captured_length,
            original = raw.original_length,
            "frame truncated by snaplen"
        );
    }

    Ok(Some(PacketRecord {
        frame_number: raw.frame_number,
        timestamp: raw.timestamp_secs(),
        src_ip,
        src_port: tcp.source_port(),
        dst_ip,
        dst_port: tcp.destination_port(),
        flags: TcpFlags {
            syn: tcp.syn(),
            ack: tcp.ack(),
            fin: tcp.fin(),
            rst: tcp.rst(),
        },
        seq: tcp.sequence_number(),
        payload: raw.data.slice_ref(tcp.payload()),
    }))
}

/// Linux cooked capture: a 16-byte header ending in the ether type.
fn linux_sll(data: &[u8]) -> Option<LaxSlicedPacket<'_>> {
    let ether_type = u16::from_be_bytes([*data.get(14)?, *data.get(15)?]);
    let network = data.get(16..)?;
    Some(LaxSlicedPacket::from_ether_type(EtherType(ether_type), network))
}

/// Adapter turning a stream of captured frames into TCP records.
///
/// Frames that are not TCP are skipped; reader errors pass through.
pub struct TcpPackets<I> {
    frames: I,
}

impl<I> TcpPackets<I>
where
    I: Iterator<Item = Result<RawPacket, Error>>,
{
    pub fn new(frames: I) -> Self {
        Self { frames }
    }
}

impl<I> Iterator for TcpPackets<I>
where
    I: Iterator<Item = Result<RawPacket, Error>>,
{
    type Item = Result<PacketRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.frames.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            match decode_tcp(&raw) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
