//! Synthetic capture building shared by the integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;

use etherparse::PacketBuilder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const CLIENT_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
const SERVER_MAC: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];

#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

pub const SYN: Flags = Flags {
    syn: true,
    ack: false,
    fin: false,
    rst: false,
};
pub const SYN_ACK: Flags = Flags {
    syn: true,
    ack: true,
    fin: false,
    rst: false,
};
pub const ACK: Flags = Flags {
    syn: false,
    ack: true,
    fin: false,
    rst: false,
};
pub const FIN_ACK: Flags = Flags {
    syn: false,
    ack: true,
    fin: true,
    rst: false,
};

/// One Ethernet/IPv4/TCP frame.
pub fn tcp_frame(
    src: ([u8; 4], u16),
    dst: ([u8; 4], u16),
    seq: u32,
    ack: u32,
    flags: Flags,
    payload: &[u8],
) -> Vec<u8> {
    let mut builder = PacketBuilder::ethernet2(CLIENT_MAC, SERVER_MAC)
        .ipv4(src.0, dst.0, 64)
        .tcp(src.1, dst.1, seq, 65535);
    if flags.syn {
        builder = builder.syn();
    }
    if flags.ack {
        builder = builder.ack(ack);
    }
    if flags.fin {
        builder = builder.fin();
    }
    if flags.rst {
        builder = builder.rst();
    }
    if !payload.is_empty() {
        builder = builder.psh();
    }

    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

/// A TCP conversation with sequence numbers tracked per side.
pub struct Session {
    client: ([u8; 4], u16),
    server: ([u8; 4], u16),
    client_seq: u32,
    server_seq: u32,
    frames: Vec<Vec<u8>>,
}

impl Session {
    pub fn new(client_port: u16, server_port: u16) -> Self {
        Self {
            client: ([10, 0, 0, 1], client_port),
            server: ([10, 0, 0, 2], server_port),
            client_seq: 1_000,
            server_seq: 5_000,
            frames: Vec::new(),
        }
    }

    /// Start the sequence numbers close to the 32-bit wrap.
    pub fn near_wrap(mut self) -> Self {
        self.client_seq = u32::MAX - 20;
        self.server_seq = u32::MAX - 3;
        self
    }

    pub fn handshake(&mut self) {
        let (c, s) = (self.client_seq, self.server_seq);
        self.frames
            .push(tcp_frame(self.client, self.server, c, 0, SYN, b""));
        self.frames
            .push(tcp_frame(self.server, self.client, s, c.wrapping_add(1), SYN_ACK, b""));
        self.client_seq = c.wrapping_add(1);
        self.server_seq = s.wrapping_add(1);
        self.frames.push(tcp_frame(
            self.client,
            self.server,
            self.client_seq,
            self.server_seq,
            ACK,
            b"",
        ));
    }

    pub fn client_sends(&mut self, data: &[u8]) {
        let frame = tcp_frame(self.client, self.server, self.client_seq, self.server_seq, ACK, data);
        self.client_seq = self.client_seq.wrapping_add(data.len() as u32);
        self.frames.push(frame);
    }

    pub fn server_sends(&mut self, data: &[u8]) {
        let frame = tcp_frame(self.server, self.client, self.server_seq, self.client_seq, ACK, data);
        self.server_seq = self.server_seq.wrapping_add(data.len() as u32);
        self.frames.push(frame);
    }

    /// FIN from both sides.
    pub fn close(&mut self) {
        let (c, s) = (self.client_seq, self.server_seq);
        self.frames
            .push(tcp_frame(self.client, self.server, c, s, FIN_ACK, b""));
        self.frames.push(tcp_frame(
            self.server,
            self.client,
            s,
            c.wrapping_add(1),
            FIN_ACK,
            b"",
        ));
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Vec<u8>> {
        self.frames
    }
}

/// Legacy little-endian microsecond PCAP with Ethernet link type.
/// Frame `i` is stamped `1_000_000_000 + i` seconds.
pub fn pcap_bytes(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes()); // Magic
    data.extend_from_slice(&2u16.to_le_bytes()); // Version major
    data.extend_from_slice(&4u16.to_le_bytes()); // Version minor
    data.extend_from_slice(&0i32.to_le_bytes()); // Thiszone
    data.extend_from_slice(&0u32.to_le_bytes()); // Sigfigs
    data.extend_from_slice(&65535u32.to_le_bytes()); // Snaplen
    data.extend_from_slice(&1u32.to_le_bytes()); // Network (Ethernet)

    for (i, frame) in frames.iter().enumerate() {
        data.extend_from_slice(&(1_000_000_000 + i as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(frame);
    }
    data
}

pub fn write_pcap(frames: &[Vec<u8>]) -> NamedTempFile {
    let mut temp = NamedTempFile::with_suffix(".pcap").unwrap();
    temp.write_all(&pcap_bytes(frames)).unwrap();
    temp.flush().unwrap();
    temp
}

pub fn write_pcap_gz(frames: &[Vec<u8>]) -> NamedTempFile {
    let temp = NamedTempFile::with_suffix(".pcap.gz").unwrap();
    let file = File::create(temp.path()).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&pcap_bytes(frames)).unwrap();
    encoder.finish().unwrap();
    temp
}
