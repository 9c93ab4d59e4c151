//! Fuzz target for the stream manager.
//!
//! Every 8-byte record becomes one segment of a single connection: side,
//! flags, a sequence offset and a payload length.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcapreplay::packet::{PacketRecord, TcpFlags};
use pcapreplay::stream::{default_registry, StreamConfig, StreamManager};
use std::net::SocketAddr;

const PAYLOAD: &[u8] = b"EHLO x\r\nMAIL FROM:<a@b>\r\nDATA\r\n250 ok\r\n354 go\r\nbody\r\n.\r\n";

fuzz_target!(|data: &[u8]| {
    let client: SocketAddr = "10.0.0.1:40000".parse().unwrap();
    let server: SocketAddr = "10.0.0.2:25".parse().unwrap();
    let mut manager = StreamManager::new(
        default_registry(),
        StreamConfig {
            max_pending_bytes: 256,
        },
    );

    for record in data.chunks_exact(8) {
        let (src, dst) = if record[0] & 1 == 0 {
            (client, server)
        } else {
            (server, client)
        };
        let flags = TcpFlags {
            syn: record[1] & 1 != 0,
            ack: record[1] & 2 != 0,
            fin: record[1] & 4 != 0,
            rst: record[1] & 8 != 0,
        };
        let seq = u32::from_be_bytes([record[2], record[3], record[4], record[5]]);
        let start = record[6] as usize % PAYLOAD.len();
        let end = (start + record[7] as usize).min(PAYLOAD.len());

        let packet = PacketRecord::new(src, dst, seq, flags, &PAYLOAD[start..end]);
        let _ = manager.process_packet(&packet);
    }
    let _ = manager.finish();
});
