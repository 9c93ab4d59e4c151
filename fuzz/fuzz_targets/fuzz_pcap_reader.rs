//! Fuzz target for capture file parsing and TCP decoding.
//!
//! Covers magic detection, legacy and PCAPNG block parsing, and link-layer
//! slicing of whatever frames come out.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcapreplay::io::{GenericPcapReader, PcapFormat};
use pcapreplay::packet::decode_tcp;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let Ok(format) = PcapFormat::detect(data) else {
        return;
    };
    let Ok(mut reader) = GenericPcapReader::with_format(Cursor::new(data), format) else {
        return;
    };
    while let Ok(Some(packet)) = reader.next_packet() {
        let _ = decode_tcp(&packet);
    }
});
