//! Fuzz target for the SMTP session decoder.
//!
//! The input is cut into chunks; the low bit of each chunk's first byte
//! picks the direction. The decoder must never panic, whatever the order.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcapreplay::stream::parsers::SmtpHandler;
use pcapreplay::stream::{Direction, StreamHandler};

fuzz_target!(|data: &[u8]| {
    let mut handler = SmtpHandler::new();

    for chunk in data.chunks(37) {
        let (selector, payload) = match chunk.split_first() {
            Some(split) => split,
            None => continue,
        };
        let direction = if selector & 1 == 0 {
            Direction::ToServer
        } else {
            Direction::ToClient
        };
        handler.consume(direction, payload);
        while handler.transaction_ready().is_some() {}
    }

    handler.finish();
    while handler.transaction_ready().is_some() {}
});
