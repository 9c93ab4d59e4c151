//! Packet I/O.
//!
//! Readers here produce [`RawPacket`]s, one captured frame each, in capture
//! order. Link-layer decoding into TCP records lives in [`crate::packet`].
//!
//! ## Compression Support
//!
//! Gzip-compressed captures are detected from their magic bytes and
//! decompressed transparently.

mod decompress;
mod pcap_stream;
mod source;

pub use decompress::{Compression, DecompressReader, FileDecoder};
pub use pcap_stream::{GenericPcapReader, PcapFormat};
pub use source::RawPacket;
