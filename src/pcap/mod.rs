//! PCAP file reading module.
//!
//! This module handles opening PCAP and PCAPNG files from disk and exposing
//! their frames as [`crate::io::RawPacket`]s.

mod reader;

pub use reader::PcapReader;
