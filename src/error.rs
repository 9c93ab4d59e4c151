//! Error types for pcapreplay.
//!
//! Only the packet source can fail a run. Reassembly and protocol decoding
//! recover from malformed input on their own, so these types cover:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`PcapError`] - Errors from capture file reading and link-layer decoding
//!
//! All errors implement `std::error::Error`.

use thiserror::Error;

/// Main error type for pcapreplay operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or decoding the capture file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture file reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },

    /// Link type without a decoder
    #[error("Unsupported link type: {link_type}")]
    UnsupportedLinkType { link_type: u16 },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
