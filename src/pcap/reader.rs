//! PCAP file reader with automatic compression handling.
//!
//! [`PcapReader`] is a thin wrapper around
//! [`GenericPcapReader`](crate::io::GenericPcapReader) that adds:
//! - File opening with a path-based API
//! - Gzip detection and decompression
//! - PCAP format detection (Legacy vs PCAPNG)

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::error::{Error, PcapError};
use crate::io::{DecompressReader, FileDecoder, GenericPcapReader, PcapFormat, RawPacket};

/// Reader for PCAP and PCAPNG files, optionally gzip-compressed.
///
/// # Example
///
/// ```ignore
/// use pcapreplay::pcap::PcapReader;
///
/// let mut reader = PcapReader::open("smtp.pcap.gz")?;
/// while let Some(packet) = reader.next_packet()? {
///     println!("Frame {}: {} bytes", packet.frame_number, packet.data.len());
/// }
/// ```
pub struct PcapReader {
    inner: GenericPcapReader<BufReader<FileDecoder>>,
}

impl PcapReader {
    /// Open a capture file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::Pcap(PcapError::FileNotFound {
                path: path.display().to_string(),
            }),
            _ => Error::Io(e),
        })?;

        let decoder = DecompressReader::detect(BufReader::new(file))?;
        tracing::debug!(
            path = %path.display(),
            compression = %decoder.compression(),
            "opening capture"
        );

        let inner = GenericPcapReader::detect(BufReader::new(decoder))?;
        Ok(Self { inner })
    }

    /// Detected capture format.
    #[inline]
    pub fn format(&self) -> PcapFormat {
        self.inner.format()
    }

    /// Get the link type of the capture (e.g., 1 = Ethernet).
    #[inline]
    pub fn link_type(&self) -> u16 {
        self.inner.link_type()
    }

    /// Get the current frame count.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count()
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` at end of file.
    #[inline]
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        self.inner.next_packet()
    }
}

/// Iterator adapter for PcapReader.
impl Iterator for PcapReader {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}
