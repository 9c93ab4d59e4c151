//! Generic PCAP/PCAPNG reader over any `Read` source.
//!
//! Block parsing is delegated to the `pcap_parser` crate; this module only
//! tracks frame numbers, link types and timestamp resolution (per interface
//! for PCAPNG).
//!
//! ## Usage
//!
//! ```ignore
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = BufReader::new(File::open("capture.pcap")?);
//! let mut reader = GenericPcapReader::detect(file)?;
//! while let Some(packet) = reader.next_packet()? {
//!     println!("frame {} on link type {}", packet.frame_number, packet.link_type);
//! }
//! ```

use std::io::{BufRead, Read};

use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapNGReader};

use crate::error::{Error, PcapError};
use crate::io::RawPacket;

/// Internal buffer size for pcap_parser readers (256KB).
const BUFFER_SIZE: usize = 262144;

/// Format of the capture file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcapFormat {
    /// Classic PCAP (little-endian, microseconds)
    LegacyLeMicro,
    /// Classic PCAP (big-endian, microseconds)
    LegacyBeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LegacyLeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    LegacyBeNano,
    /// PCAPNG format
    PcapNg,
}

impl PcapFormat {
    /// Detect the capture format from the first four bytes of the file.
    pub fn detect(data: &[u8]) -> Result<Self, Error> {
        let magic = match data.get(..4).and_then(|m| <[u8; 4]>::try_from(m).ok()) {
            Some(magic) => magic,
            None => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: "Data too small for PCAP magic".into(),
                }))
            }
        };

        match magic {
            [0xd4, 0xc3, 0xb2, 0xa1] => Ok(PcapFormat::LegacyLeMicro),
            [0xa1, 0xb2, 0xc3, 0xd4] => Ok(PcapFormat::LegacyBeMicro),
            [0x4d, 0x3c, 0xb2, 0xa1] => Ok(PcapFormat::LegacyLeNano),
            [0xa1, 0xb2, 0x3c, 0x4d] => Ok(PcapFormat::LegacyBeNano),
            [0x0a, 0x0d, 0x0d, 0x0a] => Ok(PcapFormat::PcapNg),
            _ => Err(Error::Pcap(PcapError::InvalidFormat {
                reason: format!("Unknown PCAP magic: 0x{}", hex_magic(&magic)),
            })),
        }
    }

    /// Whether this is a PCAPNG format.
    pub fn is_pcapng(&self) -> bool {
        matches!(self, PcapFormat::PcapNg)
    }

    /// Whether this is a legacy PCAP format.
    pub fn is_legacy(&self) -> bool {
        !self.is_pcapng()
    }

    /// Whether legacy record timestamps carry nanoseconds instead of microseconds.
    pub fn is_nanosecond(&self) -> bool {
        matches!(self, PcapFormat::LegacyLeNano | PcapFormat::LegacyBeNano)
    }
}

fn hex_magic(magic: &[u8; 4]) -> String {
    magic.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generic PCAP/PCAPNG reader over any `Read` source.
pub struct GenericPcapReader<R: Read> {
    inner: ReaderInner<R>,
    format: PcapFormat,
    frame_number: u64,
    link_type: u16,
    /// PCAPNG interfaces of the current section, by interface id.
    interfaces: Vec<Interface>,
}

/// What a PCAPNG interface description says about its packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Interface {
    link_type: u16,
    /// Timestamp units per second (`if_tsresol`).
    resolution: u64,
    /// Seconds added to every timestamp (`if_tsoffset`).
    offset: i64,
}

impl Interface {
    /// Microseconds since the epoch for a raw 64-bit timestamp.
    fn timestamp_us(&self, ts: u64) -> i64 {
        let resolution = self.resolution.max(1);
        let secs = i64::try_from(ts / resolution)
            .unwrap_or(i64::MAX)
            .saturating_add(self.offset);
        let fraction = (u128::from(ts % resolution) * 1_000_000 / u128::from(resolution)) as i64;
        secs.saturating_mul(1_000_000).saturating_add(fraction)
    }
}

/// Format-specific pcap_parser reader.
enum ReaderInner<R: Read> {
    Legacy(LegacyPcapReader<R>),
    Ng(PcapNGReader<R>),
}

impl<R: Read> GenericPcapReader<R> {
    /// Create a reader with known format.
    pub fn with_format(source: R, format: PcapFormat) -> Result<Self, Error> {
        let inner = if format.is_pcapng() {
            let reader = PcapNGReader::new(BUFFER_SIZE, source).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse PCAPNG: {}", e),
                })
            })?;
            ReaderInner::Ng(reader)
        } else {
            let reader = LegacyPcapReader::new(BUFFER_SIZE, source).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse legacy PCAP: {}", e),
                })
            })?;
            ReaderInner::Legacy(reader)
        };

        Ok(GenericPcapReader {
            inner,
            format,
            frame_number: 0,
            link_type: 1, // Ethernet until a header says otherwise
            interfaces: Vec::new(),
        })
    }

    /// Format of the underlying capture.
    pub fn format(&self) -> PcapFormat {
        self.format
    }

    /// Get the link type (e.g., 1 = Ethernet).
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Get the current frame count.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        let nanos = self.format.is_nanosecond();
        match &mut self.inner {
            ReaderInner::Legacy(reader) => {
                read_legacy_packet(reader, nanos, &mut self.frame_number, &mut self.link_type)
            }
            ReaderInner::Ng(reader) => read_pcapng_packet(
                reader,
                &mut self.frame_number,
                &mut self.link_type,
                &mut self.interfaces,
            ),
        }
    }
}

impl<R: BufRead> GenericPcapReader<R> {
    /// Peek at the magic bytes of `source` and build a reader for that format.
    pub fn detect(mut source: R) -> Result<Self, Error> {
        let head = source.fill_buf()?;
        let format = PcapFormat::detect(head)?;
        Self::with_format(source, format)
    }
}

impl<R: Read> Iterator for GenericPcapReader<R> {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

/// Read next packet from a legacy PCAP reader.
fn read_legacy_packet<S: Read>(
    reader: &mut LegacyPcapReader<S>,
    nanos: bool,
    frame_number: &mut u64,
    link_type: &mut u16,
) -> Result<Option<RawPacket>, Error> {
    use pcap_parser::PcapError as PcapParserError;

    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    *frame_number += 1;

                    let fraction = if nanos {
                        packet.ts_usec as i64 / 1_000
                    } else {
                        packet.ts_usec as i64
                    };
                    let raw = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us: (packet.ts_sec as i64) * 1_000_000 + fraction,
                        captured_length: packet.caplen,
                        original_length: packet.origlen,
                        link_type: *link_type,
                        data: Bytes::copy_from_slice(packet.data),
                    };

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_type = header.network.0 as u16;
                    reader.consume(offset);
                }
                _ => reader.consume(offset),
            },
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("Legacy PCAP refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Legacy PCAP parse error: {}", e),
                }));
            }
        }
    }
}

/// Read next packet from a PCAPNG reader.
fn read_pcapng_packet<S: Read>(
    reader: &mut PcapNGReader<S>,
    frame_number: &mut u64,
    link_type: &mut u16,
    interfaces: &mut Vec<Interface>,
) -> Result<Option<RawPacket>, Error> {
    use pcap_parser::pcapng::Block;
    use pcap_parser::PcapError as PcapParserError;

    loop {
        match reader.next() {
            Ok((offset, PcapBlockOwned::NG(block))) => match block {
                Block::SectionHeader(_) => {
                    // Interface ids restart in every section
                    interfaces.clear();
                    reader.consume(offset);
                }
                Block::InterfaceDescription(idb) => {
                    *link_type = idb.linktype.0 as u16;
                    interfaces.push(Interface {
                        link_type: *link_type,
                        resolution: idb.ts_resolution().unwrap_or(1_000_000),
                        offset: idb.ts_offset(),
                    });
                    reader.consume(offset);
                }
                Block::EnhancedPacket(epb) => {
                    *frame_number += 1;

                    let interface = interfaces
                        .get(epb.if_id as usize)
                        .copied()
                        .unwrap_or(Interface {
                            link_type: *link_type,
                            resolution: 1_000_000,
                            offset: 0,
                        });
                    let ts = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);
                    let packet = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us: interface.timestamp_us(ts),
                        captured_length: epb.caplen,
                        original_length: epb.origlen,
                        link_type: interface.link_type,
                        data: Bytes::copy_from_slice(epb.data),
                    };

                    reader.consume(offset);
                    return Ok(Some(packet));
                }
                Block::SimplePacket(spb) => {
                    *frame_number += 1;

                    // Simple packets always belong to the first interface
                    let packet = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us: 0,
                        captured_length: spb.data.len() as u32,
                        original_length: spb.origlen,
                        link_type: interfaces.first().map_or(*link_type, |i| i.link_type),
                        data: Bytes::copy_from_slice(spb.data),
                    };

                    reader.consume(offset);
                    return Ok(Some(packet));
                }
                _ => reader.consume(offset),
            },
            Ok((offset, _)) => reader.consume(offset),
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("PCAPNG refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("PCAPNG parse error: {}", e),
                }));
            }
        }
    }
}
