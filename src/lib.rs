//! pcapreplay - Rebuild TCP conversations from packet captures.
//!
//! Packets are grouped into connections, each direction's byte stream is
//! reassembled from out-of-order and retransmitted segments, and the bytes
//! are handed to protocol handlers selected by service port. Handlers turn
//! the streams into request/reply [`Transaction`](stream::Transaction)s.
//! SMTP is built in.
//!
//! # Example
//!
//! ```no_run
//! use pcapreplay::stream::{default_registry, StreamConfig};
//!
//! fn main() -> pcapreplay::Result<()> {
//!     let transactions =
//!         pcapreplay::read_transactions("smtp.pcap", default_registry(), StreamConfig::default())?;
//!     for transaction in transactions {
//!         let transaction = transaction?;
//!         println!("{} {} -> {}", transaction.protocol, transaction.client, transaction.server);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod io;
pub mod packet;
pub mod pcap;
pub mod prelude;
pub mod stream;

use std::path::Path;

pub use error::{Error, Result};

use packet::TcpPackets;
use pcap::PcapReader;
use stream::{HandlerRegistry, StreamConfig, StreamManager, Transactions};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open a capture file and iterate over the transactions in it.
///
/// Opening errors are returned here; errors further into the file end the
/// iteration with an `Err` item.
pub fn read_transactions<P: AsRef<Path>>(
    path: P,
    registry: HandlerRegistry,
    config: StreamConfig,
) -> Result<Transactions<TcpPackets<PcapReader>>> {
    let reader = PcapReader::open(path)?;
    let manager = StreamManager::new(registry, config);
    Ok(manager.transactions(TcpPackets::new(reader)))
}
