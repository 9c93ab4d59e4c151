//! Commonly used types.
//!
//! ```
//! use pcapreplay::prelude::*;
//! ```

pub use crate::error::{Error, PcapError, Result};
pub use crate::packet::{PacketRecord, TcpFlags, TcpPackets};
pub use crate::pcap::PcapReader;
pub use crate::read_transactions;
pub use crate::stream::parsers::smtp::{SmtpHandler, SmtpReply, SmtpRequest};
pub use crate::stream::{
    default_registry, Direction, HandlerFactory, HandlerRegistry, Reply, Request, StreamConfig,
    StreamHandler, StreamManager, Transaction, Transactions,
};
