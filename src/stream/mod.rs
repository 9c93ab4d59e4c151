//! TCP stream processing and application-layer parsing.
//!
//! [`StreamManager`] groups packets into connections, rebuilds each
//! direction's byte stream and feeds the bytes to the [`StreamHandler`]
//! that the [`HandlerRegistry`] selects by service port. Handlers turn the
//! bytes into [`Transaction`]s.

mod connection;
mod context;
mod handler;
mod manager;
pub mod parsers;
mod reassembly;
mod registry;

pub use connection::{Connection, ConnectionHandle, ConnectionKey, ConnectionTable, RoleSource, Side};
pub use context::{Direction, Reply, Request, StreamContext, Transaction};
pub use handler::{HandlerFactory, StreamHandler};
pub use manager::{StreamConfig, StreamManager, Transactions};
pub use reassembly::{Segment, StreamBuffer, StreamStats};
pub use registry::{default_registry, HandlerRegistry};
