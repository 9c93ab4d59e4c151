use super::{Direction, Reply, Request, StreamContext};

/// Protocol state machine fed with the ordered bytes of one connection.
///
/// The manager calls [`consume`](StreamHandler::consume) for every chunk
/// released by reassembly, in arrival order across both directions, and
/// polls [`transaction_ready`](StreamHandler::transaction_ready) after each
/// call until it returns `None`.
pub trait StreamHandler: Send {
    /// Protocol identifier (e.g., "smtp").
    fn name(&self) -> &'static str;

    /// Feed contiguous stream bytes for one direction.
    fn consume(&mut self, direction: Direction, data: &[u8]);

    /// Take the next completed request/reply pair, if any.
    fn transaction_ready(&mut self) -> Option<(Request, Reply)>;

    /// The connection is gone; flush whatever can still be paired.
    fn finish(&mut self) {}
}

/// Creates a handler per connection.
pub trait HandlerFactory: Send + Sync {
    /// Protocol identifier of the handlers this factory creates.
    fn name(&self) -> &'static str;

    fn create(&self, context: &StreamContext) -> Box<dyn StreamHandler>;
}
