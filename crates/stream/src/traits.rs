/// Lifecycle callbacks for a stream client.
///
/// Called from the driver task, in the order the transitions happen.
/// Implementations must not block.
pub trait StreamObserver: Send + Sync {
    /// Socket handshake completed; the subscribe request has been sent
    fn on_open(&self) {}

    fn on_close(&self, _code: Option<u16>, _reason: &str) {}

    /// Transport error; a close normally follows
    fn on_error(&self, _message: &str) {}
}

/// Observer that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}
