//! Progress reporting collaborator.

/// Receives one `advance` per finished unit.
///
/// Implementations must be cheap and thread-safe; they are called from the
/// worker pool's collection side while fetches are still running.
pub trait Progress: Send + Sync {
    /// A new batch of `total` units is about to run.
    fn start(&self, _total: u64) {}

    /// One unit finished (whatever its outcome).
    fn advance(&self);

    /// The batch is complete.
    fn finish(&self) {}
}

/// Silent progress sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&self) {}
}
