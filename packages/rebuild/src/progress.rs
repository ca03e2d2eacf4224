//! Progress reporting for rebuild runs.
//!
//! The pipeline reports through [`ProgressCallback`] and never renders
//! anything itself; binaries plug in progress bars, tests use
//! [`NullProgress`].

use std::sync::Arc;

/// Receives progress from a rebuild run.
///
/// Implementations must be `Send + Sync`; the pipeline reports from
/// concurrently running staging tasks.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of (location, window) entries to stage.
    fn set_total(&self, total: u64);

    /// Advances by `delta` finished entries.
    fn inc(&self, delta: u64);

    /// Updates the phase message.
    fn set_message(&self, msg: String);

    /// Marks the run as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
