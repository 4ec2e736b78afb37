//! Progress sinks
//!
//! Fire-and-forget delivery of [`BatchProgress`]. `emit` must never block the
//! pipeline; slow consumers only ever see the latest value.

use tokio::sync::watch;
use tracing::info;

use crate::domain::BatchProgress;

/// Receives progress snapshots from the orchestrator
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: BatchProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(BatchProgress) + Send + Sync,
{
    fn emit(&self, progress: BatchProgress) {
        self(progress);
    }
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _progress: BatchProgress) {}
}

/// Writes every update as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProgressSink;

impl ProgressSink for LoggingProgressSink {
    fn emit(&self, progress: BatchProgress) {
        info!(
            status = %progress.status,
            completed_chunks = progress.completed_chunks,
            total_chunks = progress.total_chunks,
            processed_photos = progress.processed_photos,
            eta_secs = ?progress.estimated_seconds_remaining,
            "📊 Batch progress {:.1}%",
            progress.percentage()
        );
    }
}

/// Publishes into a `tokio::sync::watch` channel
#[derive(Debug)]
pub struct WatchProgressSink {
    sender: watch::Sender<BatchProgress>,
}

impl WatchProgressSink {
    /// Sink plus a receiver that always holds the latest snapshot
    pub fn channel() -> (Self, watch::Receiver<BatchProgress>) {
        let (sender, receiver) = watch::channel(BatchProgress::default());
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.sender.subscribe()
    }
}

impl ProgressSink for WatchProgressSink {
    fn emit(&self, progress: BatchProgress) {
        // send_replace never fails, even with no receivers left
        self.sender.send_replace(progress);
    }
}
