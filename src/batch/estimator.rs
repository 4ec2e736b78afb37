//! Progress estimator
//!
//! Linear extrapolation of the remaining time from the average chunk duration
//! observed so far. Intentionally coarse: no smoothing, no outlier rejection.

use chrono::Utc;
use tokio::time::Instant;

use crate::domain::{BatchProgress, BatchStatus};

/// Estimated seconds remaining, `None` until at least one chunk has completed
pub fn estimate_remaining_secs(
    completed_chunks: usize,
    total_chunks: usize,
    elapsed_secs: f64,
) -> Option<f64> {
    if completed_chunks == 0 {
        return None;
    }
    if completed_chunks >= total_chunks {
        return Some(0.0);
    }
    let per_chunk = elapsed_secs.max(0.0) / completed_chunks as f64;
    let remaining = per_chunk * (total_chunks - completed_chunks) as f64;
    Some(remaining.max(0.0))
}

/// Completed fraction clamped to [0, 1]; an empty run counts as complete
pub fn progress_fraction(completed_chunks: usize, total_chunks: usize) -> f64 {
    if total_chunks == 0 {
        return 1.0;
    }
    (completed_chunks as f64 / total_chunks as f64).clamp(0.0, 1.0)
}

/// Builds [`BatchProgress`] snapshots for one run
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    started_at: Instant,
    total_chunks: usize,
    total_photos: usize,
}

impl ProgressEstimator {
    pub fn start(total_chunks: usize, total_photos: usize) -> Self {
        Self::started_at(Instant::now(), total_chunks, total_photos)
    }

    pub fn started_at(started_at: Instant, total_chunks: usize, total_photos: usize) -> Self {
        Self { started_at, total_chunks, total_photos }
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Snapshot while the run is in flight
    pub fn snapshot(
        &self,
        completed_chunks: usize,
        current_chunk: usize,
        processed_photos: usize,
    ) -> BatchProgress {
        self.snapshot_at(completed_chunks, current_chunk, processed_photos, self.elapsed_secs())
    }

    /// Snapshot with an explicit elapsed time
    pub fn snapshot_at(
        &self,
        completed_chunks: usize,
        current_chunk: usize,
        processed_photos: usize,
        elapsed_secs: f64,
    ) -> BatchProgress {
        let completed = completed_chunks.min(self.total_chunks);
        BatchProgress {
            total_chunks: self.total_chunks,
            completed_chunks: completed,
            current_chunk,
            total_photos: self.total_photos,
            processed_photos: processed_photos.min(self.total_photos),
            fraction: progress_fraction(completed, self.total_chunks),
            estimated_seconds_remaining: estimate_remaining_secs(
                completed,
                self.total_chunks,
                elapsed_secs,
            ),
            elapsed_seconds: elapsed_secs,
            status: BatchStatus::Running,
            timestamp: Utc::now(),
        }
    }

    /// Terminal snapshot: fraction 1.0 and no time remaining
    ///
    /// `completed_chunks` is kept as-is so a cancelled run reports what it
    /// actually finished.
    pub fn finished(
        &self,
        status: BatchStatus,
        completed_chunks: usize,
        processed_photos: usize,
    ) -> BatchProgress {
        BatchProgress {
            total_chunks: self.total_chunks,
            completed_chunks: completed_chunks.min(self.total_chunks),
            current_chunk: self.total_chunks.saturating_sub(1),
            total_photos: self.total_photos,
            processed_photos: processed_photos.min(self.total_photos),
            fraction: 1.0,
            estimated_seconds_remaining: Some(0.0),
            elapsed_seconds: self.elapsed_secs(),
            status,
            timestamp: Utc::now(),
        }
    }
}
