//! Progress values emitted on the side channel of a batch run
//!
//! Progress is never retried, stored or reconciled. Consumers only ever care
//! about the latest value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall status of a batch run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Chunks are being processed
    Running,
    /// Every chunk was processed
    Completed,
    /// Cancelled between chunks
    Cancelled,
    /// Source image could not be loaded; no chunk was attempted
    SourceFailed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::SourceFailed => write!(f, "source failed"),
        }
    }
}

/// Snapshot of a batch run at a chunk boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchProgress {
    pub total_chunks: usize,
    pub completed_chunks: usize,
    /// Zero-based index of the chunk about to run or just finished
    pub current_chunk: usize,
    pub total_photos: usize,
    pub processed_photos: usize,
    /// Progress fraction (0.0 to 1.0)
    pub fraction: f64,
    /// Estimated remaining time; absent until one chunk has completed
    pub estimated_seconds_remaining: Option<f64>,
    /// Elapsed time in seconds since the run started
    pub elapsed_seconds: f64,
    pub status: BatchStatus,
    pub timestamp: DateTime<Utc>,
}

impl BatchProgress {
    /// Progress as a percentage (0.0 to 100.0)
    pub fn percentage(&self) -> f64 {
        self.fraction * 100.0
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self {
            total_chunks: 0,
            completed_chunks: 0,
            current_chunk: 0,
            total_photos: 0,
            processed_photos: 0,
            fraction: 0.0,
            estimated_seconds_remaining: None,
            elapsed_seconds: 0.0,
            status: BatchStatus::Running,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_progress_is_running_and_empty() {
        let progress = BatchProgress::default();
        assert_eq!(progress.status, BatchStatus::Running);
        assert!(!progress.is_finished());
        assert_eq!(progress.percentage(), 0.0);
        assert!(progress.estimated_seconds_remaining.is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(BatchStatus::SourceFailed.is_terminal());
        assert!(!BatchStatus::Running.is_terminal());
        assert_eq!(BatchStatus::SourceFailed.to_string(), "source failed");
    }
}
