//! facematch-batch - Batch face-comparison pipeline
//!
//! Compares one source photo against a large list of target photos through an
//! external face-recognition API: chunked calls, retry with backoff,
//! reconciliation of partial failures and progress with an ETA.

// Module declarations
pub mod batch;
pub mod domain;
pub mod infrastructure;

pub use batch::{BatchOrchestrator, OrchestratorSettings};
pub use domain::{BatchProgress, BatchReport, ComparisonOutcome, Photo};
