//! Domain module - Core entities of the face-comparison pipeline
//!
//! This module contains the photo references, per-photo comparison outcomes,
//! chunk results and progress values that flow through the batch pipeline.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod comparison;
pub mod errors;
pub mod photo;
pub mod progress;

// Re-export commonly used items for convenience
pub use comparison::{
    BatchOutcomeState, BatchReport, BatchSummary, Chunk, ChunkResult, ComparisonOutcome,
    FaceMatch, RawComparison, ReconciliationMismatch, UnmatchedFace,
};
pub use errors::{ComparisonError, MaterializeError};
pub use photo::{ImageBytes, Photo, PhotoLocator, PhotoMetadata};
pub use progress::{BatchProgress, BatchStatus};
