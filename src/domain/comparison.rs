//! Comparison payloads, per-photo outcomes and chunk/batch results
//!
//! The distinction between a *rejected* outcome (photo never reached the
//! comparison API) and an *API error* outcome (API was called and the call or
//! the entry failed) is kept all the way to [`BatchSummary`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::photo::Photo;

/// Error strings attached to outcomes that never reached the API or lost their entry
pub mod reasons {
    pub const FAILED_TO_LOAD_IMAGE: &str = "failed to load image";
    pub const FAILED_TO_LOAD_SOURCE: &str = "failed to load source image";
    pub const BATCH_CANCELLED: &str = "batch cancelled";
    pub const MISSING_RESPONSE_ENTRY: &str = "comparison response missing entry";
}

/// A matched face as returned by the comparison API (opaque to the pipeline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceMatch(pub serde_json::Value);

impl FaceMatch {
    /// `similarity` field of the payload, when the API supplies one
    pub fn similarity(&self) -> Option<f64> {
        self.0.get("similarity").and_then(serde_json::Value::as_f64)
    }
}

/// A face found in the target that did not match the source (opaque)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnmatchedFace(pub serde_json::Value);

/// One per-target entry of a comparison API response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawComparison {
    pub face_matches: Vec<FaceMatch>,
    pub unmatched_faces: Vec<UnmatchedFace>,
    pub source_face_count: u32,
    pub target_face_count: u32,
    pub error: Option<String>,
}

/// Final result for one target photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub media_item_id: String,
    pub face_matches: Vec<FaceMatch>,
    pub unmatched_faces: Vec<UnmatchedFace>,
    pub source_face_count: u32,
    pub target_face_count: u32,
    pub error: Option<String>,
    /// `true` when the photo was never sent to the comparison API
    pub rejected: bool,
}

impl ComparisonOutcome {
    /// Outcome for a photo that never reached the API
    pub fn rejected(media_item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            media_item_id: media_item_id.into(),
            face_matches: Vec::new(),
            unmatched_faces: Vec::new(),
            source_face_count: 0,
            target_face_count: 0,
            error: Some(reason.into()),
            rejected: true,
        }
    }

    /// Outcome for a photo that was sent but whose call or entry failed
    pub fn api_error(media_item_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            rejected: false,
            ..Self::rejected(media_item_id, error)
        }
    }

    /// Outcome built from the API entry returned for this photo
    pub fn from_raw(media_item_id: impl Into<String>, raw: RawComparison) -> Self {
        Self {
            media_item_id: media_item_id.into(),
            face_matches: raw.face_matches,
            unmatched_faces: raw.unmatched_faces,
            source_face_count: raw.source_face_count,
            target_face_count: raw.target_face_count,
            error: raw.error,
            rejected: false,
        }
    }

    /// The source face was found in this photo
    pub fn is_match(&self) -> bool {
        !self.rejected && self.error.is_none() && !self.face_matches.is_empty()
    }

    /// The API was reached but reported (or caused) an error for this photo
    pub fn is_api_error(&self) -> bool {
        !self.rejected && self.error.is_some()
    }

    /// Highest similarity among the face matches
    pub fn best_similarity(&self) -> Option<f64> {
        self.face_matches
            .iter()
            .filter_map(FaceMatch::similarity)
            .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
    }
}

/// An ordered, non-empty slice of the target list processed as one API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub photos: Vec<Photo>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }
}

/// Number of response entries differed from the number of targets sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationMismatch {
    pub expected: usize,
    pub received: usize,
}

impl ReconciliationMismatch {
    /// Photos that were sent but have no entry
    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.received)
    }
}

/// Result of driving one chunk through the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    /// One outcome per input photo, in chunk order
    pub outcomes: Vec<ComparisonOutcome>,
    /// `true` only when the comparison call ultimately succeeded
    pub success: bool,
    pub error: Option<String>,
    /// Number of comparison client invocations made for this chunk
    pub attempts: u32,
    pub mismatch: Option<ReconciliationMismatch>,
    pub elapsed: Duration,
}

/// Overall state of a finished batch, as presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcomeState {
    Empty,
    AllSucceeded,
    SomeFailed,
    AllFailed,
}

/// Counts over a list of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Compared successfully, at least one face match
    pub matched: usize,
    /// Compared successfully, no face match
    pub unmatched: usize,
    /// Never sent to the API
    pub rejected: usize,
    /// Sent to the API, call or entry failed
    pub errored: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ComparisonOutcome]) -> Self {
        outcomes.iter().fold(
            Self { total: outcomes.len(), ..Self::default() },
            |mut summary, outcome| {
                if outcome.rejected {
                    summary.rejected += 1;
                } else if outcome.error.is_some() {
                    summary.errored += 1;
                } else if outcome.face_matches.is_empty() {
                    summary.unmatched += 1;
                } else {
                    summary.matched += 1;
                }
                summary
            },
        )
    }

    pub fn succeeded(&self) -> usize {
        self.matched + self.unmatched
    }

    pub fn failed(&self) -> usize {
        self.rejected + self.errored
    }

    pub fn state(&self) -> BatchOutcomeState {
        if self.total == 0 {
            BatchOutcomeState::Empty
        } else if self.failed() == 0 {
            BatchOutcomeState::AllSucceeded
        } else if self.succeeded() == 0 {
            BatchOutcomeState::AllFailed
        } else {
            BatchOutcomeState::SomeFailed
        }
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Same length and order as the target list
    pub outcomes: Vec<ComparisonOutcome>,
    pub chunk_results: Vec<ChunkResult>,
    pub summary: BatchSummary,
    pub cancelled: bool,
    pub source_failed: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Outcomes whose photo contains the source face
    pub fn matches(&self) -> impl Iterator<Item = &ComparisonOutcome> {
        self.outcomes.iter().filter(|o| o.is_match())
    }

    /// Chunks whose API response length disagreed with the request
    pub fn mismatched_chunks(&self) -> impl Iterator<Item = &ChunkResult> {
        self.chunk_results.iter().filter(|c| c.mismatch.is_some())
    }
}
