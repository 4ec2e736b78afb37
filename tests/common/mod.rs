//! Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use facematch_batch::domain::{
    BatchProgress, ComparisonError, FaceMatch, ImageBytes, MaterializeError, Photo, RawComparison,
};
use facematch_batch::infrastructure::{ComparisonClient, PhotoMaterializer, ProgressSink};

pub fn targets(n: usize) -> Vec<Photo> {
    (1..=n)
        .map(|i| Photo::remote(format!("p{i}"), format!("https://cdn.example.com/p{i}.jpg")))
        .collect()
}

pub fn source() -> Photo {
    Photo::remote("source", "https://cdn.example.com/source.jpg")
}

/// Loads every photo whose id is not listed as broken; bytes are the id
#[derive(Default)]
pub struct FakeMaterializer {
    broken: HashSet<String>,
}

impl FakeMaterializer {
    pub fn with_broken(ids: &[&str]) -> Self {
        Self { broken: ids.iter().map(ToString::to_string).collect() }
    }
}

#[async_trait]
impl PhotoMaterializer for FakeMaterializer {
    async fn materialize(&self, photo: &Photo) -> Result<ImageBytes, MaterializeError> {
        if self.broken.contains(&photo.media_item_id) {
            let url = format!("https://cdn.example.com/{}", photo.media_item_id);
            Err(MaterializeError::Http { status: 404, url })
        } else {
            Ok(ImageBytes::jpeg(photo.media_item_id.as_bytes().to_vec()))
        }
    }
}

#[derive(Clone, Copy)]
pub enum Behavior {
    /// One match per target, tagged with the target id
    MatchAll,
    /// Like `MatchAll` but the last `n` entries are missing
    DropLast(usize),
    AlwaysFail,
}

/// Comparison client that records every call's target ids
pub struct FakeComparisonClient {
    behavior: Behavior,
    calls: AtomicU32,
    batches: Mutex<Vec<Vec<String>>>,
}

impl FakeComparisonClient {
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior, calls: AtomicU32::new(0), batches: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComparisonClient for FakeComparisonClient {
    async fn compare(
        &self,
        _source: &ImageBytes,
        targets: &[ImageBytes],
    ) -> Result<Vec<RawComparison>, ComparisonError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> =
            targets.iter().map(|t| String::from_utf8_lossy(&t.data).into_owned()).collect();
        self.batches.lock().unwrap().push(ids.clone());

        let entries = |ids: &[String]| -> Vec<RawComparison> {
            ids.iter()
                .map(|id| RawComparison {
                    face_matches: vec![FaceMatch(json!({ "similarity": 98.2, "target": id }))],
                    source_face_count: 1,
                    target_face_count: 2,
                    ..RawComparison::default()
                })
                .collect()
        };

        match self.behavior {
            Behavior::MatchAll => Ok(entries(&ids)),
            Behavior::DropLast(n) => Ok(entries(&ids[..ids.len().saturating_sub(n)])),
            Behavior::AlwaysFail => {
                Err(ComparisonError::Status { status: 500, body: "internal error".to_string() })
            }
        }
    }
}

/// Sink remembering every progress snapshot
#[derive(Default)]
pub struct ProgressLog {
    events: Mutex<Vec<BatchProgress>>,
}

impl ProgressSink for ProgressLog {
    fn emit(&self, progress: BatchProgress) {
        self.events.lock().unwrap().push(progress);
    }
}

impl ProgressLog {
    pub fn events(&self) -> Vec<BatchProgress> {
        self.events.lock().unwrap().clone()
    }
}
