//! Batch sanity runner to verify chunking, retries and progress without a network
//!
//! Runs the orchestrator against an in-process flaky comparison client and an
//! in-memory photo cache. Knobs via environment:
//! - `SANITY_TARGETS` (default 23): number of target photos
//! - `SANITY_FAIL_RATE` (default 0.3): probability that one comparison call fails
//! - `SANITY_BROKEN_EVERY` (default 7): every n-th target is missing from the cache (0 = none)

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use facematch_batch::batch::{BatchOrchestrator, OrchestratorSettings, RetryPolicy};
use facematch_batch::domain::{
    BatchProgress, ComparisonError, FaceMatch, ImageBytes, Photo, RawComparison,
};
use facematch_batch::infrastructure::{ComparisonClient, InMemoryPhotoCache, WatchProgressSink};

/// Fails each call with probability `fail_rate`; otherwise matches every other target
struct FlakyComparisonClient {
    fail_rate: f64,
    calls: AtomicU32,
}

#[async_trait]
impl ComparisonClient for FlakyComparisonClient {
    async fn compare(
        &self,
        _source: &ImageBytes,
        targets: &[ImageBytes],
    ) -> Result<Vec<RawComparison>, ComparisonError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        if fastrand::f64() < self.fail_rate {
            let body = format!("simulated outage on call {call}");
            return Err(ComparisonError::Status { status: 503, body });
        }
        Ok(targets
            .iter()
            .enumerate()
            .map(|(i, _)| RawComparison {
                face_matches: if i % 2 == 0 {
                    vec![FaceMatch(json!({ "similarity": 90.0 + i as f64 }))]
                } else {
                    Vec::new()
                },
                source_face_count: 1,
                target_face_count: 1,
                ..RawComparison::default()
            })
            .collect())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid {} value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = facematch_batch::infrastructure::logging::init_logging() {
        eprintln!("Failed to initialize logging: {e}");
    }

    let target_count: usize = env_or("SANITY_TARGETS", 23);
    let fail_rate: f64 = env_or("SANITY_FAIL_RATE", 0.3);
    let broken_every: usize = env_or("SANITY_BROKEN_EVERY", 7);
    info!(
        "🚀 Batch sanity runner starting: targets={}, fail_rate={}, broken_every={}",
        target_count, fail_rate, broken_every
    );

    let cache = Arc::new(InMemoryPhotoCache::new());
    let source = Photo::remote("source", "memory://source");
    cache.insert("source", ImageBytes::jpeg(b"source-face".to_vec()));

    let targets: Vec<Photo> = (0..target_count)
        .map(|i| Photo::remote(format!("target-{i:03}"), format!("memory://target-{i:03}")))
        .collect();
    for (i, photo) in targets.iter().enumerate() {
        if broken_every > 0 && (i + 1) % broken_every == 0 {
            continue;
        }
        let bytes = photo.media_item_id.as_bytes().to_vec();
        cache.insert(&photo.media_item_id, ImageBytes::jpeg(bytes));
    }

    let client = Arc::new(FlakyComparisonClient { fail_rate, calls: AtomicU32::new(0) });
    let mut settings = OrchestratorSettings {
        inter_chunk_pause: Duration::from_millis(50),
        ..OrchestratorSettings::default()
    };
    settings.executor.retry_policy = RetryPolicy::fixed(2, Duration::from_millis(100));
    let orchestrator =
        BatchOrchestrator::new(Arc::clone(&client) as Arc<dyn ComparisonClient>, cache, settings);

    let (sink, mut progress_rx) = WatchProgressSink::channel();
    let watcher = tokio::spawn(async move {
        let mut last = BatchProgress::default();
        while progress_rx.changed().await.is_ok() {
            let progress = progress_rx.borrow_and_update().clone();
            if progress.completed_chunks < last.completed_chunks {
                warn!(
                    "⚠️ Progress went backwards: {} -> {}",
                    last.completed_chunks, progress.completed_chunks
                );
            }
            info!(
                "📊 {}/{} chunks ({:.0}%), eta={:?}",
                progress.completed_chunks,
                progress.total_chunks,
                progress.percentage(),
                progress.estimated_seconds_remaining
            );
            let finished = progress.is_finished();
            last = progress;
            if finished {
                break;
            }
        }
    });

    let report = orchestrator.run(&source, &targets, &sink, &CancellationToken::new()).await;
    drop(sink);
    watcher.await?;

    if report.outcomes.len() != targets.len() {
        anyhow::bail!(
            "outcome count {} does not match target count {}",
            report.outcomes.len(),
            targets.len()
        );
    }
    for result in &report.chunk_results {
        info!(
            "🧩 chunk {}: success={}, attempts={}, photos={}, elapsed={:?}",
            result.chunk_index,
            result.success,
            result.attempts,
            result.outcomes.len(),
            result.elapsed
        );
    }
    info!(
        "🏁 Sanity run finished: calls={}, state={:?}, summary={:?}",
        client.calls.load(Ordering::SeqCst),
        report.summary.state(),
        report.summary
    );
    Ok(())
}
