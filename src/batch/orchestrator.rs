//! Batch orchestrator
//!
//! End-to-end run: materialize the source once, partition the targets, drive
//! every chunk through the [`ChunkExecutor`], report progress and aggregate
//! one outcome per target in target order.
//!
//! Cancellation is observed between chunks only. A chunk that has started is
//! always finished.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::batch::estimator::ProgressEstimator;
use crate::batch::executor::{ChunkExecutor, ExecutorSettings};
use crate::batch::partitioner::partition;
use crate::batch::retry::{Sleeper, TokioSleeper};
use crate::batch::worker_pool::BoundedWorkerPool;
use crate::domain::comparison::reasons;
use crate::domain::{
    BatchReport, BatchStatus, BatchSummary, Chunk, ChunkResult, ComparisonOutcome, ImageBytes,
    Photo,
};
use crate::infrastructure::comparison_client::ComparisonClient;
use crate::infrastructure::config::{BatchConfig, defaults};
use crate::infrastructure::materializer::PhotoMaterializer;
use crate::infrastructure::progress_sink::ProgressSink;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub max_chunk_size: usize,
    pub inter_chunk_pause: Duration,
    /// 1 = strictly sequential
    pub max_concurrent_chunks: usize,
    pub executor: ExecutorSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: defaults::MAX_CHUNK_SIZE,
            inter_chunk_pause: Duration::from_millis(defaults::INTER_CHUNK_PAUSE_MS),
            max_concurrent_chunks: defaults::MAX_CONCURRENT_CHUNKS,
            executor: ExecutorSettings::default(),
        }
    }
}

impl From<&BatchConfig> for OrchestratorSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            inter_chunk_pause: config.inter_chunk_pause(),
            max_concurrent_chunks: config.max_concurrent_chunks,
            executor: ExecutorSettings::from(config),
        }
    }
}

/// Completed chunks / processed photos, updated and emitted under one lock
#[derive(Debug, Default)]
struct RunCounters {
    completed_chunks: usize,
    processed_photos: usize,
}

pub struct BatchOrchestrator {
    materializer: Arc<dyn PhotoMaterializer>,
    executor: ChunkExecutor,
    sleeper: Arc<dyn Sleeper>,
    settings: OrchestratorSettings,
}

impl BatchOrchestrator {
    pub fn new(
        client: Arc<dyn ComparisonClient>,
        materializer: Arc<dyn PhotoMaterializer>,
        settings: OrchestratorSettings,
    ) -> Self {
        let executor =
            ChunkExecutor::new(client, Arc::clone(&materializer), settings.executor.clone());
        Self { materializer, executor, sleeper: Arc::new(TokioSleeper), settings }
    }

    /// Sleeper for retry delays and inter-chunk pauses
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.executor = self.executor.with_sleeper(Arc::clone(&sleeper));
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Compare `source` against every target
    ///
    /// Never fails: photo and call failures end up in the outcomes.
    pub async fn run(
        &self,
        source: &Photo,
        targets: &[Photo],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch_run", %run_id);
        self.run_inner(run_id, source, targets, sink, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        source: &Photo,
        targets: &[Photo],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let started = Instant::now();
        let chunks = partition(targets, self.settings.max_chunk_size);
        let estimator = ProgressEstimator::start(chunks.len(), targets.len());

        info!(
            source = %source.media_item_id,
            targets = targets.len(),
            chunks = chunks.len(),
            max_chunk_size = self.settings.max_chunk_size,
            "🚀 Batch comparison started"
        );

        if chunks.is_empty() {
            sink.emit(estimator.finished(BatchStatus::Completed, 0, 0));
            return Self::report(run_id, Vec::new(), Vec::new(), false, false, started);
        }

        let source_image = match self.materializer.materialize(source).await {
            Ok(image) => image,
            Err(err) => {
                error!(
                    source = %source.media_item_id,
                    error = %err,
                    "❌ Source photo could not be loaded, no chunk attempted"
                );
                let reason = reasons::FAILED_TO_LOAD_SOURCE;
                let outcomes = targets
                    .iter()
                    .map(|p| ComparisonOutcome::rejected(&p.media_item_id, reason))
                    .collect();
                sink.emit(estimator.finished(BatchStatus::SourceFailed, 0, 0));
                return Self::report(run_id, outcomes, Vec::new(), false, true, started);
            }
        };

        let slots = if self.settings.max_concurrent_chunks > 1 {
            self.run_parallel(&chunks, &source_image, &estimator, sink, cancel).await
        } else {
            self.run_sequential(&chunks, &source_image, &estimator, sink, cancel).await
        };

        let mut outcomes = Vec::with_capacity(targets.len());
        let mut chunk_results = Vec::with_capacity(chunks.len());
        let mut completed_chunks = 0;
        let mut processed_photos = 0;
        let mut cancelled = false;

        for (chunk, slot) in chunks.iter().zip(slots) {
            match slot {
                Some(result) => {
                    completed_chunks += 1;
                    processed_photos += chunk.len();
                    outcomes.extend(result.outcomes.iter().cloned());
                    chunk_results.push(result);
                }
                None => {
                    cancelled = true;
                    outcomes.extend(chunk.photos.iter().map(|p| {
                        ComparisonOutcome::rejected(&p.media_item_id, reasons::BATCH_CANCELLED)
                    }));
                }
            }
        }

        let status = if cancelled { BatchStatus::Cancelled } else { BatchStatus::Completed };
        sink.emit(estimator.finished(status, completed_chunks, processed_photos));

        let report = Self::report(run_id, outcomes, chunk_results, cancelled, false, started);
        if cancelled {
            warn!(
                completed_chunks,
                total_chunks = chunks.len(),
                "🛑 Batch cancelled between chunks"
            );
        }
        info!(
            matched = report.summary.matched,
            unmatched = report.summary.unmatched,
            rejected = report.summary.rejected,
            errored = report.summary.errored,
            elapsed = ?report.elapsed,
            "✅ Batch comparison finished"
        );
        report
    }

    /// One chunk at a time, pausing between chunks
    async fn run_sequential(
        &self,
        chunks: &[Chunk],
        source: &ImageBytes,
        estimator: &ProgressEstimator,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<Option<ChunkResult>> {
        let mut slots: Vec<Option<ChunkResult>> = Vec::with_capacity(chunks.len());
        let mut processed_photos = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            sink.emit(estimator.snapshot(i, i, processed_photos));

            let result = self.executor.execute(chunk, source).await;
            processed_photos += chunk.len();
            slots.push(Some(result));

            sink.emit(estimator.snapshot(i + 1, i, processed_photos));

            if i + 1 < chunks.len() {
                self.pause(cancel).await;
            }
        }

        slots.resize_with(chunks.len(), || None);
        slots
    }

    /// Up to `max_concurrent_chunks` chunks in flight, results placed by chunk index
    async fn run_parallel(
        &self,
        chunks: &[Chunk],
        source: &ImageBytes,
        estimator: &ProgressEstimator,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<Option<ChunkResult>> {
        let pool = BoundedWorkerPool::new(self.settings.max_concurrent_chunks);
        let counters = Mutex::new(RunCounters::default());
        let total_chunks = chunks.len();

        pool.run(chunks.iter().collect(), |chunk| {
            let counters = &counters;
            async move {
                // 슬롯을 얻은 뒤에 취소 여부 확인
                if cancel.is_cancelled() {
                    return None;
                }
                if let Ok(c) = counters.lock() {
                    let progress =
                        estimator.snapshot(c.completed_chunks, chunk.index, c.processed_photos);
                    sink.emit(progress);
                }

                let result = self.executor.execute(chunk, source).await;

                if let Ok(mut c) = counters.lock() {
                    c.completed_chunks += 1;
                    c.processed_photos += chunk.len();
                    let progress =
                        estimator.snapshot(c.completed_chunks, chunk.index, c.processed_photos);
                    sink.emit(progress);
                }

                if chunk.index + 1 < total_chunks {
                    self.pause(cancel).await;
                }
                Some(result)
            }
        })
        .await
    }

    /// Inter-chunk pause, cut short by cancellation
    async fn pause(&self, cancel: &CancellationToken) {
        let pause = self.settings.inter_chunk_pause;
        if pause.is_zero() {
            return;
        }
        tokio::select! {
            () = self.sleeper.sleep(pause) => {}
            () = cancel.cancelled() => {}
        }
    }

    fn report(
        run_id: Uuid,
        outcomes: Vec<ComparisonOutcome>,
        chunk_results: Vec<ChunkResult>,
        cancelled: bool,
        source_failed: bool,
        started: Instant,
    ) -> BatchReport {
        BatchReport {
            run_id,
            summary: BatchSummary::from_outcomes(&outcomes),
            outcomes,
            chunk_results,
            cancelled,
            source_failed,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::retry::RecordingSleeper;
    use crate::domain::{BatchProgress, ComparisonError, FaceMatch, MaterializeError, RawComparison};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoMaterializer;

    #[async_trait]
    impl PhotoMaterializer for EchoMaterializer {
        async fn materialize(&self, photo: &Photo) -> Result<ImageBytes, MaterializeError> {
            if photo.media_item_id.starts_with("broken") {
                Err(MaterializeError::NotFound(photo.media_item_id.clone()))
            } else {
                Ok(ImageBytes::jpeg(photo.media_item_id.as_bytes().to_vec()))
            }
        }
    }

    /// Matches every target; cancels `cancel_after` once that many calls were made
    struct MatchAll {
        calls: AtomicU32,
        cancel_after: Option<(u32, CancellationToken)>,
    }

    impl MatchAll {
        fn new(cancel_after: Option<(u32, CancellationToken)>) -> Arc<Self> {
            Arc::new(Self { calls: AtomicU32::new(0), cancel_after })
        }
    }

    #[async_trait]
    impl ComparisonClient for MatchAll {
        async fn compare(
            &self,
            _source: &ImageBytes,
            targets: &[ImageBytes],
        ) -> Result<Vec<RawComparison>, ComparisonError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, token)) = &self.cancel_after {
                if call >= *after {
                    token.cancel();
                }
            }
            Ok(targets
                .iter()
                .map(|_| RawComparison {
                    face_matches: vec![FaceMatch(json!({ "similarity": 99.1 }))],
                    ..RawComparison::default()
                })
                .collect())
        }
    }

    fn photos(n: usize) -> Vec<Photo> {
        (0..n).map(|i| Photo::remote(format!("p{i}"), format!("https://cdn/p{i}.jpg"))).collect()
    }

    fn src() -> Photo {
        Photo::remote("src", "https://cdn/src.jpg")
    }

    fn orchestrator(
        client: Arc<MatchAll>,
        settings: OrchestratorSettings,
    ) -> (BatchOrchestrator, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let orchestrator = BatchOrchestrator::new(client, Arc::new(EchoMaterializer), settings)
            .with_sleeper(Arc::clone(&sleeper) as Arc<dyn Sleeper>);
        (orchestrator, sleeper)
    }

    fn recorded(seen: &Mutex<Vec<BatchProgress>>) -> Vec<BatchProgress> {
        seen.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn sequential_run_pauses_between_chunks_only() {
        let client = MatchAll::new(None);
        let (orchestrator, sleeper) =
            orchestrator(Arc::clone(&client), OrchestratorSettings::default());
        let seen = Mutex::new(Vec::new());
        let sink = |p: BatchProgress| seen.lock().unwrap().push(p);

        let report = orchestrator.run(&src(), &photos(23), &sink, &CancellationToken::new()).await;

        assert_eq!(report.outcomes.len(), 23);
        assert_eq!(report.summary.matched, 23);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(500); 2]);

        let progress = recorded(&seen);
        // before + after per chunk, plus the final snapshot
        assert_eq!(progress.len(), 7);
        assert!(progress.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        assert_eq!(progress.last().unwrap().status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn empty_target_list_emits_only_final_progress() {
        let client = MatchAll::new(None);
        let (orchestrator, _) = orchestrator(Arc::clone(&client), OrchestratorSettings::default());
        let seen = Mutex::new(Vec::new());
        let sink = |p: BatchProgress| seen.lock().unwrap().push(p);

        let report = orchestrator.run(&src(), &[], &sink, &CancellationToken::new()).await;

        assert!(report.outcomes.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        let progress = recorded(&seen);
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].fraction, 1.0);
        assert_eq!(progress[0].estimated_seconds_remaining, Some(0.0));
    }

    #[tokio::test]
    async fn broken_source_short_circuits() {
        let client = MatchAll::new(None);
        let (orchestrator, _) = orchestrator(Arc::clone(&client), OrchestratorSettings::default());
        let seen = Mutex::new(Vec::new());
        let sink = |p: BatchProgress| seen.lock().unwrap().push(p);

        let broken = Photo::remote("broken-src", "https://cdn/x.jpg");
        let report = orchestrator.run(&broken, &photos(12), &sink, &CancellationToken::new()).await;

        assert!(report.source_failed);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert!(report.chunk_results.is_empty());
        assert!(
            report
                .outcomes
                .iter()
                .all(|o| o.rejected && o.error.as_deref() == Some(reasons::FAILED_TO_LOAD_SOURCE))
        );
        let progress = recorded(&seen);
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].status, BatchStatus::SourceFailed);
    }

    #[tokio::test]
    async fn cancellation_rejects_chunks_not_started() {
        let token = CancellationToken::new();
        let client = MatchAll::new(Some((1, token.clone())));
        let (orchestrator, _) = orchestrator(Arc::clone(&client), OrchestratorSettings::default());
        let seen = Mutex::new(Vec::new());
        let sink = |p: BatchProgress| seen.lock().unwrap().push(p);

        let report = orchestrator.run(&src(), &photos(25), &sink, &token).await;

        assert!(report.cancelled);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.outcomes.len(), 25);
        assert!(report.outcomes[..10].iter().all(ComparisonOutcome::is_match));
        assert!(report.outcomes[10..]
            .iter()
            .all(|o| o.rejected && o.error.as_deref() == Some(reasons::BATCH_CANCELLED)));

        let last = recorded(&seen).pop().unwrap();
        assert_eq!(last.status, BatchStatus::Cancelled);
        assert_eq!(last.completed_chunks, 1);
    }

    #[tokio::test]
    async fn parallel_chunks_keep_order_and_monotonic_progress() {
        let client = MatchAll::new(None);
        let settings = OrchestratorSettings {
            max_chunk_size: 3,
            max_concurrent_chunks: 3,
            ..OrchestratorSettings::default()
        };
        let (orchestrator, _) = orchestrator(Arc::clone(&client), settings);
        let seen = Mutex::new(Vec::new());
        let sink = |p: BatchProgress| seen.lock().unwrap().push(p);
        let targets = photos(20);

        let report = orchestrator.run(&src(), &targets, &sink, &CancellationToken::new()).await;

        let ids: Vec<_> = report.outcomes.iter().map(|o| o.media_item_id.clone()).collect();
        let expected: Vec<_> = targets.iter().map(|p| p.media_item_id.clone()).collect();
        assert_eq!(ids, expected);
        assert_eq!(client.calls.load(Ordering::SeqCst), 7);

        let progress = recorded(&seen);
        assert!(progress.windows(2).all(|w| w[0].completed_chunks <= w[1].completed_chunks));
        assert_eq!(progress.last().unwrap().fraction, 1.0);
    }
}
