//! Chunk executor
//!
//! One chunk in, one [`ChunkResult`] out, with exactly one outcome per input
//! photo in input order.
//!
//! 1. 사진 로드 (bounded pool, 실패 시 rejected, 재시도 없음)
//! 2. 로드된 사진이 없으면 API 호출 없이 종료
//! 3. 비교 API 호출 (시도마다 timeout, 실패 시 RetryPolicy 에 따라 재시도)
//! 4. 응답을 위치 기준으로 사진에 매핑하고 rejected 결과와 병합

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::batch::retry::{RetryPolicy, Sleeper, TokioSleeper, retry_with_policy_when};
use crate::batch::worker_pool::BoundedWorkerPool;
use crate::domain::comparison::reasons;
use crate::domain::{
    Chunk, ChunkResult, ComparisonError, ComparisonOutcome, ImageBytes, RawComparison,
    ReconciliationMismatch,
};
use crate::infrastructure::comparison_client::ComparisonClient;
use crate::infrastructure::config::{BatchConfig, defaults};
use crate::infrastructure::materializer::PhotoMaterializer;

/// Chunk-level error when no photo of the chunk could be loaded
pub const NO_PHOTOS_LOADED: &str = "no photo in chunk could be loaded";

/// Knobs of the chunk executor
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub retry_policy: RetryPolicy,
    pub call_timeout: Duration,
    pub materialize_concurrency: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            call_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECONDS),
            materialize_concurrency: defaults::MATERIALIZE_CONCURRENCY,
        }
    }
}

impl From<&BatchConfig> for ExecutorSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            retry_policy: config.retry_policy(),
            call_timeout: config.call_timeout(),
            materialize_concurrency: config.materialize_concurrency,
        }
    }
}

pub struct ChunkExecutor {
    client: Arc<dyn ComparisonClient>,
    materializer: Arc<dyn PhotoMaterializer>,
    sleeper: Arc<dyn Sleeper>,
    pool: BoundedWorkerPool,
    settings: ExecutorSettings,
}

impl ChunkExecutor {
    pub fn new(
        client: Arc<dyn ComparisonClient>,
        materializer: Arc<dyn PhotoMaterializer>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            client,
            materializer,
            sleeper: Arc::new(TokioSleeper),
            pool: BoundedWorkerPool::new(settings.materialize_concurrency),
            settings,
        }
    }

    /// Replace the sleeper used between retries
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run one chunk against an already materialized source image
    pub async fn execute(&self, chunk: &Chunk, source: &ImageBytes) -> ChunkResult {
        let started = Instant::now();
        let chunk_index = chunk.index;

        let loaded = self
            .pool
            .run(chunk.photos.iter().collect(), |photo| self.materializer.materialize(photo))
            .await;

        let mut outcomes: Vec<Option<ComparisonOutcome>> =
            std::iter::repeat_with(|| None).take(chunk.len()).collect();
        let mut sent_positions = Vec::with_capacity(chunk.len());
        let mut images = Vec::with_capacity(chunk.len());

        for (position, (photo, result)) in chunk.photos.iter().zip(loaded).enumerate() {
            match result {
                Ok(image) => {
                    sent_positions.push(position);
                    images.push(image);
                }
                Err(err) => {
                    warn!(
                        chunk_index,
                        media_item_id = %photo.media_item_id,
                        error = %err,
                        "Photo could not be loaded"
                    );
                    outcomes[position] = Some(ComparisonOutcome::rejected(
                        &photo.media_item_id,
                        reasons::FAILED_TO_LOAD_IMAGE,
                    ));
                }
            }
        }

        if images.is_empty() {
            warn!(
                chunk_index,
                photos = chunk.len(),
                "❌ No photo in chunk could be loaded, skipping API call"
            );
            return ChunkResult {
                chunk_index,
                outcomes: outcomes.into_iter().flatten().collect(),
                success: false,
                error: Some(NO_PHOTOS_LOADED.to_string()),
                attempts: 0,
                mismatch: None,
                elapsed: started.elapsed(),
            };
        }

        let retried = retry_with_policy_when(
            &self.settings.retry_policy,
            self.sleeper.as_ref(),
            ComparisonError::is_retryable,
            |attempt| {
                let images = &images;
                async move {
                    debug!(chunk_index, attempt, targets = images.len(), "Calling comparison API");
                    self.compare_once(source, images).await
                }
            },
        )
        .await;

        let attempts = retried.attempts;
        let (success, error, mismatch) = match retried.result {
            Ok(entries) => {
                let mismatch = reconcile(chunk, &sent_positions, entries, &mut outcomes);
                if let Some(m) = mismatch {
                    warn!(
                        chunk_index,
                        expected = m.expected,
                        received = m.received,
                        "⚠️ Comparison response length mismatch"
                    );
                }
                (true, None, mismatch)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    chunk_index,
                    attempts,
                    error = %message,
                    "❌ Comparison failed after all attempts"
                );
                for &position in &sent_positions {
                    let photo = &chunk.photos[position];
                    outcomes[position] =
                        Some(ComparisonOutcome::api_error(&photo.media_item_id, message.clone()));
                }
                (false, Some(message), None)
            }
        };

        let elapsed = started.elapsed();
        info!(chunk_index, success, attempts, ?elapsed, "Chunk finished");

        ChunkResult {
            chunk_index,
            outcomes: outcomes.into_iter().flatten().collect(),
            success,
            error,
            attempts,
            mismatch,
            elapsed,
        }
    }

    async fn compare_once(
        &self,
        source: &ImageBytes,
        targets: &[ImageBytes],
    ) -> Result<Vec<RawComparison>, ComparisonError> {
        let timeout = self.settings.call_timeout;
        match tokio::time::timeout(timeout, self.client.compare(source, targets)).await {
            Ok(result) => result,
            Err(_) => Err(ComparisonError::Timeout(timeout)),
        }
    }
}

/// Zip response entries onto the photos that were sent, by position
///
/// Sent photos without an entry get a non-rejected error. Extra entries are
/// dropped. Returns the mismatch when the lengths differ.
fn reconcile(
    chunk: &Chunk,
    sent_positions: &[usize],
    entries: Vec<RawComparison>,
    outcomes: &mut [Option<ComparisonOutcome>],
) -> Option<ReconciliationMismatch> {
    let expected = sent_positions.len();
    let received = entries.len();
    let mut entries = entries.into_iter();

    for &position in sent_positions {
        let media_item_id = &chunk.photos[position].media_item_id;
        outcomes[position] = Some(match entries.next() {
            Some(raw) => ComparisonOutcome::from_raw(media_item_id, raw),
            None => ComparisonOutcome::api_error(media_item_id, reasons::MISSING_RESPONSE_ENTRY),
        });
    }

    (expected != received).then_some(ReconciliationMismatch { expected, received })
}
