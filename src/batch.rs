//! Batch pipeline
//!
//! - partitioner: 대상 사진을 서버 안전 크기의 chunk 로 분할
//! - retry: 재시도 정책과 sleeper 추상화
//! - worker_pool: semaphore 기반 동시 실행 제한
//! - executor: chunk 하나를 ChunkResult 로 변환
//! - estimator: 진행률 및 남은 시간 추정
//! - orchestrator: 전체 실행, 취소, 결과 집계

pub mod estimator;
pub mod executor;
pub mod orchestrator;
pub mod partitioner;
pub mod retry;
pub mod worker_pool;

pub use estimator::{ProgressEstimator, estimate_remaining_secs, progress_fraction};
pub use executor::{ChunkExecutor, ExecutorSettings};
pub use orchestrator::{BatchOrchestrator, OrchestratorSettings};
pub use partitioner::{chunk_count, partition};
pub use retry::{
    RecordingSleeper, RetryDelay, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper,
    retry_with_policy, retry_with_policy_when,
};
pub use worker_pool::BoundedWorkerPool;
