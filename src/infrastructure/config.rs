//! Configuration infrastructure
//!
//! 설정은 다음 순서로 병합됩니다:
//! 1. `defaults` 모듈의 상수 (serde default)
//! 2. 설정 파일 (선택, TOML/JSON/YAML)
//! 3. `FACEMATCH_` 접두사 환경 변수 (`__` 로 섹션 구분)
//!    예: `FACEMATCH_BATCH__MAX_CHUNK_SIZE=20`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::batch::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub batch: BatchConfig,
    pub comparison_api: ComparisonApiConfig,
    pub materializer: MaterializerConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Chunking, retry and pacing of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum photos per comparison call
    pub max_chunk_size: usize,

    /// Retries after the first failed call (총 시도 횟수 = retry_attempts + 1)
    pub retry_attempts: u32,

    /// Fixed delay between retries in milliseconds
    pub retry_delay_ms: u64,

    /// Pause between two chunks in milliseconds
    pub inter_chunk_pause_ms: u64,

    /// Chunks in flight at once (1 = strictly sequential)
    pub max_concurrent_chunks: usize,

    /// Concurrent photo loads inside one chunk
    pub materialize_concurrency: usize,

    /// Upper bound for one comparison attempt, enforced by the executor
    pub call_timeout_seconds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: defaults::MAX_CHUNK_SIZE,
            retry_attempts: defaults::RETRY_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            inter_chunk_pause_ms: defaults::INTER_CHUNK_PAUSE_MS,
            max_concurrent_chunks: defaults::MAX_CONCURRENT_CHUNKS,
            materialize_concurrency: defaults::MATERIALIZE_CONCURRENCY,
            call_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl BatchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn inter_chunk_pause(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_pause_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_attempts, self.retry_delay())
    }
}

/// External face-comparison service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonApiConfig {
    pub base_url: String,
    pub endpoint_path: String,
    /// Sent as `Authorization: Bearer <api_key>` when set
    pub api_key: Option<String>,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

impl Default for ComparisonApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::COMPARISON_BASE_URL.to_string(),
            endpoint_path: defaults::COMPARISON_ENDPOINT_PATH.to_string(),
            api_key: None,
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
        }
    }
}

impl ComparisonApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// `base_url` and `endpoint_path` joined with exactly one slash
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.endpoint_path.trim_start_matches('/');
        if path.is_empty() { base.to_string() } else { format!("{base}/{path}") }
    }
}

/// Photo loading adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializerConfig {
    /// Root directory for local library assets; local photos are unsupported when unset
    pub library_root: Option<PathBuf>,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub user_agent: String,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            library_root: None,
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl MaterializerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Saving matched photos to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub max_concurrent_transfers: usize,
    /// Target directory; the binary skips export when unset
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { max_concurrent_transfers: defaults::MAX_CONCURRENT_TRANSFERS, output_dir: None }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// File name prefix; files roll daily as `<prefix>.YYYY-MM-DD`
    pub file_prefix: String,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_prefix: "facematch-batch.log".to_string(),
            module_filters: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load from an optional file plus `FACEMATCH_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("📁 Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make a run loop, stall or fail on every call
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Validation { message: message.to_string() });

        if self.batch.max_chunk_size == 0 {
            return invalid("batch.max_chunk_size must be greater than 0");
        }
        if self.batch.max_concurrent_chunks == 0 {
            return invalid("batch.max_concurrent_chunks must be greater than 0");
        }
        if self.batch.materialize_concurrency == 0 {
            return invalid("batch.materialize_concurrency must be greater than 0");
        }
        if self.batch.call_timeout_seconds == 0 {
            return invalid("batch.call_timeout_seconds must be greater than 0");
        }
        if self.export.max_concurrent_transfers == 0 {
            return invalid("export.max_concurrent_transfers must be greater than 0");
        }
        if self.comparison_api.timeout_seconds == 0 || self.materializer.timeout_seconds == 0 {
            return invalid("timeout_seconds must be greater than 0");
        }
        if self.comparison_api.max_requests_per_second == 0
            || self.materializer.max_requests_per_second == 0
        {
            return invalid("max_requests_per_second must be greater than 0");
        }
        let base_url = &self.comparison_api.base_url;
        url::Url::parse(base_url).map_err(|e| ConfigError::Validation {
            message: format!("comparison_api.base_url '{base_url}' is not a valid URL: {e}"),
        })?;
        Ok(())
    }
}

/// Default configuration values
pub mod defaults {
    /// Maximum photos per comparison call (server limit)
    pub const MAX_CHUNK_SIZE: usize = 10;

    /// Default retry attempts for failed comparison calls
    pub const RETRY_ATTEMPTS: u32 = 2;

    /// Default retry delay in milliseconds
    pub const RETRY_DELAY_MS: u64 = 2000;

    /// Default pause between chunks in milliseconds
    pub const INTER_CHUNK_PAUSE_MS: u64 = 500;

    /// Chunks run one at a time by default
    pub const MAX_CONCURRENT_CHUNKS: usize = 1;

    /// Concurrent photo loads inside one chunk
    pub const MATERIALIZE_CONCURRENCY: usize = 3;

    /// Concurrent file writes during export
    pub const MAX_CONCURRENT_TRANSFERS: usize = 3;

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Client-side rate limit for outgoing HTTP requests
    pub const MAX_REQUESTS_PER_SECOND: u32 = 5;

    pub const COMPARISON_BASE_URL: &str = "http://localhost:8080";
    pub const COMPARISON_ENDPOINT_PATH: &str = "/v1/faces/compare";
    pub const USER_AGENT: &str = concat!("facematch-batch/", env!("CARGO_PKG_VERSION"));

    /// Environment variable prefix
    pub const ENV_PREFIX: &str = "FACEMATCH";
}
