//! Logging system configuration and initialization
//!
//! - Console output with compact formatting
//! - Optional daily-rolling log file (non-blocking writer)
//! - Optional structured JSON output
//! - `RUST_LOG` overrides the configured level

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Chatty dependencies kept quiet unless tracing everything
const NOISY_CRATE_DIRECTIVES: [&str; 5] =
    ["reqwest=info", "hyper=warn", "hyper_util=warn", "h2=warn", "tokio=info"];

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Log directory: configured value, else `logs/` next to the executable
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Filter built from the configuration, used when `RUST_LOG` is not set
///
/// HTTP client internals are damped unless the level is `trace`.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in NOISY_CRATE_DIRECTIVES {
            filter = filter.add_directive(directive.parse()?);
        }
        filter = filter.add_directive(format!("facematch_batch={}", config.level).parse()?);
    }

    for (module, level) in &config.module_filters {
        filter = filter.add_directive(
            format!("{module}={level}")
                .parse()
                .map_err(|e| anyhow!("Invalid module filter {}={}: {}", module, level, e))?,
        );
    }

    Ok(filter)
}

/// Initialize logging with custom configuration
///
/// ```bash
/// # 상세 HTTP 로그 확인
/// RUST_LOG="debug,reqwest=debug,hyper=debug" facematch-batch config.toml run.json
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(config)?,
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.file_output {
        let log_dir = get_log_directory(config);
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let file_appender = rolling::daily(&log_dir, &config.file_prefix);
        let (file_writer, file_guard) = non_blocking(file_appender);

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let file_layer = fmt::Layer::new()
            .with_writer(file_writer)
            .with_timer(UtcTimeFormatter)
            .with_ansi(false);
        if config.json_format {
            layers.push(
                file_layer
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed(),
            );
        } else {
            layers.push(file_layer.with_target(false).boxed());
        }
    }

    if config.console_output || !config.file_output {
        let console_layer = fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(UtcTimeFormatter)
            .with_target(false);
        if config.json_format && !config.file_output {
            layers.push(console_layer.json().boxed());
        } else {
            layers.push(console_layer.boxed());
        }
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!(
        level = %config.level,
        file_output = config.file_output,
        "📝 Logging initialized"
    );
    Ok(())
}
