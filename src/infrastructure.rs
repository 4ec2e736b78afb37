//! Infrastructure layer: external service adapters, configuration and logging
//!
//! Adapters implement the boundaries the batch pipeline depends on
//! (comparison API, photo loading, progress delivery).

pub mod comparison_client;
pub mod config;
pub mod logging;
pub mod materializer;
pub mod photo_export;
pub mod progress_sink;

// Re-export commonly used items
pub use comparison_client::{ComparisonClient, HttpComparisonClient};
pub use config::{AppConfig, ConfigError};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use materializer::{
    CompositeMaterializer, HttpPhotoMaterializer, InMemoryPhotoCache, LocalFileMaterializer,
    PhotoMaterializer,
};
pub use photo_export::{ExportError, ExportReport, PhotoExporter};
pub use progress_sink::{LoggingProgressSink, NoopProgressSink, ProgressSink, WatchProgressSink};
