//! facematch-batch
//!
//! ```bash
//! facematch-batch [config.toml] run.json
//! ```
//!
//! `run.json` holds `{ "source": Photo, "targets": [Photo] }`. The report
//! summary is printed to stdout as JSON; logs go to stderr (and optionally a file).

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use facematch_batch::batch::{BatchOrchestrator, OrchestratorSettings};
use facematch_batch::domain::{BatchOutcomeState, BatchReport, BatchSummary, Photo};
use facematch_batch::infrastructure::config::AppConfig;
use facematch_batch::infrastructure::logging::init_logging_with_config;
use facematch_batch::infrastructure::{
    CompositeMaterializer, HttpComparisonClient, LoggingProgressSink, PhotoExporter,
    PhotoMaterializer,
};

const CONFIG_ENV: &str = "FACEMATCH_CONFIG";

#[derive(Debug, Deserialize)]
struct RunManifest {
    source: Photo,
    #[serde(default)]
    targets: Vec<Photo>,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: String,
    state: BatchOutcomeState,
    summary: &'a BatchSummary,
    cancelled: bool,
    source_failed: bool,
    elapsed_seconds: f64,
    mismatched_chunks: Vec<usize>,
    matches: Vec<&'a str>,
    exported: Option<usize>,
}

/// Config path: explicit argument, then `FACEMATCH_CONFIG`, then the user config dir if present
fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("facematch-batch").join("config.toml"))
        .filter(|path| path.exists())
}

async fn read_manifest(path: &Path) -> Result<RunManifest> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read run manifest {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid run manifest {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_arg, manifest_arg) = match args.as_slice() {
        [manifest] => (None, manifest.as_str()),
        [config, manifest] => (Some(config.as_str()), manifest.as_str()),
        _ => bail!("usage: facematch-batch [config.toml] run.json"),
    };

    let config_path = resolve_config_path(config_arg);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_logging_with_config(&config.logging)?;

    let manifest = read_manifest(Path::new(manifest_arg)).await?;
    info!(targets = manifest.targets.len(), "📋 Run manifest loaded");

    let client = Arc::new(HttpComparisonClient::new(&config.comparison_api)?);
    let materializer: Arc<dyn PhotoMaterializer> =
        Arc::new(CompositeMaterializer::from_config(&config.materializer)?);
    let settings = OrchestratorSettings::from(&config.batch);
    let orchestrator = BatchOrchestrator::new(client, Arc::clone(&materializer), settings);

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, stopping after the current chunk");
            ctrl_c_token.cancel();
        }
    });

    let report = orchestrator
        .run(&manifest.source, &manifest.targets, &LoggingProgressSink, &cancel)
        .await;

    let exported = match &config.export.output_dir {
        Some(dir) => {
            Some(export_matches(&report, &manifest.targets, materializer, dir, &config).await)
        }
        None => None,
    };

    let summary = RunSummary {
        run_id: report.run_id.to_string(),
        state: report.summary.state(),
        summary: &report.summary,
        cancelled: report.cancelled,
        source_failed: report.source_failed,
        elapsed_seconds: report.elapsed.as_secs_f64(),
        mismatched_chunks: report.mismatched_chunks().map(|c| c.chunk_index).collect(),
        matches: report.matches().map(|o| o.media_item_id.as_str()).collect(),
        exported,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn export_matches(
    report: &BatchReport,
    targets: &[Photo],
    materializer: Arc<dyn PhotoMaterializer>,
    dir: &Path,
    config: &AppConfig,
) -> usize {
    // outcomes 와 targets 는 같은 순서
    let matched: Vec<Photo> = report
        .outcomes
        .iter()
        .zip(targets)
        .filter(|(outcome, _)| outcome.is_match())
        .map(|(_, photo)| photo.clone())
        .collect();

    let exporter = PhotoExporter::from_config(materializer, dir, &config.export);
    let export = exporter.export(&matched).await;
    if !export.is_complete() {
        warn!(failed = export.failed.len(), "Some matched photos could not be exported");
    }
    export.saved.len()
}
