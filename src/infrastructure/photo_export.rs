//! Photo export
//!
//! Saves photos (usually the matches of a finished run) into a directory.
//! Transfers share one bounded pool; a failed photo never stops the others.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::batch::worker_pool::BoundedWorkerPool;
use crate::domain::{MaterializeError, Photo};
use crate::infrastructure::config::ExportConfig;
use crate::infrastructure::materializer::PhotoMaterializer;

lazy_static! {
    static ref UNSAFE_FILE_CHARS: Option<Regex> = Regex::new(r"[^A-Za-z0-9._-]+").ok();
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

/// Result of one export pass
#[derive(Debug, Default)]
pub struct ExportReport {
    /// `(media_item_id, written path)` in input order
    pub saved: Vec<(String, PathBuf)>,
    /// `(media_item_id, error)` in input order
    pub failed: Vec<(String, ExportError)>,
}

impl ExportReport {
    pub fn total(&self) -> usize {
        self.saved.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes photos to `output_dir` with at most `max_concurrent_transfers` in flight
pub struct PhotoExporter {
    materializer: Arc<dyn PhotoMaterializer>,
    output_dir: PathBuf,
    pool: BoundedWorkerPool,
}

impl PhotoExporter {
    pub fn new(
        materializer: Arc<dyn PhotoMaterializer>,
        output_dir: impl Into<PathBuf>,
        max_concurrent_transfers: usize,
    ) -> Self {
        Self {
            materializer,
            output_dir: output_dir.into(),
            pool: BoundedWorkerPool::new(max_concurrent_transfers),
        }
    }

    pub fn from_config(
        materializer: Arc<dyn PhotoMaterializer>,
        output_dir: impl Into<PathBuf>,
        config: &ExportConfig,
    ) -> Self {
        Self::new(materializer, output_dir, config.max_concurrent_transfers)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn export(&self, photos: &[Photo]) -> ExportReport {
        let mut report = ExportReport::default();
        if photos.is_empty() {
            return report;
        }
        if let Err(source) = tokio::fs::create_dir_all(&self.output_dir).await {
            let path = self.output_dir.clone();
            warn!(dir = %path.display(), error = %source, "❌ Cannot create export directory");
            // 디렉터리 생성 실패 시 모든 사진 실패 처리
            report.failed = photos
                .iter()
                .map(|p| {
                    let err = std::io::Error::new(source.kind(), source.to_string());
                    (p.media_item_id.clone(), ExportError::Io { path: path.clone(), source: err })
                })
                .collect();
            return report;
        }

        let results = self.pool.run(photos.iter().collect(), |photo| self.export_one(photo)).await;

        for (photo, result) in photos.iter().zip(results) {
            match result {
                Ok(path) => report.saved.push((photo.media_item_id.clone(), path)),
                Err(err) => {
                    warn!(media_item_id = %photo.media_item_id, error = %err, "Export failed");
                    report.failed.push((photo.media_item_id.clone(), err));
                }
            }
        }

        info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            dir = %self.output_dir.display(),
            "💾 Export finished"
        );
        report
    }

    async fn export_one(&self, photo: &Photo) -> Result<PathBuf, ExportError> {
        let image = self.materializer.materialize(photo).await?;
        let file_name = export_file_name(&photo.media_item_id, &image.mime_type);

        // 같은 이름이 이미 있으면 -1, -2 ... 를 붙인다
        for n in 0..MAX_NAME_SUFFIX {
            let path = self.output_dir.join(numbered_file_name(&file_name, n));
            let opened =
                tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await;
            let mut file = match opened {
                Ok(file) => file,
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(ExportError::Io { path, source }),
            };
            let written = match file.write_all(&image.data).await {
                Ok(()) => file.flush().await,
                Err(err) => Err(err),
            };
            return match written {
                Ok(()) => Ok(path),
                Err(source) => Err(ExportError::Io { path, source }),
            };
        }

        let path = self.output_dir.join(file_name);
        Err(ExportError::Io {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free file name left",
            ),
        })
    }
}

const MAX_NAME_SUFFIX: usize = 10_000;

/// `name.ext` for 0, `name-n.ext` otherwise
fn numbered_file_name(file_name: &str, n: usize) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{n}.{ext}"),
        None => format!("{file_name}-{n}"),
    }
}

/// Sanitized `media_item_id` plus an extension derived from the mime type
pub fn export_file_name(media_item_id: &str, mime_type: &str) -> String {
    let stem = match UNSAFE_FILE_CHARS.as_ref() {
        Some(re) => re.replace_all(media_item_id, "_").into_owned(),
        None => media_item_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' }
            })
            .collect(),
    };
    let stem = stem.trim_matches(|c: char| c == '.' || c == '_');
    let stem = if stem.is_empty() { "photo" } else { stem };
    format!("{stem}.{}", extension_for(mime_type))
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().map(str::trim).unwrap_or_default() {
        "image/png" => "png",
        "image/heic" => "heic",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}
