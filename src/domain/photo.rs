//! Photo references and materialized image bytes
//!
//! A [`Photo`] is owned by the caller of the pipeline. The core only borrows
//! or clones it and never mutates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the bytes of a photo can be fetched from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhotoLocator {
    /// Remote object (signed S3 URL, CDN URL, ...)
    Remote { url: String },
    /// Asset in the local photo library, addressed by its library handle
    LocalAsset { asset_id: String },
}

impl PhotoLocator {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote",
            Self::LocalAsset { .. } => "local_asset",
        }
    }
}

/// Descriptive metadata carried along with a photo
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A photo taking part in a comparison run
///
/// - `media_item_id`: opaque, stable identity of the photo
/// - `locator`: how to fetch its bytes
/// - `metadata`: dimensions, mime type and creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub media_item_id: String,
    pub locator: PhotoLocator,
    #[serde(default)]
    pub metadata: PhotoMetadata,
}

impl Photo {
    pub fn remote(media_item_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            media_item_id: media_item_id.into(),
            locator: PhotoLocator::Remote { url: url.into() },
            metadata: PhotoMetadata::default(),
        }
    }

    pub fn local(media_item_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            media_item_id: media_item_id.into(),
            locator: PhotoLocator::LocalAsset { asset_id: asset_id.into() },
            metadata: PhotoMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: PhotoMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Declared mime type, falling back to JPEG
    pub fn mime_type(&self) -> &str {
        self.metadata.mime_type.as_deref().unwrap_or(ImageBytes::DEFAULT_MIME_TYPE)
    }
}

/// Raw image bytes produced by a photo materializer
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBytes {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageBytes {
    pub const DEFAULT_MIME_TYPE: &'static str = "image/jpeg";

    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self { data, mime_type: mime_type.into() }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        Self::new(data, Self::DEFAULT_MIME_TYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Image payloads can be megabytes; only print the size.
impl std::fmt::Debug for ImageBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBytes")
            .field("len", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}
