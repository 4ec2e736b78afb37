//! Photo materializers
//!
//! Turn a [`Photo`] reference into raw image bytes. Backing stores:
//! remote object storage (HTTP), the local photo library (files under a
//! library root) and an in-memory preloaded cache. Failures are per photo.

use async_trait::async_trait;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::{InMemoryState, direct::NotKeyed}};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::domain::{ImageBytes, MaterializeError, Photo, PhotoLocator};
use crate::infrastructure::config::MaterializerConfig;

/// Produces image bytes for a photo reference
#[async_trait]
pub trait PhotoMaterializer: Send + Sync {
    async fn materialize(&self, photo: &Photo) -> Result<ImageBytes, MaterializeError>;
}

/// Fetches remote photos over HTTP with client-side rate limiting
pub struct HttpPhotoMaterializer {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpPhotoMaterializer {
    pub fn new(config: &MaterializerConfig) -> Result<Self, MaterializeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| MaterializeError::Network(format!("Invalid user agent: {e}")))?,
        );
        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| MaterializeError::Network(format!("Failed to create HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(config.max_requests_per_second).ok_or_else(|| {
            MaterializeError::Network("Rate limit must be greater than 0".to_string())
        })?;
        let quota = Quota::per_second(per_second);

        Ok(Self { client, rate_limiter: RateLimiter::direct(quota) })
    }

    async fn fetch(&self, url: &str, photo: &Photo) -> Result<ImageBytes, MaterializeError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| MaterializeError::InvalidLocator(format!("{url}: {e}")))?;

        self.rate_limiter.until_ready().await;
        debug!(media_item_id = %photo.media_item_id, "Fetching remote photo");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| MaterializeError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MaterializeError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(MaterializeError::Http { status: status.as_u16(), url: url.to_string() });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .map_or_else(|| photo.mime_type().to_string(), ToString::to_string);

        let data = response.bytes().await.map_err(|e| MaterializeError::Network(e.to_string()))?;
        if data.is_empty() {
            return Err(MaterializeError::EmptyBody(photo.media_item_id.clone()));
        }
        Ok(ImageBytes::new(data.to_vec(), mime_type))
    }
}

#[async_trait]
impl PhotoMaterializer for HttpPhotoMaterializer {
    async fn materialize(&self, photo: &Photo) -> Result<ImageBytes, MaterializeError> {
        match &photo.locator {
            PhotoLocator::Remote { url } => self.fetch(url, photo).await,
            PhotoLocator::LocalAsset { asset_id } => Err(MaterializeError::InvalidLocator(format!(
                "local asset '{asset_id}' cannot be fetched over HTTP"
            ))),
        }
    }
}

/// Reads local library assets from files under a library root
#[derive(Debug, Clone)]
pub struct LocalFileMaterializer {
    library_root: PathBuf,
}

impl LocalFileMaterializer {
    pub fn new(library_root: impl Into<PathBuf>) -> Self {
        Self { library_root: library_root.into() }
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// Resolve an asset id to a path inside the library root
    fn resolve(&self, asset_id: &str) -> Result<PathBuf, MaterializeError> {
        let relative = Path::new(asset_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if asset_id.is_empty() || escapes {
            return Err(MaterializeError::InvalidLocator(format!(
                "asset id '{asset_id}' is outside the library"
            )));
        }
        Ok(self.library_root.join(relative))
    }
}

#[async_trait]
impl PhotoMaterializer for LocalFileMaterializer {
    async fn materialize(&self, photo: &Photo) -> Result<ImageBytes, MaterializeError> {
        let PhotoLocator::LocalAsset { asset_id } = &photo.locator else {
            return Err(MaterializeError::InvalidLocator(format!(
                "photo '{}' is not a local asset",
                photo.media_item_id
            )));
        };

        let path = self.resolve(asset_id)?;
        let data = tokio::fs::read(&path).await?;
        if data.is_empty() {
            return Err(MaterializeError::EmptyBody(photo.media_item_id.clone()));
        }
        let mime_type = photo
            .metadata
            .mime_type
            .clone()
            .or_else(|| mime_from_extension(&path).map(ToString::to_string))
            .unwrap_or_else(|| ImageBytes::DEFAULT_MIME_TYPE.to_string());
        Ok(ImageBytes::new(data, mime_type))
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "heic" => Some("image/heic"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Preloaded image bytes keyed by `media_item_id`
#[derive(Debug, Default)]
pub struct InMemoryPhotoCache {
    entries: RwLock<HashMap<String, ImageBytes>>,
}

impl InMemoryPhotoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, media_item_id: impl Into<String>, image: ImageBytes) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(media_item_id.into(), image);
        }
    }

    pub fn get(&self, media_item_id: &str) -> Option<ImageBytes> {
        self.entries.read().ok()?.get(media_item_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PhotoMaterializer for InMemoryPhotoCache {
    async fn materialize(&self, photo: &Photo) -> Result<ImageBytes, MaterializeError> {
        self.get(&photo.media_item_id)
            .ok_or_else(|| MaterializeError::NotFound(photo.media_item_id.clone()))
    }
}

/// Cache first, then dispatch on the locator kind
pub struct CompositeMaterializer {
    cache: Option<Arc<InMemoryPhotoCache>>,
    remote: Option<Arc<dyn PhotoMaterializer>>,
    local: Option<Arc<dyn PhotoMaterializer>>,
}

impl CompositeMaterializer {
    pub fn new() -> Self {
        Self { cache: None, remote: None, local: None }
    }

    /// Adapters configured from [`MaterializerConfig`]
    pub fn from_config(config: &MaterializerConfig) -> Result<Self, MaterializeError> {
        let mut composite = Self::new().with_remote(Arc::new(HttpPhotoMaterializer::new(config)?));
        if let Some(root) = &config.library_root {
            composite = composite.with_local(Arc::new(LocalFileMaterializer::new(root)));
        }
        Ok(composite)
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<InMemoryPhotoCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn PhotoMaterializer>) -> Self {
        self.remote = Some(remote);
        self
    }

    #[must_use]
    pub fn with_local(mut self, local: Arc<dyn PhotoMaterializer>) -> Self {
        self.local = Some(local);
        self
    }
}

impl Default for CompositeMaterializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PhotoMaterializer for CompositeMaterializer {
    async fn materialize(&self, photo: &Photo) -> Result<ImageBytes, MaterializeError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&photo.media_item_id)) {
            return Ok(hit);
        }
        let backend = match photo.locator {
            PhotoLocator::Remote { .. } => self.remote.as_ref(),
            PhotoLocator::LocalAsset { .. } => self.local.as_ref(),
        };
        match backend {
            Some(backend) => backend.materialize(photo).await,
            None => Err(MaterializeError::InvalidLocator(format!(
                "no materializer configured for {} photos",
                photo.locator.kind()
            ))),
        }
    }
}
