//! Comparison API client
//!
//! Sends one source image and an ordered list of target images to the
//! face-comparison endpoint and returns the ordered per-target entries.
//! No retry happens here; that is the chunk executor's job.

use async_trait::async_trait;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::{InMemoryState, direct::NotKeyed}};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{ComparisonError, ImageBytes, RawComparison};
use crate::infrastructure::config::ComparisonApiConfig;

/// Longest error body kept in `ComparisonError::Status`
const MAX_ERROR_BODY_CHARS: usize = 512;
const ZERO_RATE_LIMIT: &str = "Rate limit must be greater than 0";

/// Boundary to the external face-comparison service
#[async_trait]
pub trait ComparisonClient: Send + Sync {
    /// Compare `source` against every target, in order
    ///
    /// The result is ordered like `targets` and may be shorter than it.
    async fn compare(
        &self,
        source: &ImageBytes,
        targets: &[ImageBytes],
    ) -> Result<Vec<RawComparison>, ComparisonError>;
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    results: Vec<RawComparison>,
}

/// Comparison client speaking multipart/form-data over HTTP
pub struct HttpComparisonClient {
    client: Client,
    endpoint: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    timeout: Duration,
}

impl HttpComparisonClient {
    /// Create a client from the API configuration
    pub fn new(config: &ComparisonApiConfig) -> Result<Self, ComparisonError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ComparisonError::Request(format!("Invalid user agent: {e}")))?,
        );
        if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ComparisonError::Request(format!("Invalid API key: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ComparisonError::Request(format!("Failed to create HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(config.max_requests_per_second)
            .ok_or_else(|| ComparisonError::Request(ZERO_RATE_LIMIT.to_string()))?;
        let quota = Quota::per_second(per_second);

        Ok(Self {
            client,
            endpoint: config.endpoint_url(),
            rate_limiter: RateLimiter::direct(quota),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_form(source: &ImageBytes, targets: &[ImageBytes]) -> Result<Form, ComparisonError> {
        let mut form = Form::new().part("source", image_part(source, "source".to_string())?);
        for (i, target) in targets.iter().enumerate() {
            form = form.part("targets", image_part(target, format!("target-{i}"))?);
        }
        Ok(form)
    }

    fn map_send_error(&self, err: &reqwest::Error) -> ComparisonError {
        if err.is_timeout() {
            ComparisonError::Timeout(self.timeout)
        } else if err.is_builder() {
            ComparisonError::Request(err.to_string())
        } else {
            ComparisonError::Network(err.to_string())
        }
    }
}

fn image_part(image: &ImageBytes, file_name: String) -> Result<Part, ComparisonError> {
    Part::bytes(image.data.clone())
        .file_name(file_name)
        .mime_str(&image.mime_type)
        .map_err(|e| {
            ComparisonError::Request(format!("Invalid mime type '{}': {e}", image.mime_type))
        })
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        truncated.push('…');
        truncated
    }
}

#[async_trait]
impl ComparisonClient for HttpComparisonClient {
    async fn compare(
        &self,
        source: &ImageBytes,
        targets: &[ImageBytes],
    ) -> Result<Vec<RawComparison>, ComparisonError> {
        let form = Self::build_form(source, targets)?;

        self.rate_limiter.until_ready().await;
        debug!(endpoint = %self.endpoint, targets = targets.len(), "Sending comparison request");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(&e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Comparison API returned an error status");
            return Err(ComparisonError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Err(ComparisonError::MalformedPayload("empty response body".to_string()));
        }

        let parsed: CompareResponse = serde_json::from_str(&body)
            .map_err(|e| ComparisonError::MalformedPayload(e.to_string()))?;

        debug!(
            sent = targets.len(),
            received = parsed.results.len(),
            "Comparison response decoded"
        );
        Ok(parsed.results)
    }
}
