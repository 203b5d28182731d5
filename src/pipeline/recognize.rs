//! Recognition client: one streamed OCR call per page → typed blocks.
//!
//! ## Layers
//!
//! - [`OcrService`] is the wire seam: a health probe and a streamed `/ocr`
//!   call. [`HttpOcrService`] speaks HTTP via reqwest; tests plug in fakes.
//! - [`Recognizer`] owns the per-page contract: encode, send, accumulate the
//!   stream, clean, and decide between a block list and a [`PageError`].
//!
//! ## Failure policy
//!
//! A failed health probe is fatal for the run ([`PdfOcrError`]). Anything
//! that goes wrong with one page is a [`PageError`]: the page stays
//! unrecognized and the orchestrator moves on. A connection that drops
//! mid-stream still gets its accumulated text cleaned; if that yields
//! blocks, the page counts as recognized.

use crate::block::{Block, PageResult};
use crate::config::OcrConfig;
use crate::error::{PageError, PdfOcrError};
use crate::pipeline::clean::{LayoutOutputCleaner, OutputCleaner};
use crate::pipeline::encode;
use crate::stream::{self, LineStream};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// JSON body of `POST /ocr`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrRequest {
    /// Base64 PNG of the resized page.
    pub image: String,
    pub prompt_type: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
    pub stream: bool,
}

impl OcrRequest {
    pub fn new(image: String, config: &OcrConfig) -> Self {
        Self {
            image,
            prompt_type: config.prompt_type.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_new_tokens: config.max_new_tokens,
            stream: true,
        }
    }
}

/// The remote OCR service.
pub trait OcrService: Send + Sync {
    /// Succeeds only if the service is reachable and has a model loaded.
    fn health(&self) -> impl Future<Output = Result<(), PdfOcrError>> + Send;

    /// Start a streamed recognition of `page_num`.
    ///
    /// Resolves once the response headers are in; a non-200 status or a
    /// failed send is an error here, body errors surface in the stream.
    fn stream_ocr(
        &self,
        page_num: usize,
        request: &OcrRequest,
    ) -> impl Future<Output = Result<LineStream, PageError>> + Send;
}

// ── HTTP ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    model_loaded: bool,
}

/// [`OcrService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOcrService {
    client: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
    request_timeout: Duration,
}

impl HttpOcrService {
    pub fn new(
        base_url: impl Into<String>,
        health_timeout_secs: u64,
        request_timeout_secs: u64,
    ) -> Result<Self, PdfOcrError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PdfOcrError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            health_timeout: Duration::from_secs(health_timeout_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }

    pub fn from_config(config: &OcrConfig) -> Result<Self, PdfOcrError> {
        Self::new(
            config.base_url(),
            config.health_timeout_secs,
            config.request_timeout_secs,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl OcrService for HttpOcrService {
    async fn health(&self) -> Result<(), PdfOcrError> {
        let url = format!("{}/health", self.base_url);
        let unavailable = |reason: String| PdfOcrError::ServiceUnavailable {
            url: url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| unavailable(format!("cannot connect: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(unavailable(format!("health check returned HTTP {status}")));
        }

        let body: HealthBody = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid health response: {e}")))?;

        if !body.model_loaded {
            return Err(unavailable("model not loaded".to_string()));
        }

        info!("OCR service is healthy, model loaded");
        Ok(())
    }

    async fn stream_ocr(
        &self,
        page_num: usize,
        request: &OcrRequest,
    ) -> Result<LineStream, PageError> {
        let url = format!("{}/ocr", self.base_url);
        let secs = self.request_timeout.as_secs();

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(page_num, secs, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PageError::HttpStatus {
                page: page_num,
                status: status.as_u16(),
            });
        }

        Ok(stream::ndjson_lines(response.bytes_stream(), move |e| {
            transport_error(page_num, secs, e)
        }))
    }
}

fn transport_error(page: usize, secs: u64, e: reqwest::Error) -> PageError {
    if e.is_timeout() {
        PageError::Timeout { page, secs }
    } else {
        PageError::Transport {
            page,
            detail: e.to_string(),
        }
    }
}

// ── Recognizer ───────────────────────────────────────────────────────────

/// Per-page recognition on top of an [`OcrService`].
pub struct Recognizer<S, C = LayoutOutputCleaner> {
    service: S,
    cleaner: C,
    config: OcrConfig,
}

impl<S: OcrService> Recognizer<S> {
    pub fn new(service: S, config: &OcrConfig) -> Self {
        Self {
            service,
            cleaner: LayoutOutputCleaner,
            config: config.clone(),
        }
    }
}

impl<S: OcrService, C: OutputCleaner> Recognizer<S, C> {
    /// Replace the output cleaner.
    pub fn with_cleaner<C2: OutputCleaner>(self, cleaner: C2) -> Recognizer<S, C2> {
        Recognizer {
            service: self.service,
            cleaner,
            config: self.config,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Liveness probe; failure means no page should be attempted.
    pub async fn health_check(&self) -> Result<(), PdfOcrError> {
        debug!("Checking OCR service health at {}", self.config.base_url());
        self.service.health().await
    }

    /// Resize `image` to `target` (`(height, width)`), send it, and return
    /// its blocks.
    pub async fn recognize(
        &self,
        page_num: usize,
        image: &DynamicImage,
        target: (u32, u32),
        on_fragment: impl FnMut(&str) + Send,
    ) -> Result<PageResult, PageError> {
        let (target_height, target_width) = target;
        let encoded = encode::encode_for_ocr(image, target_height, target_width).map_err(|e| {
            PageError::EncodeFailed {
                page: page_num,
                detail: e.to_string(),
            }
        })?;
        self.recognize_encoded(page_num, encoded, on_fragment).await
    }

    /// Send an already-encoded page image and return its blocks.
    pub async fn recognize_encoded(
        &self,
        page_num: usize,
        image_b64: String,
        on_fragment: impl FnMut(&str) + Send,
    ) -> Result<PageResult, PageError> {
        info!("Recognizing page {}", page_num);
        let request = OcrRequest::new(image_b64, &self.config);

        let lines = self.service.stream_ocr(page_num, &request).await?;
        let acc = stream::accumulate(lines, on_fragment).await;

        debug!(
            "Page {}: raw response {} chars ({} chunks, {} malformed lines, done={})",
            page_num,
            acc.text.chars().count(),
            acc.chunks,
            acc.malformed,
            acc.done
        );

        match parse_blocks(page_num, &acc.text, &self.cleaner) {
            Ok(blocks) => {
                if let Some(e) = &acc.error {
                    warn!(
                        "Page {}: stream cut short ({}), but {} blocks were usable",
                        page_num,
                        e,
                        blocks.len()
                    );
                }
                info!("Page {}: recognized {} blocks", page_num, blocks.len());
                Ok(blocks)
            }
            Err(parse_err) => Err(acc.error.unwrap_or(parse_err)),
        }
    }
}

/// Cleaner first, then a direct parse of the raw text.
fn parse_blocks<C: OutputCleaner>(
    page_num: usize,
    text: &str,
    cleaner: &C,
) -> Result<PageResult, PageError> {
    let clean_detail = match cleaner.clean(text) {
        Ok(Value::Array(items)) if !items.is_empty() => {
            let blocks = blocks_from_values(page_num, items);
            if !blocks.is_empty() {
                return Ok(blocks);
            }
            "no item is a valid block".to_string()
        }
        Ok(Value::Array(_)) => "empty list".to_string(),
        Ok(other) => format!("expected a list, got {}", json_kind(&other)),
        Err(e) => e.to_string(),
    };

    debug!(
        "Page {}: cleaning failed ({}), trying a direct parse",
        page_num, clean_detail
    );

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => {
            let blocks = blocks_from_values(page_num, items);
            if blocks.is_empty() {
                Err(PageError::NoBlocks { page: page_num })
            } else {
                Ok(blocks)
            }
        }
        _ => Err(PageError::Unparseable {
            page: page_num,
            chars: text.chars().count(),
            detail: clean_detail,
        }),
    }
}

fn blocks_from_values(page_num: usize, items: Vec<Value>) -> PageResult {
    let total = items.len();
    let blocks: PageResult = items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<Block>(v).ok())
        .collect();
    if blocks.len() < total {
        warn!(
            "Page {}: dropped {} of {} items that are not blocks",
            page_num,
            total - blocks.len(),
            total
        );
    }
    blocks
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
