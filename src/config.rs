//! Configuration types for a recognition run.
//!
//! Every knob lives in [`OcrConfig`], built via [`OcrConfigBuilder`]. The
//! defaults match what the layout-OCR service expects out of the box, so most
//! callers only set `api_base`.
//! [`OcrConfigBuilder::build`] validates the combination once.

use crate::error::PdfOcrError;
use crate::observer::PipelineObserver;
use crate::pipeline::geometry::GeometryBounds;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Prompt identifier that asks the service for full layout output
/// (category, bbox and text for every block).
pub const LAYOUT_PROMPT_TYPE: &str = "prompt_layout_all_en";

/// Configuration for one PDF recognition run.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .api_base("http://10.0.0.5:5123")
///     .dpi(200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Base URL of the OCR service. Default: `http://localhost:5123`.
    pub api_base: String,

    /// Rendering DPI for both OCR input and figure crops. Range: 72–600. Default: 200.
    ///
    /// Crops reuse the bbox coordinates the service returned, so OCR input and
    /// figure extraction must be rendered at the same DPI.
    pub dpi: u32,

    /// Largest raster side accepted at `dpi`. Default: 4500.
    ///
    /// Posters and oversized scans blow past any sensible pixel budget at
    /// 200 DPI. A page whose render exceeds this on either side is rendered
    /// again at 72 DPI instead.
    pub max_render_dimension: u32,

    /// Both sides of the OCR input must be multiples of this. Default: 28.
    pub factor: u32,

    /// Lower bound on OCR input pixels (width × height). Default: 3136.
    pub min_pixels: u64,

    /// Upper bound on OCR input pixels (width × height). Default: 11 289 600.
    pub max_pixels: u64,

    /// Prompt identifier sent with every page. Default: [`LAYOUT_PROMPT_TYPE`].
    pub prompt_type: String,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Nucleus-sampling top-p. Default: 1.0.
    pub top_p: f32,

    /// Generation budget per page. Default: 12 000.
    ///
    /// Dense pages produce long JSON; a budget that is too small truncates the
    /// array mid-object and the cleaner has to salvage what it can.
    pub max_new_tokens: u32,

    /// Timeout for the health probe in seconds. Default: 20.
    pub health_timeout_secs: u64,

    /// Timeout for one page's OCR request, including the streamed body.
    /// Default: 300.
    pub request_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Where to keep the progress record. `None` puts it beside the PDF as
    /// `<file name>.ocr_progress.json`.
    pub progress_path: Option<PathBuf>,

    /// Receives per-page events (for progress bars and the like).
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5123".to_string(),
            dpi: 200,
            max_render_dimension: 4500,
            factor: 28,
            min_pixels: 3136,
            max_pixels: 11_289_600,
            prompt_type: LAYOUT_PROMPT_TYPE.to_string(),
            temperature: 0.1,
            top_p: 1.0,
            max_new_tokens: 12_000,
            health_timeout_secs: 20,
            request_timeout_secs: 300,
            password: None,
            progress_path: None,
            observer: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("api_base", &self.api_base)
            .field("dpi", &self.dpi)
            .field("max_render_dimension", &self.max_render_dimension)
            .field("factor", &self.factor)
            .field("min_pixels", &self.min_pixels)
            .field("max_pixels", &self.max_pixels)
            .field("prompt_type", &self.prompt_type)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("health_timeout_secs", &self.health_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("progress_path", &self.progress_path)
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"),
            )
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// The geometry bounds described by `factor`, `min_pixels` and `max_pixels`.
    pub fn geometry(&self) -> Result<GeometryBounds, PdfOcrError> {
        GeometryBounds::new(self.factor, self.min_pixels, self.max_pixels)
    }

    /// `api_base` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = url.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_render_dimension(mut self, px: u32) -> Self {
        self.config.max_render_dimension = px.max(100);
        self
    }

    pub fn factor(mut self, factor: u32) -> Self {
        self.config.factor = factor;
        self
    }

    pub fn pixel_bounds(mut self, min_pixels: u64, max_pixels: u64) -> Self {
        self.config.min_pixels = min_pixels;
        self.config.max_pixels = max_pixels;
        self
    }

    pub fn prompt_type(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt_type = prompt.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn max_new_tokens(mut self, n: u32) -> Self {
        self.config.max_new_tokens = n;
        self
    }

    pub fn health_timeout_secs(mut self, secs: u64) -> Self {
        self.config.health_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.progress_path = Some(path.into());
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, PdfOcrError> {
        let c = &self.config;

        let url = reqwest::Url::parse(c.base_url()).map_err(|e| {
            PdfOcrError::InvalidConfig(format!("api_base '{}' is not a URL: {}", c.api_base, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PdfOcrError::InvalidConfig(format!(
                "api_base must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.dpi < 72 || c.dpi > 600 {
            return Err(PdfOcrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.prompt_type.trim().is_empty() {
            return Err(PdfOcrError::InvalidConfig("prompt_type must not be empty".into()));
        }
        if c.max_new_tokens == 0 {
            return Err(PdfOcrError::InvalidConfig("max_new_tokens must be ≥ 1".into()));
        }
        if c.health_timeout_secs == 0 || c.request_timeout_secs == 0 {
            return Err(PdfOcrError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        c.geometry()?;

        Ok(self.config)
    }
}
