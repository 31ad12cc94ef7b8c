//! Configuration types for card rendering.
//!
//! All static, process-wide behaviour is controlled through [`RenderConfig`],
//! built via its [`RenderConfigBuilder`]. Per-request inputs live on
//! [`crate::request::RenderRequest`]; the config only supplies bounds,
//! timeouts and defaults, and is shared read-only across requests.

use crate::error::CardError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::storage::{ArtifactStore, DisabledStore};

/// A desktop Chrome identity. Several image hosts refuse hot-linking from
/// clients that do not look like a browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Configuration for the card rendering pipeline.
///
/// Built via [`RenderConfig::builder()`] or using [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use card_render::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .media_timeout_ms(4000)
///     .device_scale_factor(1.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.media_timeout_ms, 4000);
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// Smallest accepted card edge in CSS pixels. Default: 600.
    pub min_dimension: u32,

    /// Largest accepted card edge in CSS pixels. Default: 2000.
    ///
    /// Requests outside `[min_dimension, max_dimension]` are clamped, never
    /// rejected. The engine allocates `width × height × scale²` pixels, so this
    /// bound is what keeps a single request from exhausting memory.
    pub max_dimension: u32,

    /// Lower bound for the per-request font scale. Default: 0.6.
    pub min_font_scale: f32,

    /// Upper bound for the per-request font scale. Default: 1.4.
    pub max_font_scale: f32,

    /// Device pixel ratio used for capture. Range: 1.0–4.0. Default: 2.0.
    pub device_scale_factor: f64,

    /// Upper bound on waiting for the media element to load or fail. Default: 6000.
    pub media_timeout_ms: u64,

    /// Animation frames awaited after readiness before capture. Default: 2.
    pub settle_frames: u32,

    /// Timeout for downloading the card image, in seconds. Default: 20.
    pub fetch_timeout_secs: u64,

    /// Largest image body accepted for inlining, in bytes. Default: 20 MiB.
    pub max_image_bytes: usize,

    /// Default timeout for engine operations (load, evaluate, capture). Default: 30.
    pub load_timeout_secs: u64,

    /// User-Agent sent when fetching images.
    pub user_agent: String,

    /// Explicit Chrome/Chromium binary. If None, headless_chrome auto-detects.
    pub chrome_path: Option<PathBuf>,

    /// Run Chrome with its sandbox. Containers running as root need `false`. Default: true.
    pub sandbox: bool,

    /// Texts with fewer words than this auto-resolve to the quote layout. Default: 40.
    pub quote_word_threshold: usize,

    /// Shortest image URL the auto resolver treats as present. Default: 8.
    pub min_image_url_len: usize,

    /// Handle stamped in the footer when the request has none. Default: "@anon".
    pub default_handle: String,

    /// Page index stamped in the footer when the request has none. Default: "1/1".
    pub default_page_no: String,

    /// The two labels shown by layouts with an action footer.
    pub footer_labels: (String, String),

    /// Durable storage for non-binary output. Default: [`DisabledStore`].
    pub store: Arc<dyn ArtifactStore>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_dimension: 600,
            max_dimension: 2000,
            min_font_scale: 0.6,
            max_font_scale: 1.4,
            device_scale_factor: 2.0,
            media_timeout_ms: 6000,
            settle_frames: 2,
            fetch_timeout_secs: 20,
            max_image_bytes: 20 * 1024 * 1024,
            load_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_path: None,
            sandbox: true,
            quote_word_threshold: 40,
            min_image_url_len: 8,
            default_handle: "@anon".to_string(),
            default_page_no: "1/1".to_string(),
            footer_labels: ("Save".to_string(), "Share".to_string()),
            store: Arc::new(DisabledStore),
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("min_dimension", &self.min_dimension)
            .field("max_dimension", &self.max_dimension)
            .field("min_font_scale", &self.min_font_scale)
            .field("max_font_scale", &self.max_font_scale)
            .field("device_scale_factor", &self.device_scale_factor)
            .field("media_timeout_ms", &self.media_timeout_ms)
            .field("settle_frames", &self.settle_frames)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("load_timeout_secs", &self.load_timeout_secs)
            .field("chrome_path", &self.chrome_path)
            .field("sandbox", &self.sandbox)
            .field("quote_word_threshold", &self.quote_word_threshold)
            .field("store", &self.store.name())
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Clamp a requested card edge into the configured bounds.
    pub fn clamp_dimension(&self, px: u32) -> u32 {
        px.clamp(self.min_dimension, self.max_dimension)
    }

    /// Clamp a requested font scale into the configured bounds.
    ///
    /// Infinities clamp to the nearest bound; NaN is the neutral scale 1.0.
    pub fn clamp_font_scale(&self, scale: f64) -> f32 {
        let scale = if scale.is_nan() { 1.0 } else { scale };
        // Bounds are f32, so the clamped value narrows without overflow.
        scale.clamp(f64::from(self.min_font_scale), f64::from(self.max_font_scale)) as f32
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn dimension_bounds(mut self, min: u32, max: u32) -> Self {
        self.config.min_dimension = min;
        self.config.max_dimension = max;
        self
    }

    pub fn font_scale_bounds(mut self, min: f32, max: f32) -> Self {
        self.config.min_font_scale = min;
        self.config.max_font_scale = max;
        self
    }

    pub fn device_scale_factor(mut self, dsf: f64) -> Self {
        self.config.device_scale_factor = dsf.clamp(1.0, 4.0);
        self
    }

    pub fn media_timeout_ms(mut self, ms: u64) -> Self {
        self.config.media_timeout_ms = ms.clamp(500, 30_000);
        self
    }

    pub fn settle_frames(mut self, n: u32) -> Self {
        self.config.settle_frames = n.clamp(1, 10);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn max_image_bytes(mut self, bytes: usize) -> Self {
        self.config.max_image_bytes = bytes.max(1);
        self
    }

    pub fn load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.load_timeout_secs = secs.max(1);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn sandbox(mut self, enabled: bool) -> Self {
        self.config.sandbox = enabled;
        self
    }

    pub fn quote_word_threshold(mut self, words: usize) -> Self {
        self.config.quote_word_threshold = words.max(1);
        self
    }

    pub fn min_image_url_len(mut self, len: usize) -> Self {
        self.config.min_image_url_len = len;
        self
    }

    pub fn default_handle(mut self, handle: impl Into<String>) -> Self {
        self.config.default_handle = handle.into();
        self
    }

    pub fn default_page_no(mut self, page_no: impl Into<String>) -> Self {
        self.config.default_page_no = page_no.into();
        self
    }

    pub fn footer_labels(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.config.footer_labels = (first.into(), second.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.config.store = store;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, CardError> {
        let c = &self.config;
        if c.min_dimension < 100 || c.min_dimension > c.max_dimension {
            return Err(CardError::InvalidConfig(format!(
                "dimension bounds must satisfy 100 ≤ min ≤ max, got {}..{}",
                c.min_dimension, c.max_dimension
            )));
        }
        if !(c.min_font_scale > 0.0 && c.min_font_scale <= c.max_font_scale) {
            return Err(CardError::InvalidConfig(format!(
                "font scale bounds must satisfy 0 < min ≤ max, got {}..{}",
                c.min_font_scale, c.max_font_scale
            )));
        }
        if c.user_agent.trim().is_empty() {
            return Err(CardError::InvalidConfig("user agent must not be empty".into()));
        }
        Ok(self.config)
    }
}
