//! The render request as it arrives on the wire, and its clamped canvas.
//!
//! Every text field is lenient: `null`, numbers and booleans are coerced to
//! strings and missing fields become `""`, so downstream stages never see an
//! absent value.

use crate::config::RenderConfig;
use crate::style::{Fit, Style};
use serde::{Deserialize, Deserializer, Serialize};

/// One card render request.
///
/// Field names follow the JSON body (`imageUrl`, `ctaButtonText`, …).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderRequest {
    /// Layout identifier or `"auto"`. Absent means auto.
    #[serde(deserialize_with = "lenient_opt_string")]
    pub style: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub image_url: String,
    #[serde(deserialize_with = "lenient_string")]
    pub caption: String,
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub body: String,
    #[serde(deserialize_with = "lenient_string")]
    pub quote: String,
    #[serde(deserialize_with = "lenient_string")]
    pub cta_text: String,
    #[serde(deserialize_with = "lenient_string")]
    pub cta_button_text: String,
    #[serde(deserialize_with = "lenient_string")]
    pub cta_url: String,

    /// Identity stamp, e.g. `@studio`. Falls back to the configured default.
    #[serde(deserialize_with = "lenient_opt_string")]
    pub handle: Option<String>,

    /// Page index stamp, e.g. `2/5`. Falls back to the configured default.
    #[serde(deserialize_with = "lenient_opt_string")]
    pub page_no: Option<String>,

    /// Card width in CSS px. Any JSON number (or numeric string) is accepted
    /// and clamped; fractions are rounded.
    #[serde(deserialize_with = "lenient_opt_number")]
    pub width: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_number")]
    pub height: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_number")]
    pub font_scale: Option<f64>,

    /// `"cover"` or `"contain"`; anything else uses the style default.
    #[serde(deserialize_with = "lenient_opt_string")]
    pub fit: Option<String>,

    /// Base name for the produced file. Sanitised before use.
    #[serde(deserialize_with = "lenient_opt_string")]
    pub filename: Option<String>,

    /// `"binary"` or `"dataUrl"` (default).
    #[serde(rename = "return", deserialize_with = "lenient_opt_string")]
    pub return_as: Option<String>,

    /// Shorthand for `return: "binary"`.
    pub binary: Option<bool>,

    /// Binary mode only: ask for `attachment` instead of `inline` disposition.
    pub download: Option<bool>,
}

/// How the caller wants the artifact delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMode {
    /// Raw PNG bytes in the response body.
    Binary,
    /// JSON envelope carrying a stored URL, or an inline data URL as fallback.
    Json,
}

/// The pixel geometry a request resolves to, after clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub font_scale: f32,
    pub fit: Fit,
}

impl RenderRequest {
    /// Resolve the caller's delivery preference.
    pub fn return_mode(&self) -> ReturnMode {
        let by_name = self
            .return_as
            .as_deref()
            .is_some_and(|r| r.trim().eq_ignore_ascii_case("binary"));
        if by_name || self.binary == Some(true) {
            ReturnMode::Binary
        } else {
            ReturnMode::Json
        }
    }

    /// Handle to stamp, falling back to the configured default when blank.
    pub fn handle_or<'a>(&'a self, config: &'a RenderConfig) -> &'a str {
        non_blank(self.handle.as_deref()).unwrap_or(&config.default_handle)
    }

    /// Page index to stamp, falling back to the configured default when blank.
    pub fn page_no_or<'a>(&'a self, config: &'a RenderConfig) -> &'a str {
        non_blank(self.page_no.as_deref()).unwrap_or(&config.default_page_no)
    }

    /// Compute the clamped canvas for `style`.
    ///
    /// Dimensions default to the style's table row and are always clamped to
    /// the configured bounds before anything is rendered.
    pub fn canvas(&self, style: Style, config: &RenderConfig) -> Canvas {
        let spec = style.spec();
        let width = self
            .width
            .map(|w| clamp_px(w, config))
            .unwrap_or_else(|| config.clamp_dimension(spec.width));
        let height = self
            .height
            .map(|h| clamp_px(h, config))
            .unwrap_or_else(|| config.clamp_dimension(spec.height));
        let font_scale = config.clamp_font_scale(self.font_scale.unwrap_or(1.0));
        let fit = self
            .fit
            .as_deref()
            .and_then(Fit::parse)
            .unwrap_or(spec.fit);

        Canvas {
            width,
            height,
            font_scale,
            fit,
        }
    }
}

fn clamp_px(px: f64, config: &RenderConfig) -> u32 {
    if px.is_nan() {
        return config.min_dimension;
    }
    let bounded = px
        .round()
        .clamp(f64::from(config.min_dimension), f64::from(config.max_dimension));
    // In range after the clamp, so the cast is exact.
    config.clamp_dimension(bounded as u32)
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

fn coerce(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(coerce(value).unwrap_or_default())
}

/// Numbers pass through, numeric strings are parsed, anything else is absent.
fn lenient_opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(coerce(value))
}
