//! Card rendering entry points.
//!
//! [`render_card`] runs the whole pipeline for one request. Everything it
//! creates (style, content, image asset, document, browser) lives only for
//! that call; the only state that outlives it is whatever the configured
//! store persisted.

use crate::config::RenderConfig;
use crate::error::CardError;
use crate::pipeline::engine::{self, RenderResult};
use crate::pipeline::fetch::{acquire_image, FetchOutcome, ImageAsset};
use crate::pipeline::package::{package, OutputArtifact};
use crate::pipeline::sanitize::SanitizedContent;
use crate::pipeline::template::{compose_document, RenderedDocument};
use crate::request::RenderRequest;
use crate::style::{resolve_style, Style};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// A composed document plus what went into it, ready for the engine.
#[derive(Debug, Clone)]
pub struct PreparedCard {
    pub style: Style,
    pub document: RenderedDocument,
    pub image: FetchOutcome,
}

/// The result of one render.
#[derive(Debug, Clone)]
pub struct CardOutput {
    pub style: Style,
    /// CSS pixel width of the card.
    pub width: u32,
    /// CSS pixel height of the card.
    pub height: u32,
    /// PNG pixel size (CSS size × device scale factor).
    pub pixel_size: (u32, u32),
    pub image: FetchOutcome,
    pub artifact: OutputArtifact,
    pub duration_ms: u64,
}

/// The JSON body returned for non-binary responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEnvelope {
    pub ok: bool,
    pub style: Style,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    pub filename: String,
    pub mode: &'static str,
}

impl CardOutput {
    pub fn envelope(&self) -> CardEnvelope {
        let (url, data_url) = match &self.artifact {
            OutputArtifact::Stored { url, .. } => (Some(url.clone()), None),
            OutputArtifact::Inline { data_url, .. } => (None, Some(data_url.clone())),
            OutputArtifact::Binary { .. } => (None, None),
        };
        CardEnvelope {
            ok: true,
            style: self.style,
            width: self.width,
            height: self.height,
            url,
            data_url,
            filename: self.artifact.filename().to_string(),
            mode: self.artifact.mode(),
        }
    }
}

/// Resolve the style and compose the document, without touching the engine.
///
/// Sanitising and image acquisition run concurrently. Neither can fail; the
/// only error here is an unknown explicit style.
pub async fn prepare_card(req: &RenderRequest, config: &RenderConfig) -> Result<PreparedCard, CardError> {
    let style = resolve_style(req, config)?;
    let canvas = req.canvas(style, config);
    debug!(
        "Style {} at {}x{} (font scale {}, fit {})",
        style,
        canvas.width,
        canvas.height,
        canvas.font_scale,
        canvas.fit.as_css()
    );

    let (content, asset) = tokio::join!(
        async { SanitizedContent::from_request(req, req.handle_or(config), req.page_no_or(config)) },
        async {
            if style.spec().has_media {
                acquire_image(&req.image_url, config).await
            } else {
                ImageAsset::none()
            }
        }
    );

    let document = compose_document(style, &canvas, &content, &asset, config);
    Ok(PreparedCard {
        style,
        document,
        image: asset.outcome,
    })
}

/// Render one card.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err(CardError)` only for fatal errors:
/// - Unknown explicit style
/// - Chrome could not be launched, loaded or captured
///
/// Image fetch and storage failures are absorbed (see [`CardOutput::image`]
/// and [`OutputArtifact::mode`]).
pub async fn render_card(req: &RenderRequest, config: &RenderConfig) -> Result<CardOutput, CardError> {
    let started = Instant::now();
    let prepared = prepare_card(req, config).await?;
    let style = prepared.style;

    let RenderResult {
        png,
        width,
        height,
        pixel_width,
        pixel_height,
    } = engine::capture(prepared.document, config).await?;

    let artifact = package(
        png,
        req.return_mode(),
        req.filename.as_deref(),
        req.download.unwrap_or(false),
        config,
    )
    .await;

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Rendered {} card {}x{} as {} ({}) in {}ms",
        style,
        width,
        height,
        artifact.mode(),
        artifact.filename(),
        duration_ms
    );

    Ok(CardOutput {
        style,
        width,
        height,
        pixel_size: (pixel_width, pixel_height),
        image: prepared.image,
        artifact,
        duration_ms,
    })
}

/// Render one card and write the PNG to `output_path`.
///
/// The request's own return mode is ignored; the bytes always go to disk.
pub async fn render_card_to_file(
    req: &RenderRequest,
    output_path: impl AsRef<Path>,
    config: &RenderConfig,
) -> Result<CardOutput, CardError> {
    let output_path = output_path.as_ref();
    let binary = RenderRequest {
        return_as: Some("binary".into()),
        ..req.clone()
    };

    let output = render_card(&binary, config).await?;
    if let OutputArtifact::Binary { bytes, .. } = &output.artifact {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CardError::Internal(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(output_path, bytes)
            .await
            .map_err(|e| CardError::Internal(format!("Failed to write {}: {}", output_path.display(), e)))?;
        info!("Wrote {}", output_path.display());
    }
    Ok(output)
}

/// Synchronous wrapper around [`render_card`].
///
/// Creates a temporary tokio runtime. Do not call from within an async context.
pub fn render_card_sync(req: &RenderRequest, config: &RenderConfig) -> Result<CardOutput, CardError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CardError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(render_card(req, config))
}
