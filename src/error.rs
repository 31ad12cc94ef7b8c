//! Error types for the card-render library.
//!
//! Two tiers of failure exist, mirroring where they occur in the pipeline:
//!
//! * [`CardError`] is **fatal**: the request cannot produce a card at all
//!   (unknown style, engine would not launch, capture failed). Returned as
//!   `Err(CardError)` from [`crate::card::render_card`].
//!
//! * [`FetchError`] and [`StoreError`] are **non-fatal**: something upstream of
//!   pixel capture went wrong (the image could not be downloaded, the durable
//!   store rejected the upload). These are logged and recorded on the result
//!   types, and the pipeline degrades around them instead of failing.
//!
//! Sanitisation has no error type: it cannot fail.

use thiserror::Error;

/// All fatal errors returned by the card-render library.
#[derive(Debug, Error)]
pub enum CardError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The `style` field named a layout that does not exist.
    #[error("Unknown style '{style}'. Expected one of: {expected}")]
    UnknownStyle { style: String, expected: String },

    /// The request body could not be understood.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Engine errors ─────────────────────────────────────────────────────
    /// Chrome could not be started or a tab could not be opened.
    #[error("Rendering engine failed to launch: {0}\nSet chrome_path (CARD_RENDER_CHROME_PATH) or install Chrome/Chromium.")]
    EngineLaunch(String),

    /// The composed document could not be loaded into the engine.
    #[error("Failed to load document into the rendering engine: {0}")]
    ContentLoad(String),

    /// Screenshot capture failed.
    #[error("Capture failed: {0}")]
    Capture(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CardError {
    /// `true` for errors the caller caused (bad style, bad body).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CardError::UnknownStyle { .. } | CardError::InvalidRequest(_)
        )
    }
}

/// A non-fatal failure while acquiring the card image.
///
/// Stored on [`crate::pipeline::fetch::ImageAsset`]; the template then falls
/// back to referencing the normalized URL directly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The URL is not an absolute http(s) URL.
    #[error("unsupported image URL '{url}'")]
    UnsupportedUrl { url: String },

    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("'{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body could not be read or was empty.
    #[error("empty or unreadable body from '{url}'")]
    EmptyBody { url: String },

    /// The body exceeds the configured download cap.
    #[error("image at '{url}' exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// A non-fatal failure of the durable storage collaborator.
///
/// The output packager falls back to an inline data URL when it sees one.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No store is configured.
    #[error("persistent storage is disabled")]
    Disabled,

    /// Writing to the filesystem store failed.
    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote store rejected or dropped the upload.
    #[error("upload to '{endpoint}' failed: {reason}")]
    Upload { endpoint: String, reason: String },
}
