//! Output packaging: captured PNG → the artifact the caller asked for.
//!
//! Binary mode hands the bytes straight back. Every other mode tries the
//! configured [`ArtifactStore`] first and, on any failure, returns the image
//! inline as a data URL. The fallback is a normal success, not an error: the
//! caller can tell which form it received from [`OutputArtifact::mode`].

use crate::config::RenderConfig;
use crate::pipeline::encode::to_data_url;
use crate::request::ReturnMode;
use crate::storage::ArtifactStore;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub const PNG_MIME: &str = "image/png";

const MAX_STEM_LEN: usize = 64;

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// How a binary artifact should be presented by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    /// `Content-Disposition` header value for `filename`.
    pub fn header_value(self, filename: &str) -> String {
        let kind = match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        };
        format!("{kind}; filename=\"{filename}\"")
    }
}

/// The one form in which a rendered card is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputArtifact {
    Binary {
        bytes: Vec<u8>,
        filename: String,
        disposition: Disposition,
    },
    Inline {
        data_url: String,
        filename: String,
    },
    Stored {
        url: String,
        filename: String,
    },
}

impl OutputArtifact {
    pub fn filename(&self) -> &str {
        match self {
            OutputArtifact::Binary { filename, .. }
            | OutputArtifact::Inline { filename, .. }
            | OutputArtifact::Stored { filename, .. } => filename,
        }
    }

    /// Wire name of the delivered form: `binary`, `dataUrl` or `url`.
    pub fn mode(&self) -> &'static str {
        match self {
            OutputArtifact::Binary { .. } => "binary",
            OutputArtifact::Inline { .. } => "dataUrl",
            OutputArtifact::Stored { .. } => "url",
        }
    }
}

/// Reduce a requested base name to `[A-Za-z0-9._-]`, drop any extension, cap
/// the length and append `.png`. Blank input yields `card-<unix-millis>.png`.
pub fn sanitize_filename(requested: Option<&str>) -> String {
    let raw = requested.unwrap_or("").trim();
    // Only the last path component counts.
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let stem = match base.rfind('.') {
        Some(dot) => &base[..dot],
        None => base,
    };

    let cleaned = RE_UNSAFE.replace_all(stem, "-");
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '.' || c == '_');
    let truncated: String = cleaned.chars().take(MAX_STEM_LEN).collect();

    if truncated.is_empty() {
        format!("card-{}.png", unix_millis())
    } else {
        format!("{truncated}.png")
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Package `png` for delivery.
pub async fn package(
    png: Vec<u8>,
    mode: ReturnMode,
    requested_name: Option<&str>,
    download: bool,
    config: &RenderConfig,
) -> OutputArtifact {
    let filename = sanitize_filename(requested_name);

    match mode {
        ReturnMode::Binary => OutputArtifact::Binary {
            bytes: png,
            filename,
            disposition: if download {
                Disposition::Attachment
            } else {
                Disposition::Inline
            },
        },
        ReturnMode::Json => store_or_inline(png, filename, config.store.as_ref()).await,
    }
}

async fn store_or_inline(png: Vec<u8>, filename: String, store: &dyn ArtifactStore) -> OutputArtifact {
    match store.put(&filename, &png, PNG_MIME).await {
        Ok(url) => {
            info!("Stored {} via {} store", filename, store.name());
            OutputArtifact::Stored { url, filename }
        }
        Err(e) => {
            warn!("Storage unavailable ({}), returning inline data URL: {}", store.name(), e);
            OutputArtifact::Inline {
                data_url: to_data_url(PNG_MIME, &png),
                filename,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStore;
    use std::sync::Arc;

    #[test]
    fn filename_is_sanitized() {
        assert_eq!(sanitize_filename(Some("My Card!.jpeg")), "My-Card.png");
        assert_eq!(sanitize_filename(Some("../../etc/passwd")), "passwd.png");
        assert_eq!(sanitize_filename(Some("post_01.v2.png")), "post_01.v2.png");
        assert_eq!(sanitize_filename(Some("résumé 2024")), "r-sum-2024.png");
    }

    #[test]
    fn filename_is_truncated() {
        let long = "a".repeat(200);
        let name = sanitize_filename(Some(&long));
        assert_eq!(name.len(), MAX_STEM_LEN + ".png".len());
    }

    #[test]
    fn blank_filename_is_generated() {
        for input in [None, Some(""), Some("   "), Some("!!!"), Some(".png")] {
            let name = sanitize_filename(input);
            assert!(name.starts_with("card-"), "{name}");
            assert!(name.ends_with(".png"), "{name}");
        }
    }

    #[test]
    fn disposition_header() {
        assert_eq!(
            Disposition::Attachment.header_value("a.png"),
            "attachment; filename=\"a.png\""
        );
        assert_eq!(Disposition::Inline.header_value("a.png"), "inline; filename=\"a.png\"");
    }

    #[tokio::test]
    async fn binary_mode_returns_bytes() {
        let config = RenderConfig::default();
        let out = package(vec![1, 2, 3], ReturnMode::Binary, Some("x"), true, &config).await;
        assert_eq!(
            out,
            OutputArtifact::Binary {
                bytes: vec![1, 2, 3],
                filename: "x.png".into(),
                disposition: Disposition::Attachment,
            }
        );
        assert_eq!(out.mode(), "binary");
    }

    #[tokio::test]
    async fn disabled_store_falls_back_to_inline() {
        let config = RenderConfig::default();
        let out = package(vec![9], ReturnMode::Json, Some("fallback"), false, &config).await;
        match &out {
            OutputArtifact::Inline { data_url, filename } => {
                assert!(data_url.starts_with("data:image/png;base64,"));
                assert_eq!(filename, "fallback.png");
            }
            other => panic!("expected inline, got {other:?}"),
        }
        assert_eq!(out.mode(), "dataUrl");
    }

    #[tokio::test]
    async fn working_store_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::builder()
            .store(Arc::new(FsStore::new(dir.path(), "https://cdn.test")))
            .build()
            .unwrap();
        let out = package(vec![7, 7], ReturnMode::Json, Some("stored"), false, &config).await;
        assert_eq!(
            out,
            OutputArtifact::Stored {
                url: "https://cdn.test/stored.png".into(),
                filename: "stored.png".into(),
            }
        );
        assert_eq!(std::fs::read(dir.path().join("stored.png")).unwrap(), vec![7, 7]);
    }

    #[tokio::test]
    async fn failing_store_falls_back_to_inline() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the store expects a directory makes every write fail.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let config = RenderConfig::builder()
            .store(Arc::new(FsStore::new(&blocker, "https://cdn.test")))
            .build()
            .unwrap();
        let out = package(vec![1], ReturnMode::Json, None, false, &config).await;
        assert_eq!(out.mode(), "dataUrl");
    }
}
