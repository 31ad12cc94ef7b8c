//! Image acquisition: normalise a share link, fetch it, inline it.
//!
//! ## Why inline?
//!
//! The engine loads the composed document from memory. Embedding the image as
//! a data URL means the capture never waits on, or races with, a third-party
//! host. When the server-side fetch fails the template falls back to the
//! normalised URL and the engine makes a best-effort attempt of its own.

use crate::config::RenderConfig;
use crate::error::FetchError;
use crate::pipeline::encode::to_data_url;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// An image ready to be embedded in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: String,
    pub data_url: String,
}

/// What happened when the image was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The request carried no usable image URL.
    Skipped,
    /// Bytes were downloaded and inlined as a data URL of `encoded_len` bytes.
    Inlined { encoded_len: usize },
    /// The download failed; the normalised URL is used as-is.
    Failed(FetchError),
}

/// The card image, in whatever form could be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub original_url: String,
    pub normalized_url: String,
    pub inline: Option<InlineImage>,
    pub outcome: FetchOutcome,
}

impl ImageAsset {
    /// An asset for a request without an image.
    pub fn none() -> Self {
        Self {
            original_url: String::new(),
            normalized_url: String::new(),
            inline: None,
            outcome: FetchOutcome::Skipped,
        }
    }

    /// The single source the template should reference: the inlined data URL
    /// when available, otherwise the normalised http(s) URL, otherwise nothing.
    pub fn render_source(&self) -> Option<&str> {
        if let Some(inline) = &self.inline {
            return Some(&inline.data_url);
        }
        if is_http_url(&self.normalized_url) {
            Some(&self.normalized_url)
        } else {
            None
        }
    }
}

/// Check whether a string is an absolute http(s) URL.
pub fn is_http_url(input: &str) -> bool {
    Url::parse(input)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

// ── Normalisation ────────────────────────────────────────────────────────

/// Rewrite known cloud share links to their direct-content form.
///
/// Dropbox preview links move to `dl.dropboxusercontent.com` with `raw=1` and
/// without `dl`. Google Drive file-view links become
/// `uc?export=download&id=<ID>`. Anything else, including strings that do not
/// parse as URLs, is returned trimmed but otherwise unchanged.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    match url.host_str() {
        Some("dropbox.com" | "www.dropbox.com") => normalize_dropbox(url),
        Some("drive.google.com") => {
            normalize_drive(&url).unwrap_or_else(|| trimmed.to_string())
        }
        _ => trimmed.to_string(),
    }
}

fn normalize_dropbox(mut url: Url) -> String {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "dl" && k != "raw")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Setting a host on an http(s) URL cannot fail.
    let _ = url.set_host(Some("dl.dropboxusercontent.com"));
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        query.append_pair("raw", "1");
    }
    url.to_string()
}

fn normalize_drive(url: &Url) -> Option<String> {
    let from_path = url
        .path_segments()
        .and_then(|mut segs| match (segs.next(), segs.next(), segs.next()) {
            (Some("file"), Some("d"), Some(id)) if !id.is_empty() => Some(id.to_string()),
            _ => None,
        });
    let id = from_path.or_else(|| {
        (url.path() == "/open")
            .then(|| url.query_pairs().find(|(k, _)| k == "id"))
            .flatten()
            .map(|(_, v)| v.into_owned())
            .filter(|id| !id.is_empty())
    })?;

    let mut direct = Url::parse("https://drive.google.com/uc").ok()?;
    direct
        .query_pairs_mut()
        .append_pair("export", "download")
        .append_pair("id", &id);
    Some(direct.to_string())
}

// ── MIME ─────────────────────────────────────────────────────────────────

/// Decide the image MIME type: the declared content type wins when it is an
/// image type; otherwise the URL's extension picks png, webp or jpeg.
pub fn detect_mime(declared: Option<&str>, url: &str) -> String {
    if let Some(ct) = declared {
        let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if essence.starts_with("image/") {
            return essence;
        }
    }

    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    if path.ends_with(".png") {
        "image/png".into()
    } else if path.ends_with(".webp") {
        "image/webp".into()
    } else {
        "image/jpeg".into()
    }
}

// ── Fetch ────────────────────────────────────────────────────────────────

/// Resolve the request's image URL into an [`ImageAsset`].
///
/// Never fails: every problem is recorded in [`ImageAsset::outcome`].
pub async fn acquire_image(image_url: &str, config: &RenderConfig) -> ImageAsset {
    let original = image_url.trim();
    if original.is_empty() {
        return ImageAsset::none();
    }

    let normalized = normalize_url(original);
    if normalized != original {
        debug!("Normalised image URL {} → {}", original, normalized);
    }

    let (inline, outcome) = match fetch_image(&normalized, config).await {
        Ok(inline) => {
            let encoded_len = inline.data_url.len();
            (Some(inline), FetchOutcome::Inlined { encoded_len })
        }
        Err(e) => {
            warn!("Image fetch failed, falling back to direct URL: {}", e);
            (None, FetchOutcome::Failed(e))
        }
    };

    ImageAsset {
        original_url: original.to_string(),
        normalized_url: normalized,
        inline,
        outcome,
    }
}

/// Download `url` and encode it as an [`InlineImage`].
pub async fn fetch_image(url: &str, config: &RenderConfig) -> Result<InlineImage, FetchError> {
    if !is_http_url(url) {
        return Err(FetchError::UnsupportedUrl {
            url: url.to_string(),
        });
    }

    info!("Fetching image: {}", url);
    let transport = |e: reqwest::Error| FetchError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch_timeout_secs))
        .user_agent(config.user_agent.as_str())
        .default_headers(fetch_headers())
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(transport)?;

    let mut response = client.get(url).send().await.map_err(transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let declared = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let limit = config.max_image_bytes;
    let too_large = || FetchError::TooLarge {
        url: url.to_string(),
        limit,
    };
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(too_large());
    }

    // Content-Length may be absent or wrong, so the cap is enforced per chunk too.
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transport)? {
        if bytes.len() + chunk.len() > limit {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }
    if bytes.is_empty() {
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }

    let mime = detect_mime(declared.as_deref(), url);
    debug!("Fetched {} bytes ({})", bytes.len(), mime);

    Ok(InlineImage {
        data_url: to_data_url(&mime, &bytes),
        mime,
    })
}

fn fetch_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://example.com/a.jpg"));
        assert!(is_http_url("http://example.com/a.jpg"));
        assert!(!is_http_url("ftp://example.com/a.jpg"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("/tmp/a.jpg"));
        assert!(!is_http_url(""));
    }

    #[test]
    fn dropbox_preview_becomes_direct_content() {
        let out = normalize_url("https://www.dropbox.com/s/abc123/photo.jpg?dl=0");
        let url = Url::parse(&out).unwrap();
        assert_eq!(url.host_str(), Some("dl.dropboxusercontent.com"));
        assert_eq!(url.path(), "/s/abc123/photo.jpg");
        let pairs: Vec<_> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("raw".into(), "1".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "dl"));
    }

    #[test]
    fn dropbox_keeps_other_query_pairs() {
        let out = normalize_url("https://dropbox.com/scl/fi/x/p.png?rlkey=k1&dl=1");
        let url = Url::parse(&out).unwrap();
        let pairs: Vec<_> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("rlkey".into(), "k1".into())));
        assert!(pairs.contains(&("raw".into(), "1".into())));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "raw").count(), 1);
    }

    #[test]
    fn drive_file_view_becomes_download() {
        let out = normalize_url("https://drive.google.com/file/d/1AbC_xyz/view?usp=sharing");
        assert_eq!(out, "https://drive.google.com/uc?export=download&id=1AbC_xyz");
    }

    #[test]
    fn drive_open_link_becomes_download() {
        let out = normalize_url("https://drive.google.com/open?id=XYZ789");
        assert_eq!(out, "https://drive.google.com/uc?export=download&id=XYZ789");
    }

    #[test]
    fn other_urls_pass_through() {
        let u = "https://images.example.com/cat.webp?w=800";
        assert_eq!(normalize_url(u), u);
        assert_eq!(normalize_url("  not a url "), "not a url");
        // Drive links without a file id are left alone.
        let folder = "https://drive.google.com/drive/folders/abc";
        assert_eq!(normalize_url(folder), folder);
    }

    #[test]
    fn mime_prefers_declared_type() {
        assert_eq!(detect_mime(Some("image/png; charset=binary"), "x.jpg"), "image/png");
        assert_eq!(detect_mime(Some("IMAGE/WEBP"), "x"), "image/webp");
    }

    #[test]
    fn mime_falls_back_to_extension() {
        assert_eq!(detect_mime(None, "https://a.test/p.PNG?x=1"), "image/png");
        assert_eq!(detect_mime(None, "https://a.test/p.webp"), "image/webp");
        assert_eq!(detect_mime(None, "https://a.test/p.gif"), "image/jpeg");
        assert_eq!(
            detect_mime(Some("application/octet-stream"), "https://a.test/p"),
            "image/jpeg"
        );
    }

    #[test]
    fn render_source_prefers_inline() {
        let mut asset = ImageAsset {
            original_url: "https://a.test/p.png".into(),
            normalized_url: "https://a.test/p.png".into(),
            inline: Some(InlineImage {
                mime: "image/png".into(),
                data_url: "data:image/png;base64,AA==".into(),
            }),
            outcome: FetchOutcome::Inlined { encoded_len: 26 },
        };
        assert_eq!(asset.render_source(), Some("data:image/png;base64,AA=="));

        asset.inline = None;
        assert_eq!(asset.render_source(), Some("https://a.test/p.png"));

        asset.normalized_url = "javascript:alert(1)".into();
        assert_eq!(asset.render_source(), None);
        assert_eq!(ImageAsset::none().render_source(), None);
    }

    #[tokio::test]
    async fn unsupported_scheme_is_not_fetched() {
        let config = RenderConfig::default();
        let asset = acquire_image("file:///etc/passwd", &config).await;
        assert!(asset.inline.is_none());
        assert!(matches!(
            asset.outcome,
            FetchOutcome::Failed(FetchError::UnsupportedUrl { .. })
        ));
        assert_eq!(asset.render_source(), None);
    }

    #[tokio::test]
    async fn blank_url_is_skipped() {
        let asset = acquire_image("   ", &RenderConfig::default()).await;
        assert_eq!(asset.outcome, FetchOutcome::Skipped);
    }
}
