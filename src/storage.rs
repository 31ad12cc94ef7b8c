//! Durable artifact storage.
//!
//! The renderer never depends on a concrete backend: it talks to an
//! [`ArtifactStore`] handed in through [`crate::RenderConfig`]. When the store
//! is disabled or an upload fails, the output packager falls back to an
//! inline data URL (see [`crate::pipeline::package`]).

use crate::error::StoreError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// A place that can keep a rendered PNG and hand back a public URL for it.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` under `filename` and return its public URL.
    async fn put(
        &self,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

// ── Disabled ─────────────────────────────────────────────────────────────

/// The default store: refuses every upload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

#[async_trait]
impl ArtifactStore for DisabledStore {
    async fn put(&self, _: &str, _: &[u8], _: &str) -> Result<String, StoreError> {
        Err(StoreError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

// ── Filesystem ───────────────────────────────────────────────────────────

/// Writes artifacts into a directory that some web server exposes at
/// `public_base_url`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn put(
        &self,
        filename: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_err(&self.root))?;

        // Write beside the target then rename, so readers never see a partial file.
        let target = self.root.join(filename);
        let partial = self.root.join(format!(".{filename}.part"));
        tokio::fs::write(&partial, bytes)
            .await
            .map_err(io_err(&partial))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(io_err(&target))?;

        debug!("Stored {} bytes at {}", bytes.len(), target.display());
        Ok(format!("{}/{}", self.public_base_url, filename))
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.display().to_string();
    move |source| StoreError::Io { path, source }
}

// ── Remote blob service ──────────────────────────────────────────────────

/// Uploads artifacts to an HTTP blob service with a bearer token.
///
/// The object is `PUT` to `{endpoint}/{filename}`; the service answers with
/// JSON containing the public `url`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    url: String,
}

impl BlobStore {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Result<Self, StoreError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Upload {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            endpoint,
            token: token.into(),
            client,
        })
    }

    fn upload_error(&self, reason: impl ToString) -> StoreError {
        StoreError::Upload {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for BlobStore {
    async fn put(
        &self,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let target = format!("{}/{}", self.endpoint, filename);
        let response = self
            .client
            .put(&target)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.upload_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.upload_error(format!("HTTP {status}")));
        }

        let body: BlobResponse = response.json().await.map_err(|e| self.upload_error(e))?;
        if body.url.trim().is_empty() {
            return Err(self.upload_error("response carried an empty url"));
        }

        info!("Uploaded {} ({} bytes)", filename, bytes.len());
        Ok(body.url)
    }

    fn name(&self) -> &'static str {
        "blob"
    }
}
