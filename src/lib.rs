//! # card-render
//!
//! Render templated social-media cards (photo + caption, quote, call to
//! action, notes) to PNG with headless Chrome.
//!
//! ## Why a real browser?
//!
//! Card layouts lean on CSS that hand-rolled rasterisers get wrong: web
//! fonts, `object-fit`, line clamping and Markdown-derived inline markup.
//! Rendering the composed HTML in Chrome gives pixel output identical to
//! what a designer previews, at any device scale factor.
//!
//! ## Pipeline Overview
//!
//! ```text
//! RenderRequest (JSON)
//!  │
//!  ├─ 1. Style     explicit id or first matching auto rule
//!  ├─ 2. Sanitize  restricted Markdown → allow-listed HTML
//!  ├─ 3. Fetch     share-link normalisation, inline image as data URL
//!  ├─ 4. Template  one slot-based layout driven by the style table
//!  ├─ 5. Engine    launch → load → await media → capture (spawn_blocking)
//!  └─ 6. Package   PNG bytes, stored URL, or inline data URL fallback
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use card_render::{render_card, RenderConfig, RenderRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let req: RenderRequest = serde_json::from_str(
//!         r#"{ "style": "quote", "quote": "Ship small, ship often." }"#,
//!     )?;
//!     let output = render_card(&req, &RenderConfig::default()).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.envelope())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | axum router exposing `POST /api/render` |
//! | `cli`    | on      | Enables the `card-render` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! card-render = { version = "0.3", default-features = false }
//! ```
//!
//! ## Styles
//!
//! | Id              | Media | Footer  |
//! |-----------------|-------|---------|
//! | `photo_caption` | yes   | stamp   |
//! | `quote`         | no    | actions |
//! | `cta`           | no    | actions |
//! | `title_only`    | no    | stamp   |
//! | `notes_cover`   | no    | stamp   |
//! | `markdown_note` | no    | actions |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod card;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;
pub mod style;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use card::{prepare_card, render_card, render_card_sync, render_card_to_file, CardEnvelope, CardOutput, PreparedCard};
pub use config::{RenderConfig, RenderConfigBuilder};
pub use error::{CardError, FetchError, StoreError};
pub use pipeline::package::OutputArtifact;
pub use request::{RenderRequest, ReturnMode};
pub use storage::{ArtifactStore, BlobStore, DisabledStore, FsStore};
pub use style::{resolve_style, Fit, Style};
