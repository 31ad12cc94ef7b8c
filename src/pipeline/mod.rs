//! Pipeline stages for request-to-card rendering.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the engine can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ sanitize ─┐
//! request ───┤             ├─▶ template ──▶ engine ──▶ package
//!            └─▶ fetch ────┘   (HTML doc)   (Chrome)   (bytes / URL / data URL)
//! ```
//!
//! 1. [`sanitize`]: restricted Markdown and plain-text escaping; cannot fail
//! 2. [`fetch`]: normalise share links, download and inline the image;
//!    failures degrade to the direct URL
//! 3. [`template`]: one slot-based layout driven by the style table
//! 4. [`engine`]: headless Chrome lifecycle; runs in `spawn_blocking`
//!    because the DevTools client is synchronous
//! 5. [`encode`]: data-URL encoding and PNG dimension probing
//! 6. [`package`]: binary, stored URL, or inline fallback

pub mod encode;
pub mod engine;
pub mod fetch;
pub mod package;
pub mod sanitize;
pub mod template;
