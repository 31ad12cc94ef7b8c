//! Content sanitising: untrusted request text → markup safe to embed verbatim.
//!
//! Two modes exist:
//!
//! * **Markdown** ([`markdown`]): comrak renders a restricted subset (no
//!   autolinks, soft breaks kept as `<br>`), raw HTML in the source is reduced
//!   to its text content, and ammonia applies the final allow-list.
//! * **Plain text** ([`plain`]): entity escaping only, for stamps and titles.
//!
//! Neither mode can fail. The worst case is an empty fragment.

use crate::request::RenderRequest;
use ammonia::{Builder as AmmoniaBuilder, UrlRelative};
use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use comrak::options::Options;
use comrak::{format_html, parse_document, Arena};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::warn;

/// A markup fragment that has passed through one of the sanitisers.
///
/// The only constructors are [`markdown`], [`plain`] and [`SafeHtml::empty`],
/// so holding one is proof the content is safe to splice into a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SafeHtml(String);

impl SafeHtml {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every text field of a request, sanitised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedContent {
    pub caption: SafeHtml,
    pub title: SafeHtml,
    pub body: SafeHtml,
    pub quote: SafeHtml,
    pub cta_text: SafeHtml,
    pub cta_button: SafeHtml,
    pub cta_url: SafeHtml,
    pub handle: SafeHtml,
    pub page_no: SafeHtml,
}

impl SanitizedContent {
    /// Sanitise all text slots of `req`. Markdown is allowed in the long-form
    /// fields; labels, stamps and titles are escaped as plain text.
    pub fn from_request(req: &RenderRequest, handle: &str, page_no: &str) -> Self {
        Self {
            caption: markdown(&req.caption),
            title: plain(&req.title),
            body: markdown(&req.body),
            quote: markdown(&req.quote),
            cta_text: markdown(&req.cta_text),
            cta_button: plain(&req.cta_button_text),
            cta_url: plain(&req.cta_url),
            handle: plain(handle),
            page_no: plain(page_no),
        }
    }
}

// ── Sanitiser configuration ──────────────────────────────────────────────

const ALLOWED_TAGS: [&str; 20] = [
    "p", "br", "strong", "b", "em", "i", "u", "s", "del", "ul", "ol", "li", "blockquote", "h1",
    "h2", "h3", "h4", "h5", "h6", "a",
];

static ALLOW_LIST: Lazy<AmmoniaBuilder<'static>> = Lazy::new(|| {
    let mut builder = AmmoniaBuilder::default();
    builder.tags(HashSet::from(ALLOWED_TAGS));
    builder.generic_attributes(HashSet::new());
    builder.tag_attributes(HashMap::from([("a", HashSet::from(["href"]))]));
    builder.url_schemes(HashSet::from(["http", "https", "mailto", "tel"]));
    // Cards have no base URL; relative and scheme-relative links go.
    builder.url_relative(UrlRelative::Deny);
    builder.strip_comments(true);
    builder
});

/// Keeps text only. `script` and `style` contents go with their tags.
static TEXT_ONLY: Lazy<AmmoniaBuilder<'static>> = Lazy::new(|| {
    let mut builder = AmmoniaBuilder::default();
    builder.tags(HashSet::new());
    builder
});

fn markdown_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.autolink = false;
    ext.strikethrough = true;
    ext.underline = true;
    ext.tagfilter = false;

    let render = &mut options.render;
    render.hardbreaks = true;
    // Raw HTML nodes are rewritten before formatting; see `neutralise_raw_html`.
    render.r#unsafe = true;
    options
}

// ── Public API ───────────────────────────────────────────────────────────

/// Render restricted Markdown and filter it through the allow-list.
pub fn markdown(input: &str) -> SafeHtml {
    if input.trim().is_empty() {
        return SafeHtml::empty();
    }

    let options = markdown_options();
    let arena = Arena::new();
    let root = parse_document(&arena, input, &options);
    neutralise_raw_html(root);

    let mut html = String::new();
    if let Err(err) = format_html(root, &options, &mut html) {
        warn!("Markdown formatting failed, dropping fragment: {}", err);
        return SafeHtml::empty();
    }

    SafeHtml(ALLOW_LIST.clean(&html).to_string().trim().to_string())
}

/// Escape `input` for use as text content. No Markdown is interpreted.
pub fn plain(input: &str) -> SafeHtml {
    SafeHtml(ammonia::clean_text(input.trim()))
}

/// Replace every raw HTML node with the text it contains, escaped.
///
/// Raw HTML must not reach the output as markup, but the words around a
/// stripped tag (`<script>…</script>hi`) are content and are kept.
fn neutralise_raw_html<'a>(root: &'a AstNode<'a>) {
    for node in root.descendants() {
        let mut data = node.data.borrow_mut();
        let replacement = match &data.value {
            NodeValue::HtmlBlock(block) => {
                let text = text_of(&block.literal);
                Some(NodeValue::HtmlBlock(NodeHtmlBlock {
                    block_type: 0,
                    literal: if text.is_empty() {
                        String::new()
                    } else {
                        format!("<p>{text}</p>\n")
                    },
                }))
            }
            NodeValue::HtmlInline(literal) => Some(NodeValue::HtmlInline(text_of(literal))),
            _ => None,
        };
        if let Some(value) = replacement {
            data.value = value;
        }
    }
}

fn text_of(raw_html: &str) -> String {
    TEXT_ONLY.clean(raw_html).to_string().trim().to_string()
}
