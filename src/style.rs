//! Layout variants, their configuration table, and the auto-resolution rules.
//!
//! Every variant is one row of [`StyleSpec`] data consumed by a single
//! template; nothing about a style lives in hand-written markup. Auto
//! resolution is likewise data: an ordered [`AUTO_RULES`] list where the
//! first matching rule wins.

use crate::config::RenderConfig;
use crate::error::CardError;
use crate::request::RenderRequest;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of card layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    PhotoCaption,
    Quote,
    TitleOnly,
    NotesCover,
    Cta,
    MarkdownNote,
}

/// How the media element fills its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    Cover,
    Contain,
}

/// What the bottom row of a card shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooterKind {
    /// Identity handle on the left, page index on the right.
    Stamp,
    /// Two action labels (e.g. "Save" / "Share").
    Actions,
}

/// One row of the style-configuration table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleSpec {
    pub width: u32,
    pub height: u32,
    pub fit: Fit,
    pub has_media: bool,
    pub footer: FooterKind,
    /// Primary text size in px at font scale 1.0.
    pub primary_font_px: f32,
    pub text_align: &'static str,
    pub background: &'static str,
    pub ink: &'static str,
    pub accent: &'static str,
}

const PAPER: &str = "#F7F3E8";
const INK: &str = "#111111";

static SPECS: [(Style, StyleSpec); 6] = [
    (
        Style::PhotoCaption,
        StyleSpec {
            width: 1080,
            height: 1350,
            fit: Fit::Cover,
            has_media: true,
            footer: FooterKind::Stamp,
            primary_font_px: 54.0,
            text_align: "center",
            background: PAPER,
            ink: INK,
            accent: "#E4572E",
        },
    ),
    (
        Style::Quote,
        StyleSpec {
            width: 1080,
            height: 1350,
            fit: Fit::Contain,
            has_media: false,
            footer: FooterKind::Actions,
            primary_font_px: 58.0,
            text_align: "left",
            background: PAPER,
            ink: INK,
            accent: "#E4572E",
        },
    ),
    (
        Style::TitleOnly,
        StyleSpec {
            width: 1080,
            height: 1350,
            fit: Fit::Contain,
            has_media: false,
            footer: FooterKind::Stamp,
            primary_font_px: 88.0,
            text_align: "left",
            background: "#111111",
            ink: "#F7F3E8",
            accent: "#FFC857",
        },
    ),
    (
        Style::NotesCover,
        StyleSpec {
            width: 1080,
            height: 1350,
            fit: Fit::Contain,
            has_media: false,
            footer: FooterKind::Stamp,
            primary_font_px: 76.0,
            text_align: "left",
            background: "#FFF8D6",
            ink: INK,
            accent: "#2E86AB",
        },
    ),
    (
        Style::Cta,
        StyleSpec {
            width: 1080,
            height: 1350,
            fit: Fit::Contain,
            has_media: false,
            footer: FooterKind::Actions,
            primary_font_px: 60.0,
            text_align: "center",
            background: "#1B1B3A",
            ink: "#FFFFFF",
            accent: "#FFC857",
        },
    ),
    (
        Style::MarkdownNote,
        StyleSpec {
            width: 1080,
            height: 1350,
            fit: Fit::Contain,
            has_media: false,
            footer: FooterKind::Actions,
            primary_font_px: 40.0,
            text_align: "left",
            background: PAPER,
            ink: INK,
            accent: "#2E86AB",
        },
    ),
];

impl Style {
    pub const ALL: [Style; 6] = [
        Style::PhotoCaption,
        Style::Quote,
        Style::TitleOnly,
        Style::NotesCover,
        Style::Cta,
        Style::MarkdownNote,
    ];

    /// Wire identifier, e.g. `photo_caption`.
    pub fn as_str(self) -> &'static str {
        match self {
            Style::PhotoCaption => "photo_caption",
            Style::Quote => "quote",
            Style::TitleOnly => "title_only",
            Style::NotesCover => "notes_cover",
            Style::Cta => "cta",
            Style::MarkdownNote => "markdown_note",
        }
    }

    /// Parse an explicit identifier. Case-insensitive; `-` is accepted for `_`.
    pub fn parse(id: &str) -> Option<Style> {
        let id = id.trim().to_ascii_lowercase().replace('-', "_");
        Style::ALL.into_iter().find(|s| s.as_str() == id)
    }

    /// This style's row of the configuration table.
    pub fn spec(self) -> &'static StyleSpec {
        // SPECS has exactly one row per variant.
        SPECS
            .iter()
            .find(|(s, _)| *s == self)
            .map(|(_, spec)| spec)
            .unwrap_or(&SPECS[0].1)
    }

    fn expected_list() -> String {
        Style::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Fit {
    pub fn parse(s: &str) -> Option<Fit> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" => Some(Fit::Cover),
            "contain" => Some(Fit::Contain),
            _ => None,
        }
    }

    pub fn as_css(self) -> &'static str {
        match self {
            Fit::Cover => "cover",
            Fit::Contain => "contain",
        }
    }
}

// ── Auto resolution ──────────────────────────────────────────────────────

/// One entry of the ordered auto-resolution chain.
#[derive(Clone, Copy)]
pub struct AutoRule {
    pub name: &'static str,
    pub style: Style,
    pub applies: fn(&RenderRequest, &RenderConfig) -> bool,
}

impl fmt::Debug for AutoRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoRule")
            .field("name", &self.name)
            .field("style", &self.style)
            .finish()
    }
}

/// Rules evaluated in order by [`resolve_style`]; the last one always applies.
pub static AUTO_RULES: &[AutoRule] = &[
    AutoRule {
        name: "cta_button",
        style: Style::Cta,
        applies: has_cta_button,
    },
    AutoRule {
        name: "image_present",
        style: Style::PhotoCaption,
        applies: has_image,
    },
    AutoRule {
        name: "short_or_blockquote",
        style: Style::Quote,
        applies: is_short_or_blockquote,
    },
    AutoRule {
        name: "fallback",
        style: Style::Quote,
        applies: always,
    },
];

static RE_BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s{0,3}>").unwrap());

fn has_cta_button(req: &RenderRequest, _config: &RenderConfig) -> bool {
    !req.cta_button_text.trim().is_empty()
}

fn has_image(req: &RenderRequest, config: &RenderConfig) -> bool {
    let url = req.image_url.trim();
    !url.is_empty() && url.len() >= config.min_image_url_len && !has_cta_button(req, config)
}

fn is_short_or_blockquote(req: &RenderRequest, config: &RenderConfig) -> bool {
    let text = if req.body.trim().is_empty() {
        &req.caption
    } else {
        &req.body
    };
    RE_BLOCKQUOTE.is_match(text) || text.split_whitespace().count() < config.quote_word_threshold
}

fn always(_req: &RenderRequest, _config: &RenderConfig) -> bool {
    true
}

/// Resolve the layout for a request.
///
/// An explicit identifier must name a known style; `"auto"`, blank or absent
/// runs [`AUTO_RULES`] in order.
pub fn resolve_style(req: &RenderRequest, config: &RenderConfig) -> Result<Style, CardError> {
    match req.style.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() && !id.eq_ignore_ascii_case("auto") => {
            Style::parse(id).ok_or_else(|| CardError::UnknownStyle {
                style: id.to_string(),
                expected: Style::expected_list(),
            })
        }
        _ => Ok(auto_style(req, config)),
    }
}

fn auto_style(req: &RenderRequest, config: &RenderConfig) -> Style {
    AUTO_RULES
        .iter()
        .find(|rule| (rule.applies)(req, config))
        .map(|rule| {
            tracing::debug!("auto style: rule '{}' → {}", rule.name, rule.style);
            rule.style
        })
        .unwrap_or(Style::Quote)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> RenderRequest {
        RenderRequest::default()
    }

    #[test]
    fn explicit_styles_resolve_to_themselves() {
        let config = RenderConfig::default();
        for style in Style::ALL {
            let r = RenderRequest {
                style: Some(style.as_str().to_string()),
                cta_button_text: "Buy".into(),
                ..req()
            };
            assert_eq!(resolve_style(&r, &config).unwrap(), style);
        }
    }

    #[test]
    fn explicit_style_is_case_and_dash_insensitive() {
        let config = RenderConfig::default();
        let r = RenderRequest {
            style: Some("Photo-Caption".into()),
            ..req()
        };
        assert_eq!(resolve_style(&r, &config).unwrap(), Style::PhotoCaption);
    }

    #[test]
    fn unknown_style_is_rejected() {
        let config = RenderConfig::default();
        let r = RenderRequest {
            style: Some("poster".into()),
            ..req()
        };
        let err = resolve_style(&r, &config).unwrap_err();
        assert!(matches!(err, CardError::UnknownStyle { .. }));
    }

    #[test]
    fn auto_prefers_cta_over_image() {
        let config = RenderConfig::default();
        let r = RenderRequest {
            style: Some("auto".into()),
            image_url: "https://img.test/photo.jpg".into(),
            cta_button_text: "Subscribe".into(),
            ..req()
        };
        assert_eq!(resolve_style(&r, &config).unwrap(), Style::Cta);
    }

    #[test]
    fn auto_image_without_cta_is_photo_caption() {
        let config = RenderConfig::default();
        let r = RenderRequest {
            image_url: "https://img.test/photo.jpg".into(),
            caption: "Hello".into(),
            ..req()
        };
        assert_eq!(resolve_style(&r, &config).unwrap(), Style::PhotoCaption);
    }

    #[test]
    fn auto_ignores_too_short_image_url() {
        let config = RenderConfig::default();
        let r = RenderRequest {
            image_url: "x.jpg".into(),
            ..req()
        };
        assert_eq!(resolve_style(&r, &config).unwrap(), Style::Quote);
    }

    #[test]
    fn auto_short_text_is_quote() {
        let config = RenderConfig::default();
        let r = RenderRequest {
            body: "Ship small, ship often.".into(),
            ..req()
        };
        assert_eq!(resolve_style(&r, &config).unwrap(), Style::Quote);
    }

    #[test]
    fn blockquote_marker_matches_rule() {
        let config = RenderConfig::default();
        let long = "word ".repeat(100);
        let r = RenderRequest {
            body: format!("{long}\n> quoted line"),
            ..req()
        };
        assert!(is_short_or_blockquote(&r, &config));
        let plain = RenderRequest { body: long, ..req() };
        assert!(!is_short_or_blockquote(&plain, &config));
        // Long text without a marker still lands on quote through the fallback.
        assert_eq!(resolve_style(&plain, &config).unwrap(), Style::Quote);
    }

    #[test]
    fn rule_order_is_stable() {
        let names: Vec<_> = AUTO_RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            ["cta_button", "image_present", "short_or_blockquote", "fallback"]
        );
    }

    #[test]
    fn every_style_has_a_spec_row() {
        for style in Style::ALL {
            assert!(SPECS.iter().any(|(s, _)| *s == style), "{style} missing");
        }
        assert_eq!(Style::PhotoCaption.spec().fit, Fit::Cover);
        assert_eq!(Style::Cta.spec().footer, FooterKind::Actions);
    }
}
