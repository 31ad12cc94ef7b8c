//! Template rendering: one layout, three slots, parameterised by the style table.
//!
//! Every card is the same column: an optional **media** slot, a **primary**
//! text slot and a **footer**. What differs per style (colours, font size,
//! alignment, footer kind, whether media exists) comes from
//! [`crate::style::StyleSpec`]; which content fills the primary slot is
//! decided by [`primary_slot`].
//!
//! The output is a complete HTML document with inline CSS and a system font
//! stack, so nothing but the (already resolved) image can cause network I/O.

use crate::config::RenderConfig;
use crate::pipeline::fetch::ImageAsset;
use crate::pipeline::sanitize::{plain, SafeHtml, SanitizedContent};
use crate::request::Canvas;
use crate::style::{FooterKind, Style, StyleSpec};
use std::fmt::Write as _;

/// Attribute marking the element the engine waits on before capture.
pub const MEDIA_ATTR: &str = "data-media";

const FONT_STACK: &str = "system-ui, -apple-system, 'Segoe UI', Roboto, 'Helvetica Neue', \
Arial, 'Noto Sans', 'Liberation Sans', sans-serif";

/// A complete document bound to an exact CSS pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub html: String,
    pub width: u32,
    pub height: u32,
    /// `true` when the document contains a `[data-media]` image to wait on.
    pub has_media: bool,
}

/// Spacing and radius scale, uniformly multiplied by the font scale.
#[derive(Debug, Clone, Copy)]
struct Scale {
    xs: f32,
    sm: f32,
    md: f32,
    lg: f32,
    xl: f32,
    radius: f32,
    font: f32,
    small_font: f32,
}

impl Scale {
    fn new(spec: &StyleSpec, factor: f32) -> Self {
        let s = |px: f32| (px * factor * 100.0).round() / 100.0;
        Self {
            xs: s(8.0),
            sm: s(16.0),
            md: s(32.0),
            lg: s(48.0),
            xl: s(72.0),
            radius: s(28.0),
            font: s(spec.primary_font_px),
            small_font: s(30.0),
        }
    }
}

/// Compose the document for `style` from sanitised content and the image asset.
pub fn compose_document(
    style: Style,
    canvas: &Canvas,
    content: &SanitizedContent,
    asset: &ImageAsset,
    config: &RenderConfig,
) -> RenderedDocument {
    let spec = style.spec();
    let scale = Scale::new(spec, canvas.font_scale);

    let (media, has_media) = if spec.has_media {
        media_slot(asset, canvas)
    } else {
        (String::new(), false)
    };
    let primary = primary_slot(style, content);
    let footer = footer_slot(spec.footer, content, config);

    let mut html = String::with_capacity(4096 + media.len());
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(
        html,
        "<meta name=\"viewport\" content=\"width={}, height={}\">",
        canvas.width, canvas.height
    );
    html.push_str("<style>\n");
    html.push_str(&stylesheet(style, spec, canvas, &scale));
    html.push_str("</style>\n</head>\n<body>\n");
    let _ = writeln!(
        html,
        "<main class=\"card card--{}{}\">",
        style.as_str(),
        if spec.has_media { " card--media" } else { "" }
    );
    html.push_str(&media);
    let _ = writeln!(html, "<section class=\"primary\">{primary}</section>");
    html.push_str(&footer);
    html.push_str("</main>\n</body>\n</html>\n");

    RenderedDocument {
        html,
        width: canvas.width,
        height: canvas.height,
        has_media,
    }
}

// ── Slots ────────────────────────────────────────────────────────────────

fn media_slot(asset: &ImageAsset, canvas: &Canvas) -> (String, bool) {
    match asset.render_source() {
        Some(src) => (
            format!(
                "<figure class=\"media\"><img {MEDIA_ATTR} alt=\"\" src=\"{}\" style=\"object-fit:{}\"></figure>\n",
                escape_attr(src),
                canvas.fit.as_css()
            ),
            true,
        ),
        None => (
            "<figure class=\"media media--placeholder\" aria-hidden=\"true\"></figure>\n".to_string(),
            false,
        ),
    }
}

/// Pick and arrange the primary-slot content for `style`.
pub fn primary_slot(style: Style, c: &SanitizedContent) -> String {
    match style {
        Style::PhotoCaption => first_of(&[&c.caption]).map_or_else(
            || paragraph(&c.title),
            |caption| div("text", caption.as_str()),
        ),
        Style::Quote => {
            let text = first_of(&[&c.quote, &c.body, &c.caption])
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| paragraph(&c.title));
            format!("<blockquote class=\"quote\">{text}</blockquote>")
        }
        Style::TitleOnly => {
            if c.title.is_empty() {
                div("headline", c.caption.as_str())
            } else {
                format!("<h1 class=\"headline\">{}</h1>", c.title)
            }
        }
        Style::NotesCover => {
            let mut out = format!("<h1 class=\"headline\">{}</h1>", c.title);
            if let Some(sub) = first_of(&[&c.body, &c.caption]) {
                out.push_str(&div("subtitle", sub.as_str()));
            }
            out
        }
        Style::Cta => {
            let mut out = div("text", c.cta_text.as_str());
            if !c.cta_button.is_empty() {
                let _ = write!(out, "<div class=\"button\">{}</div>", c.cta_button);
            }
            if !c.cta_url.is_empty() {
                let _ = write!(out, "<div class=\"link\">{}</div>", c.cta_url);
            }
            out
        }
        Style::MarkdownNote => {
            let mut out = String::new();
            if !c.title.is_empty() {
                let _ = write!(out, "<h2 class=\"note-title\">{}</h2>", c.title);
            }
            if let Some(body) = first_of(&[&c.body, &c.caption]) {
                out.push_str(&div("text", body.as_str()));
            }
            out
        }
    }
}

fn footer_slot(kind: FooterKind, c: &SanitizedContent, config: &RenderConfig) -> String {
    let (left, right) = match kind {
        FooterKind::Stamp => (c.handle.clone(), c.page_no.clone()),
        FooterKind::Actions => (plain(&config.footer_labels.0), plain(&config.footer_labels.1)),
    };
    let class = match kind {
        FooterKind::Stamp => "footer footer--stamp",
        FooterKind::Actions => "footer footer--actions",
    };
    format!("<footer class=\"{class}\"><span>{left}</span><span>{right}</span></footer>\n")
}

fn first_of<'a>(candidates: &[&'a SafeHtml]) -> Option<&'a SafeHtml> {
    candidates.iter().copied().find(|c| !c.is_empty())
}

fn div(class: &str, inner: &str) -> String {
    format!("<div class=\"{class}\">{inner}</div>")
}

fn paragraph(text: &SafeHtml) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("<p>{text}</p>")
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

// ── Stylesheet ───────────────────────────────────────────────────────────

fn stylesheet(style: Style, spec: &StyleSpec, canvas: &Canvas, s: &Scale) -> String {
    let mut css = String::with_capacity(2048);
    let _ = write!(
        css,
        "*{{box-sizing:border-box;margin:0;padding:0}}\n\
html,body{{width:{w}px;height:{h}px;overflow:hidden}}\n\
body{{background:{bg};color:{ink};font-family:{FONT_STACK};-webkit-font-smoothing:antialiased;text-rendering:geometricPrecision}}\n\
.card{{display:flex;flex-direction:column;width:{w}px;height:{h}px;padding:{lg}px;gap:{md}px}}\n\
.media{{flex:1 1 auto;min-height:0;border-radius:{r}px;overflow:hidden;background:rgba(127,127,127,.15)}}\n\
.media img{{display:block;width:100%;height:100%}}\n\
.primary{{flex:{primary_flex};display:flex;flex-direction:column;justify-content:center;gap:{sm}px;\
text-align:{align};font-size:{font}px;line-height:1.3;overflow-wrap:anywhere}}\n\
.primary p+p,.primary ul,.primary ol{{margin-top:{sm}px}}\n\
.primary ul,.primary ol{{padding-left:{md}px;text-align:left}}\n\
.primary blockquote blockquote,.primary .text blockquote{{border-left:{xs}px solid {accent};padding-left:{sm}px}}\n\
.primary h1,.primary h2,.primary h3{{line-height:1.1;margin-bottom:{xs}px}}\n\
.primary a{{color:{accent};text-decoration:underline}}\n\
.headline{{font-weight:800;line-height:1.05;letter-spacing:-0.02em}}\n\
.subtitle{{font-size:.55em;opacity:.8}}\n\
.note-title{{font-size:1.3em;font-weight:800}}\n\
.footer{{display:flex;justify-content:space-between;align-items:center;font-size:{small}px;font-weight:600;opacity:.75}}\n",
        w = canvas.width,
        h = canvas.height,
        bg = spec.background,
        ink = spec.ink,
        accent = spec.accent,
        align = spec.text_align,
        primary_flex = if spec.has_media { "0 0 auto" } else { "1 1 auto" },
        xs = s.xs,
        sm = s.sm,
        md = s.md,
        lg = s.lg,
        r = s.radius,
        font = s.font,
        small = s.small_font,
    );

    match style {
        Style::Quote => {
            let _ = write!(
                css,
                ".quote{{font-weight:600}}\n\
.quote::before{{content:'\\201C';display:block;font-size:3em;line-height:.8;color:{accent};margin-bottom:{sm}px}}\n",
                accent = spec.accent,
                sm = s.sm,
            );
        }
        Style::Cta => {
            let _ = write!(
                css,
                ".primary{{align-items:center}}\n\
.text{{font-weight:700}}\n\
.button{{display:inline-block;margin-top:{md}px;padding:{sm}px {lg}px;border-radius:{xl}px;\
background:{accent};color:{bg};font-weight:800;font-size:.8em}}\n\
.link{{font-size:.45em;opacity:.7;word-break:break-all}}\n",
                accent = spec.accent,
                bg = spec.background,
                sm = s.sm,
                md = s.md,
                lg = s.lg,
                xl = s.xl,
            );
        }
        Style::NotesCover => {
            let _ = write!(
                css,
                ".card{{border-left:{md}px solid {accent}}}\n",
                accent = spec.accent,
                md = s.md,
            );
        }
        Style::PhotoCaption => {
            css.push_str(".media--placeholder{border:4px dashed rgba(127,127,127,.45)}\n");
        }
        Style::TitleOnly | Style::MarkdownNote => {}
    }
    css
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fetch::{FetchOutcome, InlineImage};
    use crate::pipeline::sanitize::markdown;
    use crate::request::RenderRequest;
    use crate::style::Fit;

    fn canvas() -> Canvas {
        Canvas {
            width: 1080,
            height: 1350,
            font_scale: 1.0,
            fit: Fit::Cover,
        }
    }

    fn content(req: &RenderRequest) -> SanitizedContent {
        SanitizedContent::from_request(req, "@me", "2/5")
    }

    fn inlined() -> ImageAsset {
        ImageAsset {
            original_url: "https://a.test/p.png".into(),
            normalized_url: "https://a.test/p.png".into(),
            inline: Some(InlineImage {
                mime: "image/png".into(),
                data_url: "data:image/png;base64,AAAA".into(),
            }),
            outcome: FetchOutcome::Inlined { encoded_len: 26 },
        }
    }

    #[test]
    fn photo_caption_with_inline_image() {
        let req = RenderRequest {
            caption: "Hello".into(),
            ..Default::default()
        };
        let doc = compose_document(
            Style::PhotoCaption,
            &canvas(),
            &content(&req),
            &inlined(),
            &RenderConfig::default(),
        );
        assert!(doc.has_media);
        assert!(doc.html.contains("data-media"));
        assert!(doc.html.contains("src=\"data:image/png;base64,AAAA\""));
        assert!(doc.html.contains("object-fit:cover"));
        assert!(doc.html.contains("Hello"));
        assert!(doc.html.contains("@me"));
        assert!(doc.html.contains("2&#47;5"));
        assert_eq!((doc.width, doc.height), (1080, 1350));
    }

    #[test]
    fn photo_caption_without_image_uses_placeholder() {
        let doc = compose_document(
            Style::PhotoCaption,
            &canvas(),
            &SanitizedContent::default(),
            &ImageAsset::none(),
            &RenderConfig::default(),
        );
        assert!(!doc.has_media);
        assert!(doc.html.contains("media--placeholder"));
        assert!(!doc.html.contains("<img"));
    }

    #[test]
    fn text_styles_have_no_media_slot() {
        for style in [Style::Quote, Style::TitleOnly, Style::Cta, Style::MarkdownNote] {
            let doc = compose_document(
                style,
                &canvas(),
                &SanitizedContent::default(),
                &inlined(),
                &RenderConfig::default(),
            );
            assert!(!doc.has_media, "{style}");
            assert!(!doc.html.contains("<figure"), "{style}");
        }
    }

    #[test]
    fn action_footer_uses_configured_labels() {
        let config = RenderConfig::builder()
            .footer_labels("Keep", "Send")
            .build()
            .unwrap();
        let doc = compose_document(
            Style::Quote,
            &canvas(),
            &SanitizedContent::default(),
            &ImageAsset::none(),
            &config,
        );
        assert!(doc.html.contains("footer--actions"));
        assert!(doc.html.contains("Keep"));
        assert!(doc.html.contains("Send"));
    }

    #[test]
    fn quote_falls_back_through_body_then_caption() {
        let c = SanitizedContent {
            caption: markdown("from caption"),
            ..Default::default()
        };
        assert!(primary_slot(Style::Quote, &c).contains("from caption"));

        let c = SanitizedContent {
            body: markdown("from body"),
            caption: markdown("from caption"),
            ..Default::default()
        };
        let slot = primary_slot(Style::Quote, &c);
        assert!(slot.contains("from body"));
        assert!(!slot.contains("from caption"));
    }

    #[test]
    fn cta_slot_has_button_and_url() {
        let req = RenderRequest {
            cta_text: "Join us".into(),
            cta_button_text: "Sign up".into(),
            cta_url: "example.com/join".into(),
            ..Default::default()
        };
        let slot = primary_slot(Style::Cta, &content(&req));
        // Plain-text slots are entity-escaped, spaces included.
        assert!(slot.contains("<div class=\"button\">Sign&#32;up</div>"), "{slot}");
        assert!(slot.contains("Join us"));
        assert!(slot.contains("example.com"));
    }

    #[test]
    fn font_scale_multiplies_spacing() {
        let small = Canvas {
            font_scale: 0.6,
            ..canvas()
        };
        let doc = compose_document(
            Style::Quote,
            &small,
            &SanitizedContent::default(),
            &ImageAsset::none(),
            &RenderConfig::default(),
        );
        // Quote base font is 58px; 58 × 0.6 = 34.8.
        assert!(doc.html.contains("font-size:34.8px"), "{}", doc.html);
        // 48px padding × 0.6.
        assert!(doc.html.contains("padding:28.8px"), "{}", doc.html);
    }

    #[test]
    fn image_src_attribute_is_escaped() {
        let asset = ImageAsset {
            original_url: "https://a.test/x\"onload=\"y".into(),
            normalized_url: "https://a.test/x\"onload=\"y".into(),
            inline: None,
            outcome: FetchOutcome::Skipped,
        };
        let (slot, _) = media_slot(&asset, &canvas());
        assert!(!slot.contains("\"onload"), "{slot}");
    }

    #[test]
    fn identical_inputs_give_identical_documents() {
        let req = RenderRequest {
            caption: "Same **input**".into(),
            ..Default::default()
        };
        let compose = || {
            compose_document(
                Style::PhotoCaption,
                &canvas(),
                &content(&req),
                &inlined(),
                &RenderConfig::default(),
            )
        };
        assert_eq!(compose(), compose());
    }

    #[test]
    fn document_references_no_external_resources_for_text() {
        let doc = compose_document(
            Style::NotesCover,
            &canvas(),
            &SanitizedContent::default(),
            &ImageAsset::none(),
            &RenderConfig::default(),
        );
        assert!(!doc.html.contains("<link"));
        assert!(!doc.html.contains("@import"));
        assert!(!doc.html.contains("url("));
    }
}
