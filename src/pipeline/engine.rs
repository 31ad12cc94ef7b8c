//! Rendering engine adapter: composed document → PNG via headless Chrome.
//!
//! ## Why spawn_blocking?
//!
//! `headless_chrome` speaks the DevTools protocol over a synchronous
//! websocket client and blocks the calling thread on every command.
//! [`capture`] moves the whole session onto tokio's blocking pool so the
//! async workers keep serving other requests while Chrome lays out and paints.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ─▶ Launched ─▶ ContentLoaded ─▶ Ready ─▶ Captured ─▶ Closed
//!   └──────────┴────────────┴─────────────┴──────────┴──▶ Error ─▶ Closed
//! ```
//!
//! An [`EngineSession`] exclusively owns one browser process. Dropping the
//! session closes it, so every exit path (including `?` and panics inside the
//! blocking task) releases Chrome.

use crate::config::RenderConfig;
use crate::error::CardError;
use crate::pipeline::encode::png_dimensions;
use crate::pipeline::template::{RenderedDocument, MEDIA_ATTR};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Launched,
    ContentLoaded,
    Ready,
    Captured,
    Closed,
    Error,
}

/// Captured pixels plus the geometry they were rendered at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub png: Vec<u8>,
    /// CSS pixel width of the card.
    pub width: u32,
    /// CSS pixel height of the card.
    pub height: u32,
    /// Actual PNG width (`width × device scale factor`).
    pub pixel_width: u32,
    /// Actual PNG height (`height × device scale factor`).
    pub pixel_height: u32,
}

/// Outcome of the readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// `false` when the media element neither loaded nor failed in time.
    pub media_settled: bool,
}

/// The subset of [`RenderConfig`] the engine needs, owned so it can move
/// into the blocking task.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub chrome_path: Option<PathBuf>,
    pub sandbox: bool,
    pub device_scale_factor: f64,
    pub load_timeout: Duration,
    pub media_timeout: Duration,
    pub settle_frames: u32,
}

impl From<&RenderConfig> for EngineSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            sandbox: config.sandbox,
            device_scale_factor: config.device_scale_factor,
            load_timeout: Duration::from_secs(config.load_timeout_secs),
            media_timeout: Duration::from_millis(config.media_timeout_ms),
            settle_frames: config.settle_frames,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────

/// One exclusively-owned browser, driven through the capture lifecycle.
pub struct EngineSession {
    settings: EngineSettings,
    state: EngineState,
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    viewport: (u32, u32),
}

impl EngineSession {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            state: EngineState::Idle,
            browser: None,
            tab: None,
            viewport: (0, 0),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// `Idle → Launched`: start Chrome with a `width × height` window.
    pub fn launch(&mut self, width: u32, height: u32) -> Result<(), CardError> {
        self.transition(EngineState::Idle, EngineState::Launched, |s| {
            let dsf_arg = OsString::from(format!(
                "--force-device-scale-factor={}",
                s.settings.device_scale_factor
            ));
            let args: Vec<&OsStr> = vec![
                dsf_arg.as_os_str(),
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--font-render-hinting=none"),
            ];
            // Waits inside the page are bounded by the media timeout; leave room above it.
            let idle = s.settings.load_timeout + s.settings.media_timeout + Duration::from_secs(10);

            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(s.settings.sandbox)
                .window_size(Some((width, height)))
                .path(s.settings.chrome_path.clone())
                .idle_browser_timeout(idle)
                .args(args)
                .build()
                .map_err(|e| CardError::EngineLaunch(format!("invalid launch options: {e}")))?;

            let browser = Browser::new(options).map_err(|e| CardError::EngineLaunch(e.to_string()))?;
            let tab = browser
                .new_tab()
                .map_err(|e| CardError::EngineLaunch(format!("failed to open tab: {e}")))?;
            // In-page waits carry their own shorter timeouts and resolve first.
            tab.set_default_timeout(s.settings.load_timeout + s.settings.media_timeout);

            s.browser = Some(browser);
            s.tab = Some(tab);
            s.viewport = (width, height);
            Ok(())
        })
    }

    /// `Launched → ContentLoaded`: install `html` in a blank frame and wait
    /// for the document and its fonts to finish loading.
    pub fn load(&mut self, html: &str) -> Result<(), CardError> {
        self.transition(EngineState::Launched, EngineState::ContentLoaded, |s| {
            let tab = s.tab()?;

            tab.navigate_to("about:blank")
                .and_then(|t| t.wait_until_navigated())
                .map_err(load_err)?;

            let tree = tab.call_method(Page::GetFrameTree(None)).map_err(load_err)?;
            tab.call_method(Page::SetDocumentContent {
                frame_id: tree.frame_tree.frame.id,
                html: html.to_string(),
            })
            .map_err(load_err)?;

            let loaded = eval_bool(tab, &document_loaded_script(s.settings.load_timeout))
                .map_err(CardError::ContentLoad)?;
            if !loaded {
                warn!("Document did not report load completion in time; continuing");
            }
            Ok(())
        })
    }

    /// `ContentLoaded → Ready`: wait (bounded) for the media element when
    /// present, then let layout and paint settle for a few frames.
    ///
    /// A media timeout is tolerated and reported in the returned [`Readiness`].
    pub fn await_ready(&mut self, has_media: bool) -> Result<Readiness, CardError> {
        self.transition(EngineState::ContentLoaded, EngineState::Ready, |s| {
            let tab = s.tab()?;
            let media_settled = if has_media {
                let started = Instant::now();
                let settled = eval_bool(tab, &media_ready_script(s.settings.media_timeout))
                    .map_err(CardError::ContentLoad)?;
                if settled {
                    debug!("Media ready after {:?}", started.elapsed());
                } else {
                    warn!(
                        "Media not ready after {:?}; capturing anyway",
                        s.settings.media_timeout
                    );
                }
                settled
            } else {
                true
            };

            eval_bool(tab, &settle_script(s.settings.settle_frames)).map_err(CardError::ContentLoad)?;
            Ok(Readiness { media_settled })
        })
    }

    /// `Ready → Captured`: screenshot exactly the card rectangle.
    pub fn capture(&mut self) -> Result<Vec<u8>, CardError> {
        self.transition(EngineState::Ready, EngineState::Captured, |s| {
            let tab = s.tab()?;
            let (width, height) = s.viewport;
            // The forced device scale factor already multiplies the output; clip scale stays 1.
            let clip = Page::Viewport {
                x: 0.0,
                y: 0.0,
                width: f64::from(width),
                height: f64::from(height),
                scale: 1.0,
            };
            let png = tab
                .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
                .map_err(|e| CardError::Capture(e.to_string()))?;
            if png.is_empty() {
                return Err(CardError::Capture("engine returned an empty screenshot".into()));
            }
            Ok(png)
        })
    }

    /// Release the browser. Valid from every state; idempotent.
    pub fn close(&mut self) {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                debug!("Tab close failed (browser is shutting down anyway): {}", e);
            }
        }
        if self.browser.take().is_some() {
            debug!("Browser released");
        }
        self.state = EngineState::Closed;
    }

    fn tab(&self) -> Result<&Arc<Tab>, CardError> {
        self.tab
            .as_ref()
            .ok_or_else(|| CardError::Internal("engine has no open tab".into()))
    }

    fn transition<T>(
        &mut self,
        from: EngineState,
        to: EngineState,
        step: impl FnOnce(&mut Self) -> Result<T, CardError>,
    ) -> Result<T, CardError> {
        if self.state != from {
            return Err(CardError::Internal(format!(
                "engine cannot move to {to:?} from {:?}",
                self.state
            )));
        }
        match step(self) {
            Ok(value) => {
                debug!("Engine {:?} → {:?}", from, to);
                self.state = to;
                Ok(value)
            }
            Err(e) => {
                self.state = EngineState::Error;
                Err(e)
            }
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if self.state != EngineState::Closed {
            self.close();
        }
    }
}

fn load_err(e: impl std::fmt::Display) -> CardError {
    CardError::ContentLoad(e.to_string())
}

// ── Page scripts ─────────────────────────────────────────────────────────

fn document_loaded_script(timeout: Duration) -> String {
    format!(
        "new Promise((resolve) => {{
  const timer = setTimeout(() => resolve(false), {ms});
  const fonts = () => (document.fonts ? document.fonts.ready : Promise.resolve());
  const done = () => fonts().then(() => {{ clearTimeout(timer); resolve(true); }});
  if (document.readyState === 'complete') done();
  else window.addEventListener('load', done, {{ once: true }});
}})",
        ms = timeout.as_millis()
    )
}

/// Resolves `true` once the media element has loaded or errored, `false` on timeout.
fn media_ready_script(timeout: Duration) -> String {
    format!(
        "new Promise((resolve) => {{
  const el = document.querySelector('[{attr}]');
  if (!el || el.complete) {{ resolve(true); return; }}
  const timer = setTimeout(() => resolve(false), {ms});
  const finish = () => {{ clearTimeout(timer); resolve(true); }};
  el.addEventListener('load', finish, {{ once: true }});
  el.addEventListener('error', finish, {{ once: true }});
}})",
        attr = MEDIA_ATTR,
        ms = timeout.as_millis()
    )
}

fn settle_script(frames: u32) -> String {
    format!(
        "new Promise((resolve) => {{
  let left = {frames};
  const fallback = setTimeout(() => resolve(false), 1000);
  const tick = () => {{
    left -= 1;
    if (left <= 0) {{ clearTimeout(fallback); resolve(true); }} else requestAnimationFrame(tick);
  }};
  requestAnimationFrame(tick);
}})"
    )
}

fn eval_bool(tab: &Tab, script: &str) -> Result<bool, String> {
    let result = tab.evaluate(script, true).map_err(|e| e.to_string())?;
    Ok(result
        .value
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

// ── Entry point ──────────────────────────────────────────────────────────

/// Render `document` to PNG in a fresh, exclusively-owned browser.
pub async fn capture(document: RenderedDocument, config: &RenderConfig) -> Result<RenderResult, CardError> {
    let settings = EngineSettings::from(config);

    tokio::task::spawn_blocking(move || capture_blocking(&document, settings))
        .await
        .map_err(|e| CardError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of [`capture`].
pub fn capture_blocking(
    document: &RenderedDocument,
    settings: EngineSettings,
) -> Result<RenderResult, CardError> {
    let started = Instant::now();
    let mut session = EngineSession::new(settings);

    session.launch(document.width, document.height)?;
    session.load(&document.html)?;
    let readiness = session.await_ready(document.has_media)?;
    let png = session.capture()?;
    session.close();

    let (pixel_width, pixel_height) =
        png_dimensions(&png).map_err(|e| CardError::Capture(format!("unreadable PNG: {e}")))?;

    info!(
        "Captured {}x{} card → {}x{} px in {:?} (media settled: {})",
        document.width,
        document.height,
        pixel_width,
        pixel_height,
        started.elapsed(),
        readiness.media_settled
    );

    Ok(RenderResult {
        png,
        width: document.width,
        height: document.height,
        pixel_width,
        pixel_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EngineSettings {
        EngineSettings::from(&RenderConfig::default())
    }

    #[test]
    fn new_session_is_idle() {
        assert_eq!(EngineSession::new(settings()).state(), EngineState::Idle);
    }

    #[test]
    fn out_of_order_step_is_rejected_without_launching() {
        let mut session = EngineSession::new(settings());
        let err = session.capture().unwrap_err();
        assert!(matches!(err, CardError::Internal(_)));
        // Guard failures leave the state untouched.
        assert_eq!(session.state(), EngineState::Idle);
    }

    #[test]
    fn close_is_idempotent_from_any_state() {
        let mut session = EngineSession::new(settings());
        session.close();
        session.close();
        assert_eq!(session.state(), EngineState::Closed);
    }

    #[test]
    fn settings_follow_config() {
        let config = RenderConfig::builder()
            .media_timeout_ms(2500)
            .settle_frames(3)
            .build()
            .unwrap();
        let s = EngineSettings::from(&config);
        assert_eq!(s.media_timeout, Duration::from_millis(2500));
        assert_eq!(s.settle_frames, 3);
        assert_eq!(s.device_scale_factor, 2.0);
    }

    #[test]
    fn media_script_targets_marker_and_timeout() {
        let js = media_ready_script(Duration::from_millis(6000));
        assert!(js.contains("[data-media]"));
        assert!(js.contains("6000"));
        assert!(js.contains("'error'"));
    }

    #[test]
    fn settle_script_counts_frames() {
        assert!(settle_script(2).contains("let left = 2;"));
    }
}
