//! Chrome DevTools Protocol capture driver

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::{CaptureRequest, Capturer, Error, RenderConfig, Result, ViewportSpec};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Full browser installs preferred over whatever `headless_chrome` finds.
const SYSTEM_BROWSERS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
];

const BROWSER_COMMANDS: &[&str] = &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"];

/// CDP-based capture driver (uses the `headless_chrome` crate)
///
/// Each capture launches a fresh headless Chrome with the viewport fixed on
/// the command line, so layout resolves against the requested width before
/// the first request is made. The browser is closed before `capture` returns,
/// whatever the outcome.
#[derive(Debug, Clone)]
pub struct CdpCapturer {
    chrome_path: Option<PathBuf>,
    selector: String,
    navigation_timeout: Duration,
    element_timeout: Duration,
    settle_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ElementRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl CdpCapturer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            selector: config.selector.clone(),
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            element_timeout: Duration::from_millis(config.element_timeout_ms),
            settle_timeout: Duration::from_millis(config.settle_timeout_ms),
        }
    }

    fn launch(&self, viewport: &ViewportSpec) -> Result<Browser> {
        let path = find_browser(self.chrome_path.as_deref());
        match &path {
            Some(p) => info!("Launching browser... using {}", p.display()),
            None => info!("Launching browser... using headless_chrome's default executable"),
        }

        let scale_arg = OsString::from(format!("--force-device-scale-factor={}", viewport.device_scale_factor));
        let args: Vec<&OsStr> = vec![
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--hide-scrollbars"),
            scale_arg.as_os_str(),
        ];

        // The connection must outlive every wait below
        let idle = self.navigation_timeout + self.element_timeout + self.settle_timeout + Duration::from_secs(30);

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(path)
            .window_size(Some((viewport.width, viewport.height)))
            .idle_browser_timeout(idle)
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        Browser::new(launch_options).map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))
    }

    fn capture_with(&self, browser: &Browser, request: &CaptureRequest, cancel: &AtomicBool) -> Result<()> {
        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(self.navigation_timeout);

        debug!("Navigating to {}", request.url);
        tab.navigate_to(&request.url)
            .map_err(|e| Error::LoadError(format!("Navigation to {} failed: {}", request.url, e)))?
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("{} never committed: {}", request.url, e)))?;

        // DOMContentLoaded is enough; remote fonts may still be in flight
        let parsed = poll(self.navigation_timeout, cancel, || {
            Ok(eval_bool(&tab, "document.readyState !== 'loading'"))
        })?;
        if !parsed {
            return Err(Error::LoadError(format!(
                "{} did not finish parsing within {}ms",
                request.url,
                self.navigation_timeout.as_millis()
            )));
        }

        let selector_js = js_string(&self.selector)?;
        let mounted = poll(self.element_timeout, cancel, || {
            Ok(eval_bool(&tab, &format!("document.querySelector({}) !== null", selector_js)))
        })?;
        if !mounted {
            return Err(Error::ElementNotFound(self.selector.clone()));
        }

        self.settle(&tab, &selector_js, cancel)?;

        tab.find_element(&self.selector)
            .map_err(|_| Error::ElementNotFound(self.selector.clone()))?;
        let rect = self.element_rect(&tab, &selector_js)?;
        debug!("Capturing {} at {:?}", self.selector, rect);

        let png = screenshot(&tab, &rect)?;
        std::fs::write(&request.output, &png).map_err(|source| Error::CaptureIoError {
            path: request.output.clone(),
            source,
        })?;

        info!("Image saved to {}", request.output.display());
        Ok(())
    }

    /// Wait for webfonts and images inside the anchor.
    ///
    /// An anchor carrying `data-render-ready="true"` counts as settled.
    /// Otherwise fonts must be loaded and every image complete on two
    /// consecutive polls. The settle timeout is the last resort.
    fn settle(&self, tab: &Tab, selector_js: &str, cancel: &AtomicBool) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                if (el.getAttribute('data-render-ready') === 'true') return true;
                const fontsLoaded = !document.fonts || document.fonts.status === 'loaded';
                return fontsLoaded && Array.from(el.querySelectorAll('img')).every(img => img.complete);
            }})()"#,
            sel = selector_js
        );

        let mut streak = 0;
        let settled = poll(self.settle_timeout, cancel, || {
            streak = if eval_bool(tab, &script) { streak + 1 } else { 0 };
            Ok(streak >= 2)
        })?;
        if !settled {
            warn!(
                "Content not settled after {}ms, capturing anyway",
                self.settle_timeout.as_millis()
            );
        }
        Ok(())
    }

    fn element_rect(&self, tab: &Tab, selector_js: &str) -> Result<ElementRect> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return JSON.stringify({{ x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }});
            }})()"#,
            sel = selector_js
        );

        let eval = tab
            .evaluate(&script, false)
            .map_err(|e| Error::RenderError(format!("Failed to measure capture element: {}", e)))?;
        let raw = match eval.value {
            Some(serde_json::Value::String(s)) => s,
            _ => return Err(Error::ElementNotFound(self.selector.clone())),
        };
        let rect: ElementRect = serde_json::from_str(&raw)
            .map_err(|e| Error::RenderError(format!("Unexpected element geometry `{}`: {}", raw, e)))?;

        if rect.width < 1.0 || rect.height < 1.0 {
            return Err(Error::RenderError(format!(
                "capture element {} has an empty box ({}x{})",
                self.selector, rect.width, rect.height
            )));
        }
        Ok(rect)
    }
}

impl Capturer for CdpCapturer {
    fn capture(&self, request: &CaptureRequest, cancel: &AtomicBool) -> Result<()> {
        let browser = self.launch(&request.viewport)?;
        let result = self.capture_with(&browser, request, cancel);

        // Close the browser before the outcome propagates
        drop(browser);
        debug!("Browser closed");
        result
    }
}

/// Screenshot the document-space box, including parts below the fold.
fn screenshot(tab: &Tab, rect: &ElementRect) -> Result<Vec<u8>> {
    let clip = Page::Viewport {
        x: rect.x.floor(),
        y: rect.y.floor(),
        width: rect.width.round(),
        height: rect.height.round(),
        scale: 1.0,
    };

    let shot = tab
        .call_method(Page::CaptureScreenshot {
            format: Some(Page::CaptureScreenshotFormatOption::Png),
            quality: None,
            clip: Some(clip),
            from_surface: Some(true),
            capture_beyond_viewport: Some(true),
            optimize_for_speed: None,
        })
        .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))?;

    base64::engine::general_purpose::STANDARD
        .decode(shot.data)
        .map_err(|e| Error::RenderError(format!("Screenshot payload is not base64: {}", e)))
}

/// Poll `check` every interval until it holds, the deadline passes, or the
/// run is cancelled.
fn poll<F>(deadline: Duration, cancel: &AtomicBool, mut check: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Err(Error::Interrupted);
        }
        if check()? {
            return Ok(true);
        }
        if started.elapsed() >= deadline {
            return Ok(false);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Evaluate a boolean expression; errors (e.g. a context torn down by
/// navigation) read as `false` and get retried by the caller.
fn eval_bool(tab: &Tab, expression: &str) -> bool {
    match tab.evaluate(expression, false) {
        Ok(obj) => obj.value.and_then(|v| v.as_bool()).unwrap_or(false),
        Err(e) => {
            debug!("evaluation failed, retrying: {}", e);
            false
        }
    }
}

fn js_string(s: &str) -> Result<String> {
    serde_json::to_string(s).map_err(|e| Error::Other(format!("Failed to encode selector: {}", e)))
}

/// Pick the browser binary: explicit path, a system install, then `PATH`.
/// `None` leaves the choice to `headless_chrome`.
fn find_browser(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    SYSTEM_BROWSERS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .or_else(|| BROWSER_COMMANDS.iter().find_map(|cmd| which::which(cmd).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_browser_path_wins() {
        let chosen = find_browser(Some(Path::new("/opt/chrome/chrome")));
        assert_eq!(chosen, Some(PathBuf::from("/opt/chrome/chrome")));
    }

    #[test]
    fn selectors_are_quoted_for_js() {
        assert_eq!(js_string("#capture-container").unwrap(), "\"#capture-container\"");
        assert_eq!(js_string("div[data-x=\"a\"]").unwrap(), r#""div[data-x=\"a\"]""#);
    }

    #[test]
    fn poll_stops_on_cancel() {
        let cancel = AtomicBool::new(true);
        let err = poll(Duration::from_secs(5), &cancel, || Ok(false)).unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn poll_gives_up_at_deadline() {
        let cancel = AtomicBool::new(false);
        let mut calls = 0;
        let done = poll(Duration::from_millis(250), &cancel, || {
            calls += 1;
            Ok(false)
        })
        .unwrap();
        assert!(!done);
        assert!(calls >= 2);
    }

    #[test]
    fn test_cdp_browser_launch() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        let capturer = CdpCapturer::new(&RenderConfig::default());
        match capturer.launch(&ViewportSpec::default()) {
            Ok(browser) => drop(browser),
            Err(e) => eprintln!("Skipping browser launch test because Chrome is not available: {}", e),
        }
    }
}
