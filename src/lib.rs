//! Markout poster renderer
//!
//! Turns a Markdown document into a themed poster image by handing it to a
//! browser-rendered front-end, loading that front-end in headless Chrome and
//! capturing a single DOM element as a PNG.
//!
//! # Pipeline
//!
//! - **Output resolution** ([`output`]): decide where the image goes before any work starts
//! - **Staging** ([`stage`]): hand the [`RenderJob`] to the front-end server
//! - **Server supervision** ([`server`]): bring up an ephemeral front-end server and tear it down
//! - **Viewport policy** ([`viewport`]): map the size token to concrete dimensions
//! - **Capture** ([`cdp`]): drive headless Chrome and screenshot the capture anchor
//!
//! # Example
//!
//! ```no_run
//! use markout::{RenderConfig, RenderRequest, Renderer};
//!
//! # async fn run() -> markout::Result<()> {
//! let config = RenderConfig::from_env()?;
//! let renderer = Renderer::from_config(config)?;
//! let output = renderer.render(RenderRequest::new("hello.md")).await?;
//! println!("{}", output.path.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod output;
pub mod pipeline;
pub mod server;
pub mod stage;
pub mod viewport;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use output::{OutputResolver, OutputSpec};
pub use pipeline::{RenderRequest, Renderer};
pub use viewport::ViewportSpec;

/// DOM anchor the front-end exposes once its content has mounted.
pub const CAPTURE_SELECTOR: &str = "#capture-container";

/// Theme used when none is given on the command line.
pub const DEFAULT_THEME: &str = "git-hub";

/// Size token used when none is given on the command line.
pub const DEFAULT_SIZE: &str = "pc";

/// The payload handed to the front-end as `/content.json`.
///
/// `template` is omitted from the serialized document when absent so the
/// front-end sees exactly the keys it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub markdown: String,
    pub theme: String,
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl RenderJob {
    /// Serialize the job as the front-end expects it.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Other(format!("Failed to serialize render job: {}", e)))
    }
}

/// Everything the capture driver needs for one screenshot.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Base URL of the front-end server
    pub url: String,
    /// Viewport fixed before navigation
    pub viewport: ViewportSpec,
    /// Destination image file
    pub output: PathBuf,
}

/// How the front-end gets served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerMode {
    /// Embedded when a built bundle exists, dev server otherwise
    #[default]
    Auto,
    /// Spawn the front-end's development server and read the staged file
    Dev,
    /// Serve the built bundle in-process, content from memory
    Embedded,
}

impl std::str::FromStr for ServerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ServerMode::Auto),
            "dev" => Ok(ServerMode::Dev),
            "embedded" => Ok(ServerMode::Embedded),
            other => Err(Error::ConfigError(format!("unknown server mode `{}`", other))),
        }
    }
}

/// Configuration for a render run
///
/// Defaults reproduce the reference behaviour: a 5 second window to discover
/// the dev server URL with `http://localhost:3000` as the fallback candidate,
/// and a one second ceiling on the post-mount settle wait.
///
/// # Examples
///
/// ```
/// let cfg = markout::RenderConfig::default();
/// assert_eq!(cfg.fallback_url, "http://localhost:3000");
/// assert_eq!(cfg.settle_timeout_ms, 1000);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Front-end project root (contains `vite-project/`)
    pub app_dir: PathBuf,
    /// Which server implementation to use
    pub server_mode: ServerMode,
    /// Command that starts the front-end dev server, run inside `app_dir`
    pub dev_command: Vec<String>,
    /// URL probed when the dev server never prints one
    pub fallback_url: String,
    /// Explicit browser binary; system installs are searched otherwise
    pub chrome_path: Option<PathBuf>,
    /// Directory for relative and derived output names
    pub output_dir: Option<PathBuf>,
    /// DOM anchor to capture
    pub selector: String,
    /// Window for the dev server to announce its URL
    pub server_start_timeout_ms: u64,
    /// Hard deadline for the readiness probe
    pub ready_timeout_ms: u64,
    /// Deadline for navigation and DOM parsing
    pub navigation_timeout_ms: u64,
    /// Deadline for the capture anchor to appear
    pub element_timeout_ms: u64,
    /// Ceiling on waiting for fonts and images after mount
    pub settle_timeout_ms: u64,
    /// Grace period for child processes to exit after being signalled
    pub shutdown_grace_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("."),
            server_mode: ServerMode::Auto,
            dev_command: vec!["npm".to_string(), "run".to_string(), "dev".to_string()],
            fallback_url: "http://localhost:3000".to_string(),
            chrome_path: None,
            output_dir: None,
            selector: CAPTURE_SELECTOR.to_string(),
            server_start_timeout_ms: 5000,
            ready_timeout_ms: 15000,
            navigation_timeout_ms: 30000,
            element_timeout_ms: 15000,
            settle_timeout_ms: 1000,
            shutdown_grace_ms: 3000,
        }
    }
}

impl RenderConfig {
    /// Build a configuration from `MARKOUT_*` environment variables.
    ///
    /// None of the variables are required; unset ones keep their defaults.
    /// `MARKOUT_APP_DIR` falls back to the current directory.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::from_lookup(|key| std::env::var(key).ok())?;
        if cfg.app_dir == Path::new(".") {
            cfg.app_dir = std::env::current_dir()?;
        }
        Ok(cfg)
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(dir) = lookup("MARKOUT_APP_DIR") {
            cfg.app_dir = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("MARKOUT_SERVER") {
            cfg.server_mode = mode.parse()?;
        }
        if let Some(command) = lookup("MARKOUT_DEV_COMMAND") {
            let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            if parts.is_empty() {
                return Err(Error::ConfigError("MARKOUT_DEV_COMMAND is empty".into()));
            }
            cfg.dev_command = parts;
        }
        if let Some(url) = lookup("MARKOUT_FALLBACK_URL") {
            cfg.fallback_url = url;
        }
        if let Some(path) = lookup("MARKOUT_CHROME") {
            cfg.chrome_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("MARKOUT_OUTPUT_DIR") {
            cfg.output_dir = Some(PathBuf::from(dir));
        }

        let millis = |key: &str, slot: &mut u64| -> Result<()> {
            if let Some(raw) = lookup(key) {
                *slot = raw
                    .trim()
                    .parse()
                    .map_err(|e| Error::ConfigError(format!("{} must be milliseconds: {}", key, e)))?;
            }
            Ok(())
        };
        millis("MARKOUT_SERVER_START_TIMEOUT_MS", &mut cfg.server_start_timeout_ms)?;
        millis("MARKOUT_READY_TIMEOUT_MS", &mut cfg.ready_timeout_ms)?;
        millis("MARKOUT_NAVIGATION_TIMEOUT_MS", &mut cfg.navigation_timeout_ms)?;
        millis("MARKOUT_ELEMENT_TIMEOUT_MS", &mut cfg.element_timeout_ms)?;
        millis("MARKOUT_SETTLE_TIMEOUT_MS", &mut cfg.settle_timeout_ms)?;

        Ok(cfg)
    }

    /// The Vite project inside the app directory.
    pub fn vite_project_dir(&self) -> PathBuf {
        self.app_dir.join("vite-project")
    }

    /// Static directory the dev server serves `content.json` from.
    pub fn public_dir(&self) -> PathBuf {
        self.vite_project_dir().join("public")
    }

    /// Built front-end bundle served by the embedded server.
    pub fn dist_dir(&self) -> PathBuf {
        self.vite_project_dir().join("dist")
    }

    pub(crate) fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Core trait for capture backends
///
/// Implementations are blocking; the pipeline runs them on a dedicated
/// blocking thread. `cancel` is raised when the run is interrupted and should
/// be checked at every suspension point.
pub trait Capturer: Send + Sync + 'static {
    /// Load `request.url`, wait for the capture anchor and write its
    /// screenshot to `request.output`.
    fn capture(&self, request: &CaptureRequest, cancel: &AtomicBool) -> Result<()>;
}
