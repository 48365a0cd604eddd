//! Render orchestration
//!
//! One job per run: resolve the output, hand the job to a front-end server,
//! capture the anchor element, then tear everything down on every exit path.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::server::{FrontendServer, ServerLauncher};
use crate::{viewport, CaptureRequest, Capturer, Error, OutputResolver, OutputSpec, RenderJob, Result};

/// What the user asked for on the command line
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub input: PathBuf,
    pub output: Option<String>,
    pub theme: String,
    pub size: String,
    pub template: Option<String>,
}

impl RenderRequest {
    /// Request for `input` with the default theme and size.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            theme: crate::DEFAULT_THEME.to_string(),
            size: crate::DEFAULT_SIZE.to_string(),
            template: None,
        }
    }
}

/// Drives one render from Markdown file to image file
pub struct Renderer<L, C> {
    launcher: L,
    capturer: Arc<C>,
    resolver: OutputResolver,
    teardown_grace: std::time::Duration,
}

#[cfg(feature = "cdp")]
impl Renderer<crate::server::FrontendLauncher, crate::cdp::CdpCapturer> {
    /// Renderer with the config-driven launcher and the CDP capture driver.
    pub fn from_config(config: crate::RenderConfig) -> Result<Self> {
        let resolver = match &config.output_dir {
            Some(dir) => OutputResolver::new(dir.clone()),
            None => OutputResolver::with_default_dir()?,
        };
        let capturer = crate::cdp::CdpCapturer::new(&config);
        let grace = config.shutdown_grace();
        Ok(Self::new(crate::server::FrontendLauncher::new(config), capturer, resolver).with_teardown_grace(grace))
    }
}

impl<L, C> Renderer<L, C>
where
    L: ServerLauncher,
    C: Capturer,
{
    pub fn new(launcher: L, capturer: C, resolver: OutputResolver) -> Self {
        Self {
            launcher,
            capturer: Arc::new(capturer),
            resolver,
            teardown_grace: std::time::Duration::from_secs(3),
        }
    }

    /// How long an interrupted capture gets to close its browser.
    pub fn with_teardown_grace(mut self, grace: std::time::Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    /// Render `request`, tearing down early on Ctrl-C.
    pub async fn render(&self, request: RenderRequest) -> Result<OutputSpec> {
        self.render_until(request, async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler available; never interrupt
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Render `request`, aborting when `shutdown` completes first.
    ///
    /// `shutdown` is watched from server launch onward. The server is stopped
    /// exactly once on every path after it started; a launch abandoned midway
    /// is torn down by dropping its handle.
    pub async fn render_until<S>(&self, request: RenderRequest, shutdown: S) -> Result<OutputSpec>
    where
        S: Future<Output = ()>,
    {
        let input = absolute(&request.input)?;
        if !input.is_file() {
            return Err(Error::InputNotFound(input));
        }

        let output = self.resolver.resolve(&input, request.output.as_deref())?;

        info!("Reading markdown from {}", input.display());
        let markdown = tokio::fs::read_to_string(&input).await?;
        let job = RenderJob {
            markdown,
            theme: request.theme,
            size: request.size,
            template: request.template,
        };
        let viewport = viewport::resolve(&job.theme, &job.size);

        tokio::pin!(shutdown);
        let server = tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("Interrupted while starting the front-end server");
                return Err(Error::Interrupted);
            }
            launched = self.launcher.launch(&job) => launched?,
        };

        let capture = CaptureRequest {
            url: server.url().to_string(),
            viewport,
            output: output.path.clone(),
        };
        let outcome = self.capture(capture, shutdown.as_mut()).await;

        if let Err(e) = server.stop().await {
            match &outcome {
                Ok(()) => return Err(e),
                Err(_) => error!("Failed to stop front-end server: {}", e),
            }
        }

        outcome.map(|()| output)
    }

    async fn capture<S>(&self, request: CaptureRequest, mut shutdown: Pin<&mut S>) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        // A signal that landed during launch must not start the browser
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("Interrupted before capture");
                return Err(Error::Interrupted);
            }
            _ = std::future::ready(()) => {}
        }

        let output = request.output.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let capturer = Arc::clone(&self.capturer);
        let flag = Arc::clone(&cancel);
        let mut task = tokio::task::spawn_blocking(move || capturer.capture(&request, &flag));

        tokio::select! {
            joined = &mut task => joined.map_err(|e| Error::Other(format!("Capture task failed: {}", e)))?,
            _ = &mut shutdown => {
                warn!("Interrupted, closing browser");
                cancel.store(true, Ordering::SeqCst);
                match tokio::time::timeout(self.teardown_grace, task).await {
                    Ok(Ok(Ok(()))) => {
                        // Finished regardless; an interrupted run leaves no image
                        if let Err(e) = std::fs::remove_file(&output) {
                            warn!("Failed to remove {}: {}", output.display(), e);
                        }
                    }
                    Ok(_) => {}
                    Err(_) => warn!("Capture did not stop within {}ms", self.teardown_grace.as_millis()),
                }
                Err(Error::Interrupted)
            }
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
