//! Ephemeral front-end server supervision
//!
//! A server is acquired by a [`ServerLauncher`] and released by
//! [`FrontendServer::stop`], which consumes the handle so it can only run once.
//! Dropping a handle without stopping it still kills the child process and,
//! for the dev server, everything left in its process group.

pub mod dev;
pub mod embedded;
pub mod probe;

use std::time::Duration;

use log::info;

pub use dev::{DevServer, DevServerConfig};
pub use embedded::EmbeddedServer;

use crate::{stage, RenderConfig, RenderJob, Result, ServerMode};

/// A reachable front-end server owned by the current run
#[allow(async_fn_in_trait)]
pub trait FrontendServer {
    /// Base URL the browser should load
    fn url(&self) -> &str;

    /// Terminate the server and release its port.
    async fn stop(self) -> Result<()>;
}

/// Brings up a server for one job
#[allow(async_fn_in_trait)]
pub trait ServerLauncher {
    type Server: FrontendServer;

    /// Make `job` available to the front-end and start serving it.
    ///
    /// Returns only once the server is reachable.
    async fn launch(&self, job: &RenderJob) -> Result<Self::Server>;
}

/// Either server implementation, picked at launch time
pub enum AnyServer {
    Dev(DevServer),
    Embedded(EmbeddedServer),
}

impl FrontendServer for AnyServer {
    fn url(&self) -> &str {
        match self {
            AnyServer::Dev(s) => s.url(),
            AnyServer::Embedded(s) => s.url(),
        }
    }

    async fn stop(self) -> Result<()> {
        match self {
            AnyServer::Dev(s) => s.stop().await,
            AnyServer::Embedded(s) => s.stop().await,
        }
    }
}

/// Launcher driven by [`RenderConfig`]
#[derive(Debug, Clone)]
pub struct FrontendLauncher {
    config: RenderConfig,
}

impl FrontendLauncher {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// The mode `Auto` settles on for the current app directory.
    pub fn effective_mode(&self) -> ServerMode {
        match self.config.server_mode {
            ServerMode::Auto if self.config.dist_dir().join("index.html").is_file() => ServerMode::Embedded,
            ServerMode::Auto => ServerMode::Dev,
            mode => mode,
        }
    }

    fn dev_config(&self) -> DevServerConfig {
        DevServerConfig {
            command: self.config.dev_command.clone(),
            cwd: self.config.app_dir.clone(),
            startup_timeout: Duration::from_millis(self.config.server_start_timeout_ms),
            fallback_url: self.config.fallback_url.clone(),
            ready_timeout: Duration::from_millis(self.config.ready_timeout_ms),
            shutdown_grace: self.config.shutdown_grace(),
        }
    }
}

impl ServerLauncher for FrontendLauncher {
    type Server = AnyServer;

    async fn launch(&self, job: &RenderJob) -> Result<AnyServer> {
        let server = match self.effective_mode() {
            ServerMode::Embedded => AnyServer::Embedded(EmbeddedServer::start(&self.config.dist_dir(), job)?),
            _ => {
                stage::stage(job, &self.config.public_dir())?;
                AnyServer::Dev(DevServer::start(&self.dev_config()).await?)
            }
        };
        info!("Server started at {}", server.url());
        Ok(server)
    }
}
