//! Front-end development server supervised as a child process

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, info, warn};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::{probe, FrontendServer};
use crate::{Error, Result};

const EXIT_CHECK: Duration = Duration::from_millis(500);

/// Settings for one dev server launch
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Program and arguments, e.g. `npm run dev`
    pub command: Vec<String>,
    /// Working directory of the server
    pub cwd: PathBuf,
    /// Window for the server to announce its URL
    pub startup_timeout: Duration,
    /// Candidate probed when no URL is announced in time
    pub fallback_url: String,
    /// Hard deadline for the readiness probe
    pub ready_timeout: Duration,
    /// Time allowed to exit after SIGTERM before SIGKILL
    pub shutdown_grace: Duration,
}

/// A running dev server
pub struct DevServer {
    child: Child,
    pid: Option<u32>,
    url: String,
    shutdown_grace: Duration,
    stopped: bool,
}

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid regex"))
}

fn listening_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:local:|listening (?:at|on):?)\s+(https?://(?:\[[0-9A-Fa-f:.]+\]|[A-Za-z0-9.\-]+)(?::\d+)?)").expect("valid regex")
    })
}

/// Extract the serving URL from one line of server output.
///
/// Understands Vite's `Local:   http://localhost:5173/` banner (with or
/// without colour codes) and generic `listening at|on <url>` lines.
pub fn parse_listening_url(line: &str) -> Option<String> {
    let plain = ansi_escape().replace_all(line, "");
    listening_line()
        .captures(&plain)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('/').to_string())
}

impl DevServer {
    /// Spawn the server and wait until it is reachable.
    ///
    /// The child is stopped before any error is returned.
    pub async fn start(config: &DevServerConfig) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| Error::ConfigError("dev server command is empty".into()))?;
        let program = resolve_program(program, &config.cwd)?;

        info!("Starting front-end server: {}", config.command.join(" "));
        let mut cmd = Command::new(&program);
        cmd.args(args)
            .current_dir(&config.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::ServerError(format!("Failed to spawn `{}`: {}", program.display(), e)))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain(BufReader::new(stderr).lines(), "stderr"));
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ServerError("server stdout was not captured".into()))?;

        let mut server = Self {
            pid: child.id(),
            child,
            url: String::new(),
            shutdown_grace: config.shutdown_grace,
            stopped: false,
        };

        match server.discover(stdout, config).await {
            Ok(url) => {
                server.url = url;
                Ok(server)
            }
            Err(e) => {
                if let Err(stop_err) = server.shutdown().await {
                    warn!("Failed to stop front-end server after startup error: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    async fn discover(&mut self, stdout: ChildStdout, config: &DevServerConfig) -> Result<String> {
        let mut lines = BufReader::new(stdout).lines();

        let announced = tokio::time::timeout(config.startup_timeout, async {
            while let Some(line) = lines.next_line().await? {
                debug!("[server] {}", line);
                if let Some(url) = parse_listening_url(&line) {
                    return Ok(Some(url));
                }
            }
            Ok::<_, std::io::Error>(None)
        })
        .await;

        let url = match announced {
            Ok(Ok(Some(url))) => url,
            Ok(Ok(None)) => {
                // EOF usually means the process is exiting
                if let Ok(status) = tokio::time::timeout(EXIT_CHECK, self.child.wait()).await {
                    return Err(Error::ServerError(format!("server exited before announcing a URL ({})", status?)));
                }
                warn!("Server closed its output without a URL, probing {}", config.fallback_url);
                config.fallback_url.clone()
            }
            Ok(Err(e)) => return Err(Error::ServerError(format!("Failed to read server output: {}", e))),
            Err(_) => {
                warn!(
                    "No server URL announced within {}ms, probing {}",
                    config.startup_timeout.as_millis(),
                    config.fallback_url
                );
                config.fallback_url.clone()
            }
        };

        // Keep the pipe empty so the server never blocks on a write
        tokio::spawn(drain(lines, "stdout"));

        probe::wait_ready(&url, config.ready_timeout).await?;
        Ok(url)
    }

    async fn shutdown(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            self.sweep_group();
            self.stopped = true;
            return Ok(status);
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            signal_group(pid, libc::SIGTERM);
        }
        #[cfg(not(unix))]
        self.child.start_kill()?;

        let status = match tokio::time::timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!("Front-end server ignored SIGTERM for {}ms, killing", self.shutdown_grace.as_millis());
                self.child.start_kill()?;
                self.child.wait().await?
            }
        };
        self.sweep_group();
        self.stopped = true;
        Ok(status)
    }

    /// Kill whatever is left in the server's process group.
    fn sweep_group(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            signal_group(pid, libc::SIGKILL);
        }
    }
}

impl Drop for DevServer {
    /// `kill_on_drop` only reaches the direct child; take the group down too.
    fn drop(&mut self) {
        if !self.stopped {
            debug!("Front-end server dropped without stop, killing its process group");
            self.sweep_group();
        }
    }
}

impl FrontendServer for DevServer {
    fn url(&self) -> &str {
        &self.url
    }

    async fn stop(mut self) -> Result<()> {
        let status = self.shutdown().await?;
        debug!("Front-end server stopped ({})", status);
        Ok(())
    }
}

/// Look the program up on `PATH`, or relative to the server's directory.
fn resolve_program(program: &str, cwd: &Path) -> Result<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        let path = if candidate.is_absolute() { candidate.to_path_buf() } else { cwd.join(candidate) };
        return Ok(path);
    }
    which::which(program).map_err(|e| Error::ServerError(format!("`{}` not found on PATH: {}", program, e)))
}

/// Signal the server's whole process group so wrappers like `npm` don't
/// leave their children behind.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        warn!("Process id {} does not fit a pid_t", pid);
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions
    if unsafe { libc::killpg(pgid, signal) } == 0 {
        debug!("sent signal {} to process group {}", signal, pid);
    } else {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!("process group {} already gone", pid);
        } else {
            warn!("Failed to signal process group {}: {}", pid, err);
        }
    }
}

async fn drain<R>(mut lines: Lines<BufReader<R>>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[server {}] {}", stream, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vite_banner() {
        assert_eq!(
            parse_listening_url("  ➜  Local:   http://localhost:5173/"),
            Some("http://localhost:5173".to_string())
        );
    }

    #[test]
    fn parses_coloured_banner() {
        let line = "  \x1b[32m➜\x1b[39m  \x1b[1mLocal\x1b[22m:   \x1b[36mhttp://localhost:\x1b[1m5174\x1b[22m/\x1b[39m";
        assert_eq!(parse_listening_url(line), Some("http://localhost:5174".to_string()));
    }

    #[test]
    fn parses_generic_listening_line() {
        assert_eq!(
            parse_listening_url("server listening at http://127.0.0.1:3000"),
            Some("http://127.0.0.1:3000".to_string())
        );
        assert_eq!(
            parse_listening_url("Listening on: http://[::1]:8080/"),
            Some("http://[::1]:8080".to_string())
        );
    }

    #[test]
    fn parses_ipv6_vite_banner() {
        assert_eq!(
            parse_listening_url("  ➜  Local:   http://[::1]:5173/"),
            Some("http://[::1]:5173".to_string())
        );
        assert_eq!(
            parse_listening_url("listening at https://[fe80::1]"),
            Some("https://[fe80::1]".to_string())
        );
    }

    #[test]
    fn ignores_unrelated_output() {
        assert_eq!(parse_listening_url("VITE v5.0.0  ready in 312 ms"), None);
        assert_eq!(parse_listening_url("  ➜  Network: use --host to expose"), None);
    }

    #[test]
    fn relative_programs_resolve_against_cwd() {
        let path = resolve_program("node_modules/.bin/vite", Path::new("/srv/app")).unwrap();
        assert_eq!(path, PathBuf::from("/srv/app/node_modules/.bin/vite"));
    }
}
