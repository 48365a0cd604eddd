//! In-process front-end server
//!
//! Serves a built front-end bundle and answers `/content.json` straight from
//! the in-memory [`RenderJob`], so no staged file is shared between runs.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};
use tiny_http::{Header, Request, Response, Server};

use super::FrontendServer;
use crate::stage::CONTENT_FILE;
use crate::{Error, RenderJob, Result};

/// A running embedded server bound to an ephemeral loopback port
pub struct EmbeddedServer {
    server: Arc<Server>,
    url: String,
    worker: Option<JoinHandle<()>>,
}

impl EmbeddedServer {
    /// Bind `127.0.0.1:0` and start answering requests on a worker thread.
    pub fn start(dist_dir: &Path, job: &RenderJob) -> Result<Self> {
        if !dist_dir.join("index.html").is_file() {
            return Err(Error::ServerError(format!(
                "no built front-end at {} (missing index.html)",
                dist_dir.display()
            )));
        }

        let server = Server::http("127.0.0.1:0")
            .map_err(|e| Error::ServerError(format!("Failed to bind embedded server: {}", e)))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| Error::ServerError("embedded server has no TCP address".into()))?;
        let server = Arc::new(server);

        let site = Site {
            root: dist_dir.to_path_buf(),
            content: job.to_json()?,
        };
        let listener = Arc::clone(&server);
        let worker = std::thread::Builder::new()
            .name("markout-embedded-server".into())
            .spawn(move || {
                for request in listener.incoming_requests() {
                    site.respond(request);
                }
                debug!("embedded server worker exiting");
            })?;

        let url = format!("http://{}", addr);
        info!("Embedded server serving {} at {}", dist_dir.display(), url);
        Ok(Self {
            server,
            url,
            worker: Some(worker),
        })
    }
}

impl FrontendServer for EmbeddedServer {
    fn url(&self) -> &str {
        &self.url
    }

    async fn stop(mut self) -> Result<()> {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::ServerError("embedded server worker panicked".into()))?;
        }
        debug!("Embedded server at {} stopped", self.url);
        Ok(())
    }
}

impl Drop for EmbeddedServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

struct Site {
    root: PathBuf,
    content: Vec<u8>,
}

impl Site {
    fn respond(&self, request: Request) {
        let path = request.url().split(['?', '#']).next().unwrap_or("/").to_string();
        debug!("{} {}", request.method(), path);

        let response = if path.trim_start_matches('/') == CONTENT_FILE {
            Some((self.content.clone(), "application/json"))
        } else {
            self.static_file(&path)
        };

        let result = match response {
            Some((body, mime)) => {
                let mut response = Response::from_data(body);
                if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], mime.as_bytes()) {
                    response.add_header(header);
                }
                request.respond(response)
            }
            None => request.respond(Response::from_string("Not Found").with_status_code(404)),
        };
        if let Err(e) = result {
            warn!("Failed to answer {}: {}", path, e);
        }
    }

    /// Files from the bundle; extension-less routes fall back to `index.html`.
    fn static_file(&self, path: &str) -> Option<(Vec<u8>, &'static str)> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return None;
        }

        let mut file = self.root.join(relative);
        if file.is_dir() {
            file = file.join("index.html");
        }
        if !file.is_file() {
            if relative.extension().is_some() {
                return None;
            }
            file = self.root.join("index.html");
        }

        let mime = mime_for(&file);
        std::fs::read(&file).ok().map(|body| (body, mime))
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types_cover_bundle_assets() {
        assert_eq!(mime_for(Path::new("assets/index-3f2a.js")), "application/javascript");
        assert_eq!(mime_for(Path::new("assets/inter.woff2")), "font/woff2");
        assert_eq!(mime_for(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(mime_for(Path::new("LICENSE")), "application/octet-stream");
    }

    #[test]
    fn refuses_paths_outside_the_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<html></html>").unwrap();
        let site = Site {
            root: tmp.path().join("dist"),
            content: Vec::new(),
        };
        assert!(site.static_file("/../index.html").is_none());
    }
}
