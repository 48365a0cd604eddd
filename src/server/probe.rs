//! Readiness probe for front-end servers

use std::time::Duration;

use log::debug;
use tokio::time::{sleep, Instant};

use crate::{Error, Result};

const PROBE_INTERVAL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `url` until it answers with a non-5xx status or `deadline` passes.
///
/// Fails with [`Error::ServerStartTimeout`] rather than guessing; a server
/// that never answers is never handed to the browser.
pub async fn wait_ready(url: &str, deadline: Duration) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::ServerError(format!("Failed to build probe client: {}", e)))?;

    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                debug!("{} ready after {} probe(s) ({})", url, attempts, resp.status());
                return Ok(());
            }
            Ok(resp) => debug!("probe {} returned {}", url, resp.status()),
            Err(e) => debug!("probe {} failed: {}", url, e),
        }

        if started.elapsed() + PROBE_INTERVAL > deadline {
            return Err(Error::ServerStartTimeout {
                url: url.to_string(),
                timeout_ms: deadline.as_millis() as u64,
            });
        }
        sleep(PROBE_INTERVAL).await;
    }
}
