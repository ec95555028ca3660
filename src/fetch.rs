use crate::{AttachError, Result};
use std::path::Path;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";
const MAX_REDIRECTS: u32 = 2;

/// Fetches a remote resource into a local file.
pub trait RemoteFetcher {
    /// Writes the response body to `destination` and returns the byte
    /// count. Transport errors, timeouts, and HTTP status >= 400 are
    /// errors; `destination` may be left partially written.
    fn fetch_to_file(&self, url: &str, destination: &Path, timeout: Duration) -> Result<u64>;
}

/// Blocking HTTP fetcher. Each call builds a fresh agent so the timeout
/// covers the whole transfer for that one item.
pub struct HttpFetcher;

impl RemoteFetcher for HttpFetcher {
    fn fetch_to_file(&self, url: &str, destination: &Path, timeout: Duration) -> Result<u64> {
        let mut config = ureq::Agent::config_builder();
        config = config
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .max_redirects(MAX_REDIRECTS)
            .user_agent(DEFAULT_USER_AGENT);
        let agent: ureq::Agent = config.build().into();

        let mut response = agent.get(url).call().map_err(|e| AttachError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(AttachError::FetchStatus {
                url: url.to_string(),
                status,
            });
        }

        let mut file = std::fs::File::create(destination)?;
        let bytes = std::io::copy(&mut response.body_mut().as_reader(), &mut file).map_err(|e| {
            AttachError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(bytes)
    }
}
