use fetchtv_core::{FetchError, Result};
use std::time::Duration;

/// Tunables for talking to the box, normally filled from the app config
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Timeout for description fetches and SOAP calls
    pub request_timeout: Duration,
    /// Connect timeout for media downloads (the body itself is unbounded)
    pub connect_timeout: Duration,
    /// Entries requested per Browse call
    pub browse_page_size: u32,
    /// Folders browsed at once by the walker
    pub browse_concurrency: usize,
    /// Items downloaded at once
    pub download_concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            browse_page_size: 200,
            browse_concurrency: 4,
            download_concurrency: 2,
        }
    }
}

/// HTTP clients and settings shared by discovery, browsing and downloading
///
/// Cloning is cheap; the reqwest clients share their connection pools.
#[derive(Debug, Clone)]
pub struct FetchContext {
    config: HttpConfig,
    /// Client with a whole-request timeout, for small XML exchanges
    control: reqwest::Client,
    /// Client without a body timeout, for media payloads
    media: reqwest::Client,
}

impl FetchContext {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let control = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Config {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        let media = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FetchError::Config {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            control,
            media,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn control_client(&self) -> &reqwest::Client {
        &self.control
    }

    pub fn media_client(&self) -> &reqwest::Client {
        &self.media
    }
}
