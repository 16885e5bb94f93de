//! HTTP retrieval of source artifacts
//!
//! Each artifact is first requested as `<url>.gz` advertising gzip, then, only
//! if that request fails at the transport level, as the bare `<url>`. A 404 is
//! an expected absence and surfaces as [`Retrieved::NotFound`], not an error.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Response, StatusCode};
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::observability::error_chain;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} retrieving {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decompress gzip payload: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("invalid HTTP client configuration: {0}")]
    Client(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Raw body of a successful retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub compressed: bool,
    pub raw_bytes: Bytes,
}

impl FetchResult {
    /// Body with gzip encoding removed, if the response advertised it
    pub fn into_payload(self) -> Result<Bytes> {
        if !self.compressed {
            debug!(size = self.raw_bytes.len(), "Decoding source file");
            return Ok(self.raw_bytes);
        }

        debug!(size = self.raw_bytes.len(), "Decompressing gzipped source file");
        let mut decoder = MultiGzDecoder::new(&self.raw_bytes[..]);
        let mut buf = Vec::new();
        decoder
            .read_to_end(&mut buf)
            .map_err(FetchError::Decompress)?;

        Ok(Bytes::from(buf))
    }
}

/// Tagged outcome of a retrieval that did not fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieved {
    Found(FetchResult),
    NotFound,
}

/// Retrieves the artifact behind a job's source URL
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// `retry` is carried through from the job and does not change how the
    /// artifact is fetched.
    async fn retrieve(&self, source_url: &str, retry: bool) -> Result<Retrieved>;
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            user_agent: concat!("subunit-pusher/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`SourceFetcher`] backed by reqwest
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self> {
        // reqwest is built without transparent decompression, so the body is
        // always returned exactly as sent
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    async fn send(&self, source_url: &str) -> Result<Response> {
        let gz_url = format!("{}.gz", source_url);
        debug!(url = %gz_url, "Retrieving");

        match self
            .client
            .get(&gz_url)
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!(url = %gz_url, error = %error_chain(&e), "Compressed variant unreachable, falling back");
                debug!(url = source_url, "Retrieving");

                self.client.get(source_url).send().await.map_err(|source| {
                    error!(url = source_url, error = %error_chain(&source), "Unable to retrieve source file");
                    FetchError::Transport {
                        url: source_url.to_string(),
                        source,
                    }
                })
            }
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn retrieve(&self, source_url: &str, _retry: bool) -> Result<Retrieved> {
        let response = self.send(source_url).await?;
        let url = response.url().to_string();
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            info!(url = %url, "Unable to retrieve source: HTTP error 404");
            return Ok(Retrieved::NotFound);
        }

        if !status.is_success() {
            error!(url = %url, status = status.as_u16(), "Unable to retrieve source file");
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let compressed = is_gzipped(response.headers());

        let raw_bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Body {
                url: url.clone(),
                source,
            })?;

        debug!(url = %url, compressed, size = raw_bytes.len(), "Download completed");

        Ok(Retrieved::Found(FetchResult {
            compressed,
            raw_bytes,
        }))
    }
}

fn is_gzipped(headers: &HeaderMap) -> bool {
    [CONTENT_TYPE, CONTENT_ENCODING].iter().any(|name| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("gzip"))
    })
}
