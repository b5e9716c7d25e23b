//! Opening source locators

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::{RefreshError, RefreshResult};

/// Default timeout for a whole download
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Copies the content behind a locator into a local file
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stream `locator` into `out`, returning the number of bytes written
    async fn fetch(&self, locator: &str, out: &mut File) -> RefreshResult<u64>;
}

/// Fetches `http`, `https` and `file` URLs
pub struct UrlFetcher {
    client: Client,
}

impl UrlFetcher {
    pub fn new(timeout: Duration) -> RefreshResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: Url, out: &mut File) -> RefreshResult<u64> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    async fn fetch_file(&self, url: &Url, out: &mut File) -> RefreshResult<u64> {
        let path = url
            .to_file_path()
            .map_err(|_| RefreshError::InvalidLocator(url.to_string()))?;
        let mut source = File::open(&path).await?;
        let written = tokio::io::copy(&mut source, out).await?;
        Ok(written)
    }
}

#[async_trait]
impl Fetcher for UrlFetcher {
    async fn fetch(&self, locator: &str, out: &mut File) -> RefreshResult<u64> {
        let url =
            Url::parse(locator).map_err(|_| RefreshError::InvalidLocator(locator.to_string()))?;

        debug!(url = %url, "Opening locator");
        match url.scheme() {
            "http" | "https" => self.fetch_http(url, out).await,
            "file" => self.fetch_file(&url, out).await,
            other => Err(RefreshError::UnsupportedScheme(other.to_string())),
        }
    }
}
