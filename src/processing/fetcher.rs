//! # Image Fetcher
//!
//! Thin HTTP client for upstream sprites and metadata. Every request carries
//! the configured timeout, so an unreachable host turns into an ordinary
//! error instead of stalling the caller.

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use reqwest::header::CONTENT_LENGTH;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::bitmap::{self, Bitmap};

/// HTTP client used for every upstream request.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nami-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// GET the full body of `url`.
    ///
    /// # Errors
    /// Network failure, timeout, or a non-2xx status.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("failed to fetch {}: {}", url, status);
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", url))?;
        debug!("⬇️  Fetched {} ({} bytes)", url, body.len());
        Ok(body.to_vec())
    }

    /// GET `url` and deserialize the JSON body.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("failed to fetch {}: {}", url, status);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("invalid JSON from {}", url))
    }

    /// HEAD `url` and read its advertised `Content-Length`.
    ///
    /// # Returns
    /// - `Ok(Some(n))`: the server reported a size
    /// - `Ok(None)`: the server answered without a usable size
    /// - `Err`: network failure, timeout, or a non-2xx status
    pub async fn probe_size(&self, url: &str) -> Result<Option<u64>> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HEAD {} returned {}", url, status);
        }

        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok()))
    }

    /// Fetch an image and convert it into a monochrome bitmap.
    ///
    /// Decoding and thresholding are CPU-bound, so they run on the blocking
    /// pool. Any failure along the way comes back as a single error prefixed
    /// with `failed to convert image to bitmap`.
    pub async fn fetch_bitmap(&self, url: &str, max_width: u32, max_height: u32) -> Result<Bitmap> {
        let convert = async {
            let bytes = self.fetch(url).await?;
            tokio::task::spawn_blocking(move || {
                bitmap::convert_bytes_to_bitmap(&bytes, max_width, max_height)
            })
            .await
            .map_err(|e| anyhow!("conversion task panicked: {}", e))?
        };

        convert
            .await
            .map_err(|e| anyhow!("failed to convert image to bitmap: {:#}", e))
    }
}
