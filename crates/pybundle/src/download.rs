//! Streamed artifact download with coarse progress reporting.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use log::debug;
use tokio::io::AsyncWriteExt;

use crate::host::OutputChannel;

/// Byte-level progress of one download attempt.
///
/// The reported fraction only moves forward, in 0.1 steps, so a transfer
/// emits at most ten progress lines. Until the total size is known from the
/// response headers, nothing is reported.
#[derive(Debug)]
pub struct DownloadProgress {
    received: u64,
    total: Option<u64>,
    reported_fraction: f64,
}

impl DownloadProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            received: 0,
            total,
            reported_fraction: 0.0,
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Record newly received bytes. Returns the new reported fraction when
    /// the transfer crossed the next 10% threshold, `None` otherwise.
    pub fn advance(&mut self, bytes: u64) -> Option<f64> {
        self.received += bytes;
        let total = self.total.filter(|t| *t > 0)?;
        let fraction = self.received as f64 / total as f64;
        if fraction >= self.reported_fraction + 0.1 {
            // Snap to the highest crossed step so the fraction stays
            // monotonic even when a single chunk skips several steps.
            self.reported_fraction = (fraction * 10.0).floor() / 10.0;
            Some(self.reported_fraction)
        } else {
            None
        }
    }
}

/// Download `url` to `dest`, streaming chunks to disk and emitting a line
/// on the output channel at roughly every 10% of the transfer.
///
/// A non-2xx response or transport error fails the download; the caller
/// treats either as terminal for the install attempt.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    output: &dyn OutputChannel,
) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    if !response.status().is_success() {
        return Err(anyhow!("{url} returned HTTP {}", response.status()));
    }

    let mut progress = DownloadProgress::new(response.content_length());
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("could not create {}", dest.display()))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("error reading download stream")?;
        file.write_all(&chunk)
            .await
            .context("error writing downloaded chunk")?;
        if let Some(fraction) = progress.advance(chunk.len() as u64) {
            output.append_line(&format!(
                "Downloaded {}% ({} of {} bytes)",
                (fraction * 100.0).round() as u32,
                progress.received(),
                progress.total().unwrap_or(0)
            ));
        }
    }
    file.flush().await?;

    debug!("downloaded {} bytes from {url}", progress.received());
    Ok(())
}
