use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{ReadAt, check_range};
use crate::config::ReaderConfig;
use crate::error::{ArchiveError, Result};

/// HTTP Range reader for remote containers
#[derive(Debug)]
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to get the file size. Range mode cannot
    /// work without a known size, so a missing Content-Length is an error.
    pub async fn new(url: String, config: &ReaderConfig) -> Result<Self> {
        let client = build_client(config)?;

        let resp = client.head(&url).send().await?;

        if !resp.status().is_success() {
            return Err(ArchiveError::HttpStatus(resp.status()));
        }

        // Some servers serve ranges without advertising them, so only note it
        let accept_ranges = resp
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");
        if !accept_ranges.contains("bytes") {
            warn!(%url, accept_ranges, "server does not advertise byte ranges");
        }

        // Read the header directly: the body of a HEAD response is always empty
        let size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .ok_or(ArchiveError::MissingContentLength)?;

        debug!(%url, size, "remote container opened");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_bytes(&self, offset: u64, length: usize) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        check_range(offset, length, self.size)?;

        let end = offset + length as u64 - 1;
        let mut received: Vec<u8> = Vec::new();

        while received.len() < length {
            let current_start = offset + received.len() as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let resp = self
                .client
                .get(&self.url)
                .header(RANGE, &range)
                .send()
                .await?;

            let status = resp.status();
            if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
                return Err(ArchiveError::HttpStatus(status));
            }

            let body = resp.bytes().await?;
            self.transferred_bytes
                .fetch_add(body.len() as u64, Ordering::Relaxed);

            // A 200 means the server ignored Range and sent the whole resource
            let chunk = if status == StatusCode::OK {
                let from = (current_start as usize).min(body.len());
                body.slice(from..)
            } else {
                body
            };

            if chunk.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("empty response for range {range}"),
                )
                .into());
            }

            let wanted = length - received.len();
            let chunk_len = chunk.len().min(wanted);

            if received.is_empty() && chunk_len == length {
                return Ok(chunk.slice(..chunk_len));
            }

            debug!(range, got = chunk_len, wanted, "short range response, continuing");
            received.extend_from_slice(&chunk[..chunk_len]);
        }

        Ok(Bytes::from(received))
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Download an entire remote container in one GET.
///
/// Used when range access is unavailable and the caller falls back to an
/// in-memory load.
pub async fn fetch_full(url: &str, config: &ReaderConfig) -> Result<Bytes> {
    let client = build_client(config)?;
    let resp = client.get(url).send().await?;

    if !resp.status().is_success() {
        return Err(ArchiveError::HttpStatus(resp.status()));
    }

    let body = resp.bytes().await?;
    debug!(%url, size = body.len(), "downloaded full container");
    Ok(body)
}

fn build_client(config: &ReaderConfig) -> Result<Client> {
    Ok(Client::builder().timeout(config.request_timeout).build()?)
}
