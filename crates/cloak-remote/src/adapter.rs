//! Range-Read Adapter: one read contract over three link shapes
//!
//! The content cipher wants exactly one thing: "give me ciphertext bytes
//! starting at this absolute offset". Remotes offer three different shapes
//! of that (native range reads, one seekable handle, or a bare URL); this
//! adapter folds them all into [`RangeSource`].
//!
//! The URL shape has a degraded path: a server that ignores `Range:` and
//! answers `200 OK` with the full body still works: the adapter reads and
//! discards up to the offset and truncates at the length. Slow, logged,
//! never an error.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use cloak_core::{CloakError, CloakResult};
use cloak_crypto::stream::RangeSource;
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::StreamReader;
use tracing::warn;

use crate::link::{RemoteLink, SeekRead};

/// Adapts one [`RemoteLink`] into the [`RangeSource`] contract.
///
/// `size` is the remote (ciphertext) object size; requests that would run
/// past it are converted into to-end reads, so backends never see a range
/// that overshoots the object.
pub struct LinkSource {
    link: RemoteLink,
    size: u64,
    client: reqwest::Client,
}

impl LinkSource {
    pub fn new(link: RemoteLink, size: u64) -> CloakResult<Self> {
        if let RemoteLink::Url { url, .. } = &link {
            if url.is_empty() {
                return Err(CloakError::NoCapability);
            }
        }
        Ok(Self {
            link,
            size,
            client: reqwest::Client::new(),
        })
    }

    async fn open_url(
        &self,
        url: &str,
        headers: &[(String, String)],
        offset: u64,
        length: Option<u64>,
    ) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let range = match length {
            Some(len) => format!("bytes={offset}-{}", offset + len - 1),
            None => format!("bytes={offset}-"),
        };
        let response = request
            .header(reqwest::header::RANGE, range)
            .send()
            .await
            .map_err(io::Error::other)?;

        let status = response.status();
        let body = body_reader(response);
        if status == reqwest::StatusCode::PARTIAL_CONTENT {
            return Ok(body);
        }
        if status == reqwest::StatusCode::OK {
            if offset == 0 && length.is_none() {
                return Ok(body);
            }
            warn!(%url, offset, "remote does not honor range requests, discarding up to the offset");
            return synthesize_range(body, offset, length).await;
        }
        Err(io::Error::other(format!(
            "remote URL read failed with status {status}"
        )))
    }
}

#[async_trait]
impl RangeSource for LinkSource {
    async fn open(
        &self,
        offset: u64,
        length: Option<u64>,
    ) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        let length = match length {
            Some(len) if offset + len >= self.size => None,
            other => other,
        };
        match &self.link {
            RemoteLink::Range(reader) => reader.read_range(offset, length).await,
            RemoteLink::Seekable(handle) => {
                let mut guard = Arc::clone(handle).lock_owned().await;
                guard.seek(io::SeekFrom::Start(offset)).await?;
                let reader = SharedHandleReader { guard };
                Ok(match length {
                    Some(len) => Box::new(reader.take(len)),
                    None => Box::new(reader),
                })
            }
            RemoteLink::Url { url, headers, .. } => {
                self.open_url(url, headers, offset, length).await
            }
        }
    }
}

/// Non-closing view of the shared seekable handle. Dropping it releases
/// the lock for the next range request; the handle itself stays open until
/// the link is dropped at the end of the whole operation.
struct SharedHandleReader {
    guard: tokio::sync::OwnedMutexGuard<Box<dyn SeekRead>>,
}

impl AsyncRead for SharedHandleReader {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut **this.guard).poll_read(cx, buf)
    }
}

fn body_reader(response: reqwest::Response) -> Box<dyn AsyncRead + Send + Unpin> {
    let stream = response.bytes_stream().map_err(io::Error::other);
    Box::new(StreamReader::new(Box::pin(stream)))
}

/// Turn a from-the-start body into the requested range by discarding
/// `offset` bytes and truncating at `length`.
async fn synthesize_range(
    mut body: Box<dyn AsyncRead + Send + Unpin>,
    offset: u64,
    length: Option<u64>,
) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
    let mut to_skip = offset;
    let mut scratch = [0u8; 8192];
    while to_skip > 0 {
        let want = scratch.len().min(usize::try_from(to_skip).unwrap_or(scratch.len()));
        let got = body.read(&mut scratch[..want]).await?;
        if got == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "response body ended before the requested offset",
            ));
        }
        to_skip -= got as u64;
    }
    Ok(match length {
        Some(len) => Box::new(body.take(len)),
        None => body,
    })
}
