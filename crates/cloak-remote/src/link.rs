//! Remote read capabilities
//!
//! A remote hands back exactly one way to read a file's bytes. Modeling it
//! as a tagged variant (rather than three nullable fields) means the
//! adapter pattern-matches instead of null-checking, and a link can never
//! claim two capabilities at once.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio::sync::Mutex;

/// Native absolute-offset range reads, the best case.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read `[offset, offset + length)`, or to end when `length` is `None`.
    async fn read_range(
        &self,
        offset: u64,
        length: Option<u64>,
    ) -> io::Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// A handle that can seek and read.
pub trait SeekRead: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekRead for T {}

/// How a remote exposes a file's bytes for reading.
pub enum RemoteLink {
    /// The remote can serve arbitrary byte ranges directly.
    Range(Box<dyn RangeReader>),
    /// One shared seekable handle. The adapter seeks it per request and
    /// hands out non-closing wrappers; the handle itself is closed once,
    /// when the last reference drops at the end of the whole operation.
    Seekable(Arc<Mutex<Box<dyn SeekRead>>>),
    /// Only a URL; range support depends on the far end honoring
    /// `Range:` headers.
    Url {
        url: String,
        headers: Vec<(String, String)>,
        expiration: Option<Duration>,
    },
}

impl std::fmt::Debug for RemoteLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteLink::Range(_) => f.write_str("RemoteLink::Range"),
            RemoteLink::Seekable(_) => f.write_str("RemoteLink::Seekable"),
            RemoteLink::Url { url, .. } => write!(f, "RemoteLink::Url({url})"),
        }
    }
}
