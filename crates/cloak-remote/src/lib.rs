//! cloak-remote: the untrusted storage side of the overlay
//!
//! Defines the [`Remote`] trait the overlay drives (path-addressed object
//! operations plus a link/open call), the tagged [`RemoteLink`] capability
//! each remote hands back for reads, and the Range-Read Adapter that
//! normalizes all three link shapes into the absolute-offset range reads
//! the content cipher consumes.
//!
//! Two implementations ship here: [`OpendalRemote`] for S3-compatible
//! object stores, and [`MemoryRemote`], an in-process tree used by tests.

pub mod adapter;
pub mod link;
pub mod memory;
pub mod opendal_remote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloak_core::CloakResult;
use tokio::io::AsyncRead;

pub use adapter::LinkSource;
pub use link::{RangeReader, RemoteLink, SeekRead};
pub use memory::MemoryRemote;
pub use opendal_remote::OpendalRemote;

/// An object exactly as the remote reports it: ciphertext name, ciphertext
/// size. The overlay only ever reads these.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Final path segment as stored on the remote.
    pub name: String,
    /// Stored (ciphertext) size in bytes; zero for directories.
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
    /// Thumbnail URL, if the remote computes one.
    pub thumbnail: Option<String>,
}

/// Path-addressed operations of the underlying storage backend.
///
/// Paths are absolute, `/`-separated, and already in the remote's
/// (encrypted) namespace; the overlay does all name translation before
/// calling in here. Implementations resolve file-vs-directory themselves
/// where an operation needs it.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn list(&self, dir: &str) -> CloakResult<Vec<RemoteEntry>>;

    /// Stat a single path. Missing objects must surface as
    /// `CloakError::NotFound`; the path resolver's retry depends on it.
    async fn stat(&self, path: &str) -> CloakResult<RemoteEntry>;

    /// Obtain a read capability for a file.
    async fn link(&self, path: &str) -> CloakResult<RemoteLink>;

    /// Store `content` (already ciphertext) as `name` under `dir`.
    /// `size` is the exact ciphertext length.
    async fn put(
        &self,
        dir: &str,
        name: &str,
        size: u64,
        content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> CloakResult<()>;

    async fn make_dir(&self, path: &str) -> CloakResult<()>;

    /// Rename in place (same parent directory).
    async fn rename(&self, path: &str, new_name: &str) -> CloakResult<()>;

    /// Move `src` into the directory `dst_dir`, keeping its name.
    async fn move_to(&self, src: &str, dst_dir: &str) -> CloakResult<()>;

    /// Copy `src` into the directory `dst_dir`, keeping its name.
    async fn copy_to(&self, src: &str, dst_dir: &str) -> CloakResult<()>;

    async fn remove(&self, path: &str) -> CloakResult<()>;
}
