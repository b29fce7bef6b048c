//! The overlay driver: plaintext operations over the encrypted remote
//!
//! Thin by design. Structural operations (mkdir, move, rename, copy,
//! remove) only translate paths and delegate; the cryptographic work
//! happens in `list` (decode + filter), `open` (range-read pipeline), and
//! `put` (encrypt pipeline).

use std::sync::Arc;

use cloak_core::{join_path, CloakError, CloakResult, Object};
use cloak_crypto::Cipher;
use cloak_remote::{LinkSource, Remote, RemoteEntry};
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::resolve;

pub struct Overlay {
    cipher: Arc<Cipher>,
    remote: Arc<dyn Remote>,
    root: String,
}

impl Overlay {
    pub fn new(cipher: Arc<Cipher>, remote: Arc<dyn Remote>, root: impl Into<String>) -> Self {
        Self {
            cipher,
            remote,
            root: root.into(),
        }
    }

    /// List a logical directory.
    ///
    /// Entries whose name or size does not decode are foreign objects (or
    /// corrupted ones) and vanish from the listing; any other error aborts.
    pub async fn list(&self, dir: &str) -> CloakResult<Vec<Object>> {
        let remote_dir = resolve::to_remote_path(&self.cipher, &self.root, dir, true)?;
        let entries = self.remote.list(&remote_dir).await?;

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.decode_entry(dir, &entry) {
                Ok(object) => result.push(object),
                Err(err) if err.is_decode() => {
                    debug!(name = %entry.name, %err, "skipping entry that is not an overlay member");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    /// Stat a logical path.
    ///
    /// `/` is answered locally with the synthetic root. Everything else
    /// goes through the guess-and-retry lookup: at most two remote stats,
    /// the second only after a NotFound on an ambiguous path shape, and
    /// the second attempt's error is the one surfaced.
    pub async fn get(&self, path: &str) -> CloakResult<Object> {
        if path == "/" || path.is_empty() {
            return Ok(Object::root());
        }

        let candidates = resolve::candidates(&self.cipher, &self.root, path)?;
        let total = candidates.len();
        for (attempt, (remote_path, _)) in candidates.into_iter().enumerate() {
            match self.remote.stat(&remote_path).await {
                Ok(entry) => return Ok(self.lenient_decode(path, &entry)),
                Err(err) if err.is_not_found() && attempt + 1 < total => {
                    debug!(%path, "not found under first type guess, retrying as the opposite type");
                }
                Err(err) => return Err(err),
            }
        }
        Err(CloakError::NotFound(path.to_string()))
    }

    /// Open a file for random-access reading.
    pub async fn open(&self, path: &str) -> CloakResult<OverlayReader> {
        let remote_path = resolve::to_remote_path(&self.cipher, &self.root, path, false)?;
        let entry = self.remote.stat(&remote_path).await?;
        let plain_size = self.cipher.decrypted_size(entry.size)?;
        let link = self.remote.link(&remote_path).await?;
        let source = LinkSource::new(link, entry.size)?;

        Ok(OverlayReader {
            cipher: Arc::clone(&self.cipher),
            source,
            plain_size,
        })
    }

    /// Store a plaintext stream as an encrypted file.
    ///
    /// The content is encrypted on the fly as the remote pulls it; name and
    /// size are translated to their ciphertext forms before handoff.
    pub async fn put<R>(&self, dir: &str, name: &str, size: u64, content: R) -> CloakResult<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let remote_dir = resolve::to_remote_path(&self.cipher, &self.root, dir, true)?;
        let encrypted_name = self.cipher.encrypt_file_name(name)?;
        let encrypted_size = self.cipher.encrypted_size(size);
        let stream = self.cipher.encrypt_stream(content);
        self.remote
            .put(&remote_dir, &encrypted_name, encrypted_size, Box::new(stream))
            .await
    }

    pub async fn make_dir(&self, parent: &str, name: &str) -> CloakResult<()> {
        let parent_remote = resolve::to_remote_path(&self.cipher, &self.root, parent, true)?;
        let encrypted = self.cipher.encrypt_dir_name(name)?;
        self.remote
            .make_dir(&join_path(&parent_remote, &encrypted))
            .await
    }

    pub async fn rename(&self, path: &str, is_dir: bool, new_name: &str) -> CloakResult<()> {
        let remote_path = resolve::to_remote_path(&self.cipher, &self.root, path, is_dir)?;
        let encrypted = if is_dir {
            self.cipher.encrypt_dir_name(new_name)?
        } else {
            self.cipher.encrypt_file_name(new_name)?
        };
        self.remote.rename(&remote_path, &encrypted).await
    }

    pub async fn move_to(&self, src: &str, src_is_dir: bool, dst_dir: &str) -> CloakResult<()> {
        let src_remote = resolve::to_remote_path(&self.cipher, &self.root, src, src_is_dir)?;
        let dst_remote = resolve::to_remote_path(&self.cipher, &self.root, dst_dir, true)?;
        self.remote.move_to(&src_remote, &dst_remote).await
    }

    pub async fn copy_to(&self, src: &str, src_is_dir: bool, dst_dir: &str) -> CloakResult<()> {
        let src_remote = resolve::to_remote_path(&self.cipher, &self.root, src, src_is_dir)?;
        let dst_remote = resolve::to_remote_path(&self.cipher, &self.root, dst_dir, true)?;
        self.remote.copy_to(&src_remote, &dst_remote).await
    }

    pub async fn remove(&self, path: &str, is_dir: bool) -> CloakResult<()> {
        let remote_path = resolve::to_remote_path(&self.cipher, &self.root, path, is_dir)?;
        self.remote.remove(&remote_path).await
    }

    /// Strict decode for listings: any failure marks the entry foreign.
    fn decode_entry(&self, dir: &str, entry: &RemoteEntry) -> CloakResult<Object> {
        let (name, size) = if entry.is_dir {
            (self.cipher.decrypt_dir_name(&entry.name)?, 0)
        } else {
            let size = self.cipher.decrypted_size(entry.size)?;
            (self.cipher.decrypt_file_name(&entry.name)?, size)
        };
        Ok(Object {
            path: join_path(dir, &name),
            name,
            size,
            modified: entry.modified,
            is_dir: entry.is_dir,
            thumbnail: entry.thumbnail.clone(),
        })
    }

    /// Lenient decode for `get`: a stat that reached a real object should
    /// not fail just because decoding does, so fall back to the stored
    /// name/size with a warning.
    fn lenient_decode(&self, path: &str, entry: &RemoteEntry) -> Object {
        let (name, size) = if entry.is_dir {
            let name = match self.cipher.decrypt_dir_name(&entry.name) {
                Ok(name) => name,
                Err(err) => {
                    warn!(%path, %err, "directory name failed to decode, using stored name");
                    entry.name.clone()
                }
            };
            (name, 0)
        } else {
            let size = match self.cipher.decrypted_size(entry.size) {
                Ok(size) => size,
                Err(err) => {
                    warn!(%path, %err, "size failed to decode, using stored size");
                    entry.size
                }
            };
            let name = match self.cipher.decrypt_file_name(&entry.name) {
                Ok(name) => name,
                Err(err) => {
                    warn!(%path, %err, "file name failed to decode, using stored name");
                    entry.name.clone()
                }
            };
            (name, size)
        };
        Object {
            path: path.to_string(),
            name,
            size,
            modified: entry.modified,
            is_dir: entry.is_dir,
            thumbnail: entry.thumbnail.clone(),
        }
    }
}

/// An open file: a handle the caller can issue arbitrary plaintext range
/// reads against. Each call is independent; concurrent calls against one
/// reader do not share decrypt state.
pub struct OverlayReader {
    cipher: Arc<Cipher>,
    source: LinkSource,
    plain_size: u64,
}

impl OverlayReader {
    /// Plaintext size of the file.
    pub fn size(&self) -> u64 {
        self.plain_size
    }

    /// Read `[offset, offset + length)` of the plaintext, or to end when
    /// `length` is `None`. Requests running past the end of the file are
    /// clamped to to-end reads.
    pub async fn read_range(
        &self,
        offset: u64,
        length: Option<u64>,
    ) -> CloakResult<Box<dyn AsyncRead + Send + Unpin>> {
        let length = match length {
            Some(len) if offset + len >= self.plain_size => None,
            other => other,
        };
        self.cipher.open_range(&self.source, offset, length).await
    }
}
