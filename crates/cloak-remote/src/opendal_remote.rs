//! OpenDAL-backed remote for S3-compatible object stores
//!
//! Directories are prefix markers (keys with a trailing `/`), which is why
//! `stat` probes the file key first and falls back to the marker, and why
//! directory rename/move/copy walk the prefix object by object, since S3 has no
//! atomic tree operations.

use async_trait::async_trait;
use cloak_core::{CloakError, CloakResult, RemoteSettings};
use opendal::{ErrorKind, Metadata, Operator};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::debug;

use crate::link::{RangeReader, RemoteLink};
use crate::{Remote, RemoteEntry};

pub struct OpendalRemote {
    op: Operator,
}

impl OpendalRemote {
    /// Build an operator for any S3-compatible endpoint.
    ///
    /// Path-style addressing (the opendal default) is required by MinIO and
    /// SeaweedFS, so no virtual-host style here.
    pub fn new(settings: &RemoteSettings) -> CloakResult<Self> {
        let builder = opendal::services::S3::default()
            .endpoint(&settings.endpoint)
            .region(&settings.region)
            .bucket(&settings.bucket)
            .access_key_id(&settings.access_key_id)
            .secret_access_key(&settings.secret_access_key);

        let op = Operator::new(builder)
            .map_err(|e| CloakError::Config(format!("creating S3 operator: {e}")))?
            .layer(opendal::layers::LoggingLayer::default())
            .layer(
                opendal::layers::RetryLayer::new()
                    .with_max_times(5)
                    .with_jitter(),
            )
            .finish();

        Ok(Self { op })
    }

    /// Wrap an existing operator (any opendal service).
    pub fn from_operator(op: Operator) -> Self {
        Self { op }
    }

    async fn copy_tree(&self, src: &str, dst: &str) -> CloakResult<()> {
        // src and dst are dir keys with a trailing '/'
        self.op
            .create_dir(dst)
            .await
            .map_err(|e| map_err(dst, e))?;
        let entries = self
            .op
            .list_with(src)
            .recursive(true)
            .await
            .map_err(|e| map_err(src, e))?;
        for entry in entries {
            let rel = &entry.path()[src.len()..];
            if rel.is_empty() {
                continue;
            }
            let target = format!("{dst}{rel}");
            if entry.metadata().mode().is_dir() {
                self.op
                    .create_dir(&target)
                    .await
                    .map_err(|e| map_err(&target, e))?;
            } else {
                self.op
                    .copy(entry.path(), &target)
                    .await
                    .map_err(|e| map_err(entry.path(), e))?;
            }
        }
        Ok(())
    }
}

/// Key of a file at `path` ("/a/b" → "a/b").
fn file_key(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Key of a directory at `path` ("/a/b" → "a/b/", "/" → "").
fn dir_key(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

fn leaf(path: &str) -> &str {
    path.trim_matches('/').rsplit('/').next().unwrap_or("")
}

fn parent_key(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => format!("{}/", &trimmed[..idx]),
        None => String::new(),
    }
}

fn map_err(path: &str, err: opendal::Error) -> CloakError {
    if err.kind() == ErrorKind::NotFound {
        CloakError::NotFound(path.to_string())
    } else {
        CloakError::Remote(err.to_string())
    }
}

fn entry_from_meta(name: &str, meta: &Metadata) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        size: meta.content_length(),
        modified: meta
            .last_modified()
            .map(|ts| chrono::DateTime::<chrono::Utc>::from(std::time::SystemTime::from(ts))),
        is_dir: meta.mode().is_dir(),
        thumbnail: None,
    }
}

struct OpendalRangeReader {
    op: Operator,
    key: String,
    size: u64,
}

#[async_trait]
impl RangeReader for OpendalRangeReader {
    async fn read_range(
        &self,
        offset: u64,
        length: Option<u64>,
    ) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        if offset >= self.size {
            return Ok(Box::new(tokio::io::empty()));
        }
        let end = match length {
            Some(len) => (offset + len).min(self.size),
            None => self.size,
        };
        let reader = self
            .op
            .reader(&self.key)
            .await
            .map_err(std::io::Error::other)?;
        let ranged = reader
            .into_futures_async_read(offset..end)
            .await
            .map_err(std::io::Error::other)?;
        Ok(Box::new(ranged.compat()))
    }
}

#[async_trait]
impl Remote for OpendalRemote {
    async fn list(&self, dir: &str) -> CloakResult<Vec<RemoteEntry>> {
        let key = dir_key(dir);
        let entries = self.op.list(&key).await.map_err(|e| map_err(dir, e))?;
        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.path() == key {
                // listings include the directory itself
                continue;
            }
            let name = entry.name().trim_end_matches('/');
            result.push(entry_from_meta(name, entry.metadata()));
        }
        Ok(result)
    }

    async fn stat(&self, path: &str) -> CloakResult<RemoteEntry> {
        let key = file_key(path);
        match self.op.stat(&key).await {
            Ok(meta) => Ok(entry_from_meta(leaf(path), &meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // maybe it's a directory marker
                let marker = format!("{key}/");
                let meta = self.op.stat(&marker).await.map_err(|e| map_err(path, e))?;
                Ok(entry_from_meta(leaf(path), &meta))
            }
            Err(e) => Err(map_err(path, e)),
        }
    }

    async fn link(&self, path: &str) -> CloakResult<RemoteLink> {
        let key = file_key(path);
        let meta = self.op.stat(&key).await.map_err(|e| map_err(path, e))?;
        Ok(RemoteLink::Range(Box::new(OpendalRangeReader {
            op: self.op.clone(),
            key,
            size: meta.content_length(),
        })))
    }

    async fn put(
        &self,
        dir: &str,
        name: &str,
        size: u64,
        mut content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> CloakResult<()> {
        let key = format!("{}{name}", dir_key(dir));
        debug!(key = %key, size, "uploading");
        let mut writer = self.op.writer(&key).await.map_err(|e| map_err(&key, e))?;
        let mut buf = vec![0u8; 256 * 1024];
        loop {
            let n = content.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer
                .write(bytes::Bytes::copy_from_slice(&buf[..n]))
                .await
                .map_err(|e| map_err(&key, e))?;
        }
        writer.close().await.map_err(|e| map_err(&key, e))?;
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> CloakResult<()> {
        let key = dir_key(path);
        self.op.create_dir(&key).await.map_err(|e| map_err(path, e))
    }

    async fn rename(&self, path: &str, new_name: &str) -> CloakResult<()> {
        let entry = self.stat(path).await?;
        let target = format!("{}{new_name}", parent_key(path));
        if entry.is_dir {
            let src = dir_key(path);
            let dst = format!("{target}/");
            self.copy_tree(&src, &dst).await?;
            self.op.remove_all(&src).await.map_err(|e| map_err(path, e))
        } else {
            let key = file_key(path);
            self.op
                .rename(&key, &target)
                .await
                .map_err(|e| map_err(path, e))
        }
    }

    async fn move_to(&self, src: &str, dst_dir: &str) -> CloakResult<()> {
        let entry = self.stat(src).await?;
        let target = format!("{}{}", dir_key(dst_dir), leaf(src));
        if entry.is_dir {
            let src_key = dir_key(src);
            let dst_key = format!("{target}/");
            self.copy_tree(&src_key, &dst_key).await?;
            self.op
                .remove_all(&src_key)
                .await
                .map_err(|e| map_err(src, e))
        } else {
            self.op
                .rename(&file_key(src), &target)
                .await
                .map_err(|e| map_err(src, e))
        }
    }

    async fn copy_to(&self, src: &str, dst_dir: &str) -> CloakResult<()> {
        let entry = self.stat(src).await?;
        let target = format!("{}{}", dir_key(dst_dir), leaf(src));
        if entry.is_dir {
            self.copy_tree(&dir_key(src), &format!("{target}/")).await
        } else {
            self.op
                .copy(&file_key(src), &target)
                .await
                .map_err(|e| map_err(src, e))
        }
    }

    async fn remove(&self, path: &str) -> CloakResult<()> {
        let entry = self.stat(path).await?;
        if entry.is_dir {
            let key = dir_key(path);
            self.op.remove_all(&key).await.map_err(|e| map_err(path, e))
        } else {
            self.op
                .delete(&file_key(path))
                .await
                .map_err(|e| map_err(path, e))
        }
    }
}
