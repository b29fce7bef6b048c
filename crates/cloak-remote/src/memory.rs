//! In-process remote backend for tests
//!
//! A plain tree of directories and byte blobs behind a mutex. Links are
//! served through the seekable shape by default so tests exercise the
//! shared-handle path of the adapter; `with_range_links` switches to the
//! native range shape, and `with_empty_url_links` produces a deliberately
//! useless link for capability-error tests.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloak_core::{CloakError, CloakResult};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::link::{RangeReader, RemoteLink, SeekRead};
use crate::{Remote, RemoteEntry};

#[derive(Clone, Copy)]
enum LinkStyle {
    Seekable,
    Range,
    EmptyUrl,
}

#[derive(Clone)]
enum Node {
    Dir,
    File { data: Bytes, modified: DateTime<Utc> },
}

pub struct MemoryRemote {
    nodes: Mutex<BTreeMap<String, Node>>,
    link_style: LinkStyle,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            link_style: LinkStyle::Seekable,
        }
    }

    /// Serve links through the native range-reader shape.
    pub fn with_range_links() -> Self {
        Self {
            link_style: LinkStyle::Range,
            ..Self::new()
        }
    }

    /// Serve links that carry no usable capability.
    pub fn with_empty_url_links() -> Self {
        Self {
            link_style: LinkStyle::EmptyUrl,
            ..Self::new()
        }
    }

    /// Drop a file into the tree directly, bypassing the overlay. Used by
    /// tests to plant foreign (non-encrypted) objects.
    pub fn insert_raw(&self, path: &str, data: impl Into<Bytes>) {
        let path = normalize(path);
        let mut nodes = self.nodes.lock().unwrap();
        ensure_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File {
                data: data.into(),
                modified: Utc::now(),
            },
        );
    }

    fn get_file(&self, path: &str) -> CloakResult<Bytes> {
        let path = normalize(path);
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir) => Err(CloakError::Remote(format!("{path} is a directory"))),
            None => Err(CloakError::NotFound(path)),
        }
    }

    /// All keys equal to `path` or beneath it.
    fn subtree(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        nodes
            .keys()
            .filter(|k| *k == path || k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let mut current = String::new();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        current.push('/');
        current.push_str(segment);
        nodes.entry(current.clone()).or_insert(Node::Dir);
    }
}

fn entry_for(path: &str, node: &Node) -> RemoteEntry {
    match node {
        Node::Dir => RemoteEntry {
            name: leaf(path).to_string(),
            size: 0,
            modified: None,
            is_dir: true,
            thumbnail: None,
        },
        Node::File { data, modified } => RemoteEntry {
            name: leaf(path).to_string(),
            size: data.len() as u64,
            modified: Some(*modified),
            is_dir: false,
            thumbnail: None,
        },
    }
}

struct MemRangeReader {
    data: Bytes,
}

#[async_trait]
impl RangeReader for MemRangeReader {
    async fn read_range(
        &self,
        offset: u64,
        length: Option<u64>,
    ) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        let start = (offset as usize).min(self.data.len());
        let end = match length {
            Some(len) => (start + len as usize).min(self.data.len()),
            None => self.data.len(),
        };
        Ok(Box::new(Cursor::new(self.data.slice(start..end))))
    }
}

#[async_trait]
impl Remote for MemoryRemote {
    async fn list(&self, dir: &str) -> CloakResult<Vec<RemoteEntry>> {
        let dir = normalize(dir);
        let nodes = self.nodes.lock().unwrap();
        if dir != "/" && !matches!(nodes.get(&dir), Some(Node::Dir)) {
            return Err(CloakError::NotFound(dir));
        }
        let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
        let entries = nodes
            .iter()
            .filter(|(path, _)| {
                path.starts_with(&prefix) && !path[prefix.len()..].contains('/')
            })
            .map(|(path, node)| entry_for(path, node))
            .collect();
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> CloakResult<RemoteEntry> {
        let path = normalize(path);
        if path == "/" {
            return Ok(RemoteEntry {
                name: String::new(),
                size: 0,
                modified: None,
                is_dir: true,
                thumbnail: None,
            });
        }
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(&path)
            .map(|node| entry_for(&path, node))
            .ok_or(CloakError::NotFound(path))
    }

    async fn link(&self, path: &str) -> CloakResult<RemoteLink> {
        let data = self.get_file(path)?;
        Ok(match self.link_style {
            LinkStyle::Seekable => {
                let handle: Box<dyn SeekRead> = Box::new(Cursor::new(data.to_vec()));
                RemoteLink::Seekable(Arc::new(tokio::sync::Mutex::new(handle)))
            }
            LinkStyle::Range => RemoteLink::Range(Box::new(MemRangeReader { data })),
            LinkStyle::EmptyUrl => RemoteLink::Url {
                url: String::new(),
                headers: Vec::new(),
                expiration: None,
            },
        })
    }

    async fn put(
        &self,
        dir: &str,
        name: &str,
        size: u64,
        mut content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> CloakResult<()> {
        let mut data = Vec::with_capacity(size as usize);
        content.read_to_end(&mut data).await?;
        let path = normalize(&format!("{}/{name}", normalize(dir)));
        let mut nodes = self.nodes.lock().unwrap();
        ensure_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File {
                data: Bytes::from(data),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> CloakResult<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.lock().unwrap();
        ensure_parents(&mut nodes, &path);
        nodes.insert(path, Node::Dir);
        Ok(())
    }

    async fn rename(&self, path: &str, new_name: &str) -> CloakResult<()> {
        let path = normalize(path);
        let parent = match path.rfind('/') {
            Some(0) => "",
            Some(idx) => &path[..idx],
            None => "",
        };
        let target = format!("{parent}/{new_name}");
        self.remap(&path, &target, true).await
    }

    async fn move_to(&self, src: &str, dst_dir: &str) -> CloakResult<()> {
        let src = normalize(src);
        let target = normalize(&format!("{}/{}", normalize(dst_dir), leaf(&src)));
        self.remap(&src, &target, true).await
    }

    async fn copy_to(&self, src: &str, dst_dir: &str) -> CloakResult<()> {
        let src = normalize(src);
        let target = normalize(&format!("{}/{}", normalize(dst_dir), leaf(&src)));
        self.remap(&src, &target, false).await
    }

    async fn remove(&self, path: &str) -> CloakResult<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.lock().unwrap();
        let keys = Self::subtree(&nodes, &path);
        if keys.is_empty() {
            return Err(CloakError::NotFound(path));
        }
        for key in keys {
            nodes.remove(&key);
        }
        Ok(())
    }
}

impl MemoryRemote {
    async fn remap(&self, src: &str, target: &str, delete_src: bool) -> CloakResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let keys = Self::subtree(&nodes, src);
        if keys.is_empty() {
            return Err(CloakError::NotFound(src.to_string()));
        }
        ensure_parents(&mut nodes, target);
        for key in keys {
            let node = if delete_src {
                nodes.remove(&key).unwrap()
            } else {
                nodes.get(&key).unwrap().clone()
            };
            let new_key = format!("{target}{}", &key[src.len()..]);
            nodes.insert(new_key, node);
        }
        Ok(())
    }
}
