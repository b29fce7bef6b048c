use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plaintext view of a remote object, as exposed to the calling layer.
///
/// Built fresh on every list/get call and discarded with the response;
/// nothing here is cached across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    /// Logical (plaintext) path, always `/`-separated and absolute.
    pub path: String,
    /// Plaintext name of the final segment.
    pub name: String,
    /// Plaintext size in bytes; zero for directories.
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
    /// Thumbnail URL carried through from the remote, if it reported one.
    pub thumbnail: Option<String>,
}

impl Object {
    /// The synthetic root directory. Never involves the remote.
    pub fn root() -> Self {
        Self {
            path: "/".into(),
            name: "Root".into(),
            size: 0,
            modified: None,
            is_dir: true,
            thumbnail: None,
        }
    }
}

/// Join a logical directory path and a child name into a logical path.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Split a logical path into (parent, final segment).
///
/// `"/a/b/c"` → `("/a/b", "c")`; `"/c"` → `("/", "c")`.
pub fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("/", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_object_shape() {
        let root = Object::root();
        assert_eq!(root.name, "Root");
        assert_eq!(root.path, "/");
        assert!(root.is_dir);
    }

    #[test]
    fn join_handles_root_and_nested() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a/b", "c"), "/a/b/c");
        assert_eq!(join_path("/a/b/", "c"), "/a/b/c");
    }

    #[test]
    fn split_returns_parent_and_leaf() {
        assert_eq!(split_path("/a/b/c"), ("/a/b", "c"));
        assert_eq!(split_path("/c"), ("/", "c"));
        assert_eq!(split_path("/a/b/"), ("/a", "b"));
    }
}
