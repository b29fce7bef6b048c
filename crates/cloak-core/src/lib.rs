//! cloak-core: shared types, config schema, and error taxonomy for CloakFS
//!
//! CloakFS is an encrypted overlay that sits between a plaintext file-tree
//! API and an untrusted remote store. This crate holds the pieces every
//! other crate needs: the plaintext object model, the TOML config schema,
//! and the error taxonomy that separates "bad entry, skip it" from "remote
//! broke" from "ciphertext was tampered with".

pub mod config;
pub mod error;
pub mod types;

pub use config::{CipherSettings, CloakConfig, KdfSettings, NameMode, RemoteSettings};
pub use error::{CloakError, CloakResult};
pub use types::{join_path, split_path, Object};
