use serde::{Deserialize, Serialize};

use crate::error::{CloakError, CloakResult};

/// Filename encryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMode {
    /// No obfuscation; names pass through unchanged.
    Off,
    /// Deterministic AES-SIV encryption, base32-encoded.
    Standard,
    /// Lightweight reversible rotation. Hides names from casual browsing
    /// only; not cryptographically strong.
    Obfuscate,
}

impl Default for NameMode {
    fn default() -> Self {
        NameMode::Standard
    }
}

/// Top-level overlay configuration (loaded from cloak.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloakConfig {
    pub remote: RemoteSettings,
    pub cipher: CipherSettings,
    pub kdf: KdfSettings,
    /// Log level (default: info)
    pub log_level: String,
}

/// Remote backend the overlay mounts on top of.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Prefix inside the bucket the encrypted tree lives under
    pub root: String,
}

/// Cipher settings. Immutable once the overlay is initialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherSettings {
    /// Password, stored in obfuscated-at-rest form (see cloak-crypto's
    /// obscure module). Plaintext values are accepted and re-marked.
    pub password: String,
    /// Salt for key derivation, stored like the password.
    pub salt: String,
    /// Filename encryption mode for files.
    pub filename_mode: NameMode,
    /// Whether directory names are encrypted too.
    pub encrypt_dir_names: bool,
    /// Suffix appended to encrypted file names, e.g. ".bin".
    pub suffix: String,
}

/// Argon2id cost parameters for the password KDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfSettings {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "cloak".into(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            root: String::new(),
        }
    }
}

impl Default for CipherSettings {
    fn default() -> Self {
        Self {
            password: String::new(),
            salt: String::new(),
            filename_mode: NameMode::Standard,
            encrypt_dir_names: true,
            suffix: ".bin".into(),
        }
    }
}

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl CloakConfig {
    /// Load and parse a config file. Both failure shapes are configuration
    /// errors, fatal at initialization.
    pub fn load(path: &std::path::Path) -> CloakResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CloakError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| CloakError::Config(format!("parsing {}: {e}", path.display())))
    }
}

impl CipherSettings {
    /// Validate the configured suffix: `.` followed by at least two
    /// alphanumeric/`-`/`_` characters. Fatal at initialization.
    pub fn validate_suffix(&self) -> CloakResult<()> {
        let rest = self
            .suffix
            .strip_prefix('.')
            .ok_or_else(|| CloakError::Config(format!("suffix {:?} must start with '.'", self.suffix)))?;
        if rest.len() < 2 || !rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CloakError::Config(format!(
                "suffix {:?} must be '.' followed by 2+ alphanumeric/-/_ characters",
                self.suffix
            )));
        }
        Ok(())
    }
}
