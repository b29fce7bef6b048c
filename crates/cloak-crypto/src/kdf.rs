//! Key derivation: Argon2id (password, salt) → master key

use argon2::{Algorithm, Argon2, Params, Version};
use cloak_core::KdfSettings;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit master key derived from the configured password and salt.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the master key from a password and a salt string via Argon2id.
///
/// The salt is a user-chosen string of any length (including empty), so it
/// is first compressed to 16 bytes with SHA-256; Argon2 then sees a
/// fixed-size salt regardless of what the user typed. Same password + same
/// salt always yields the same key.
pub fn derive_master_key(
    password: &SecretString,
    salt: &str,
    params: &KdfSettings,
) -> anyhow::Result<MasterKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| anyhow::anyhow!("invalid Argon2id params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let salt_digest = Sha256::digest(salt.as_bytes());
    let mut salt_bytes = [0u8; 16];
    salt_bytes.copy_from_slice(&salt_digest[..16]);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), &salt_bytes, &mut key)
        .map_err(|e| anyhow::anyhow!("Argon2id KDF failed: {e}"))?;

    Ok(MasterKey::from_bytes(key))
}
