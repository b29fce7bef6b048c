//! Obfuscation-at-rest for stored credentials
//!
//! The config file must never hold the password or salt in the clear, but
//! the overlay has to recover the exact plaintext to derive keys from it,
//! so this is reversible obfuscation, not hashing: XChaCha20-Poly1305 under
//! a fixed built-in key with a random nonce, base64-encoded and tagged with
//! a marker prefix. It keeps credentials out of casual view (shoulder
//! surfing, config files pasted into bug reports); anyone with this source
//! can reverse it.

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::NONCE_SIZE;

/// Prefix marking a value as obfuscated.
pub const MARKER: &str = "!obf!";

// Fixed key: this only guards against accidental disclosure, see module doc.
const OBSCURE_KEY: [u8; 32] = [
    0x9c, 0x35, 0x4f, 0x83, 0x6d, 0x12, 0xe1, 0x47, 0x2a, 0xb0, 0x58, 0xc9, 0x3e, 0x71, 0x06,
    0xfa, 0x44, 0x8d, 0x27, 0x9b, 0x65, 0xd3, 0x1c, 0xe8, 0x52, 0xaf, 0x04, 0x76, 0xc1, 0x38,
    0x90, 0x5e,
];

pub fn is_obscured(value: &str) -> bool {
    value.starts_with(MARKER)
}

/// Obfuscate a credential for storage. Already-marked values pass through.
pub fn obscure(value: &str) -> anyhow::Result<String> {
    if is_obscured(value) {
        return Ok(value.to_string());
    }
    let cipher = XChaCha20Poly1305::new((&OBSCURE_KEY).into());
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), value.as_bytes())
        .map_err(|e| anyhow::anyhow!("credential obfuscation failed: {e}"))?;

    let mut packed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&ciphertext);
    Ok(format!("{MARKER}{}", BASE64_URL_SAFE_NO_PAD.encode(packed)))
}

/// Recover the plaintext credential. Unmarked values are returned as-is, so
/// a config written by hand keeps working until the first rewrite marks it.
pub fn reveal(value: &str) -> anyhow::Result<String> {
    let Some(encoded) = value.strip_prefix(MARKER) else {
        return Ok(value.to_string());
    };
    let packed = BASE64_URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| anyhow::anyhow!("obfuscated credential is not valid base64: {e}"))?;
    if packed.len() < NONCE_SIZE {
        anyhow::bail!("obfuscated credential too short: {} bytes", packed.len());
    }
    let (nonce_bytes, ciphertext) = packed.split_at(NONCE_SIZE);

    let cipher = XChaCha20Poly1305::new((&OBSCURE_KEY).into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| anyhow::anyhow!("obfuscated credential failed to decode"))?;

    String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("credential is not UTF-8: {e}"))
}
