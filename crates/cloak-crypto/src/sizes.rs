//! Plaintext-size ↔ ciphertext-size transform
//!
//! An encrypted file is `[32-byte header][chunks]` where every chunk carries
//! a 16-byte tag on top of at most 64 KiB of plaintext, so:
//!
//! ```text
//! ciphertext_size = 32 + ceil(plaintext_size / 65536) * 16 + plaintext_size
//! ```
//!
//! with the empty file as the degenerate case (header only). The inverse
//! must reject impossible sizes, because a ciphertext size that does not
//! fit the layout means the remote object was never written by us.

use cloak_core::{CloakError, CloakResult};

use crate::{BLOCK_SIZE, HEADER_SIZE, TAG_SIZE};

const CHUNK_SIZE: u64 = (BLOCK_SIZE + TAG_SIZE) as u64;

/// Ciphertext size of a plaintext of `plain` bytes.
pub fn encrypted_size(plain: u64) -> u64 {
    let full_chunks = plain / BLOCK_SIZE as u64;
    let rest = plain % BLOCK_SIZE as u64;
    let mut size = HEADER_SIZE as u64 + full_chunks * CHUNK_SIZE;
    if rest > 0 {
        size += rest + TAG_SIZE as u64;
    }
    size
}

/// Plaintext size of a ciphertext of `cipher` bytes.
///
/// Fails with `CloakError::InvalidSize` when no plaintext length could have
/// produced `cipher`: smaller than the header, or a final fragment of
/// 1..=16 bytes (a chunk can never be tag-only).
pub fn decrypted_size(cipher: u64) -> CloakResult<u64> {
    let body = cipher
        .checked_sub(HEADER_SIZE as u64)
        .ok_or(CloakError::InvalidSize(cipher))?;

    let full_chunks = body / CHUNK_SIZE;
    let rest = body % CHUNK_SIZE;
    let mut plain = full_chunks * BLOCK_SIZE as u64;
    if rest > 0 {
        plain += rest
            .checked_sub(TAG_SIZE as u64 + 1)
            .ok_or(CloakError::InvalidSize(cipher))?
            + 1;
    }
    Ok(plain)
}
