//! cloak-crypto: the CloakFS cipher
//!
//! Everything the overlay needs to turn plaintext names, sizes, and byte
//! streams into their ciphertext forms and back.
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, Argon2id from password + salt)
//!   ├── Name Key (HKDF from master key, domain="cloak-names", AES-SIV)
//!   └── Content Key (HKDF from master key, domain="cloak-content")
//!       └── Chunk AEAD: XChaCha20-Poly1305
//!           (nonce = file_nonce + chunk_index, AAD = chunk_index)
//! ```
//!
//! File stream layout:
//! ```text
//! [8 bytes: magic "CLOAKFS\0"][24 bytes: random file nonce]
//! [chunk_0]...[chunk_{n-1}]
//! chunk = up to 64 KiB plaintext sealed with a 16-byte Poly1305 tag
//! ```
//!
//! The per-chunk nonce derivation makes chunks independently decryptable,
//! which is what allows random-access reads without touching the rest of
//! the file.

pub mod cipher;
pub mod kdf;
pub mod keys;
pub mod names;
pub mod obscure;
pub mod sizes;
pub mod stream;

pub use cipher::Cipher;
pub use kdf::{derive_master_key, MasterKey};
pub use stream::{ContentCipher, RangeSource};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Plaintext bytes per encrypted chunk
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Magic prefix of every encrypted file
pub const MAGIC: &[u8; 8] = b"CLOAKFS\0";

/// Bytes before the first chunk: magic + file nonce
pub const HEADER_SIZE: usize = MAGIC.len() + NONCE_SIZE;
