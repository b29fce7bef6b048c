//! Name codec: deterministic, reversible encryption of single path segments
//!
//! Deterministic encryption (same name + key = same ciphertext) is required
//! so that listings stay stable and a logical path can be mapped to a remote
//! path without decrypting the whole tree. AES-SIV provides this with
//! authentication; the result is base32-encoded so it is valid on common
//! filesystems and object stores (lowercase, case-insensitive, no padding).
//!
//! The obfuscate mode is a keyed rotation within character classes. It is
//! reversible and deterministic but deliberately weak; it exists for users
//! who only need names hidden from casual browsing.

use aes_siv::{
    aead::{Aead, KeyInit},
    Aes256SivAead, Nonce,
};
use cloak_core::{CloakError, CloakResult, NameMode};

use crate::KEY_SIZE;

/// Encrypt one path segment under the given mode.
pub fn encrypt_segment(
    name_key: &[u8; KEY_SIZE],
    mode: NameMode,
    plaintext: &str,
) -> anyhow::Result<String> {
    match mode {
        NameMode::Off => Ok(plaintext.to_string()),
        NameMode::Standard => encrypt_standard(name_key, plaintext),
        NameMode::Obfuscate => Ok(rotate_segment(name_key, plaintext, Direction::Forward)),
    }
}

/// Decrypt one path segment under the given mode.
///
/// A segment that does not decode (bad base32, failed SIV authentication,
/// non-UTF-8 plaintext) yields `CloakError::InvalidName`; listing callers
/// treat that as "not an overlay member" and skip the entry.
pub fn decrypt_segment(
    name_key: &[u8; KEY_SIZE],
    mode: NameMode,
    ciphertext: &str,
) -> CloakResult<String> {
    match mode {
        NameMode::Off => Ok(ciphertext.to_string()),
        NameMode::Standard => decrypt_standard(name_key, ciphertext),
        NameMode::Obfuscate => Ok(rotate_segment(name_key, ciphertext, Direction::Backward)),
    }
}

fn encrypt_standard(name_key: &[u8; KEY_SIZE], plaintext: &str) -> anyhow::Result<String> {
    let cipher = siv_cipher(name_key)?;
    // Zero nonce keeps AES-SIV deterministic
    let nonce = Nonce::default();

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("name encryption failed: {e}"))?;

    Ok(base32::encode(&ciphertext))
}

fn decrypt_standard(name_key: &[u8; KEY_SIZE], encoded: &str) -> CloakResult<String> {
    let ciphertext = base32::decode(encoded)
        .map_err(|_| CloakError::InvalidName(encoded.to_string()))?;

    let cipher = siv_cipher(name_key).map_err(CloakError::Other)?;
    let nonce = Nonce::default();

    let plaintext = cipher
        .decrypt(&nonce, ciphertext.as_ref())
        .map_err(|_| CloakError::InvalidName(encoded.to_string()))?;

    String::from_utf8(plaintext).map_err(|_| CloakError::InvalidName(encoded.to_string()))
}

/// AES-256-SIV requires a 64-byte key (two 32-byte sub-keys); expand the
/// 32-byte name key with HKDF.
fn siv_cipher(name_key: &[u8; KEY_SIZE]) -> anyhow::Result<Aes256SivAead> {
    let mut double_key = [0u8; 64];
    let hkdf = hkdf::Hkdf::<sha2::Sha256>::new(None, name_key);
    hkdf.expand(b"cloak-name-aes-siv", &mut double_key)
        .map_err(|e| anyhow::anyhow!("HKDF expand for AES-SIV: {e}"))?;
    Ok(Aes256SivAead::new((&double_key).into()))
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// Keyed position-dependent rotation within character classes. ASCII
/// letters and digits rotate inside their class; everything else passes
/// through, so the result stays filesystem-safe whenever the input was.
fn rotate_segment(name_key: &[u8; KEY_SIZE], input: &str, dir: Direction) -> String {
    let seed: u32 = name_key.iter().map(|&b| u32::from(b)).sum();
    input
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let amount = (seed as i64) + (i as i64);
            let amount = match dir {
                Direction::Forward => amount,
                Direction::Backward => -amount,
            };
            rotate_char(c, amount)
        })
        .collect()
}

fn rotate_char(c: char, amount: i64) -> char {
    let rotate = |base: u8, span: i64| {
        let offset = (i64::from(c as u8 - base) + amount).rem_euclid(span);
        (base + offset as u8) as char
    };
    match c {
        'a'..='z' => rotate(b'a', 26),
        'A'..='Z' => rotate(b'A', 26),
        '0'..='9' => rotate(b'0', 10),
        _ => c,
    }
}

/// Unpadded RFC 4648 base32, lowercase on encode, case-insensitive on decode.
mod base32 {
    const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

    pub fn encode(data: &[u8]) -> String {
        let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
        let mut buffer: u64 = 0;
        let mut bits: u32 = 0;
        for &byte in data {
            buffer = (buffer << 8) | u64::from(byte);
            bits += 8;
            while bits >= 5 {
                bits -= 5;
                out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
            }
        }
        if bits > 0 {
            out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
        }
        out
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, String> {
        let mut out = Vec::with_capacity(s.len() * 5 / 8);
        let mut buffer: u64 = 0;
        let mut bits: u32 = 0;
        for c in s.chars() {
            let c = c.to_ascii_lowercase();
            let value = match c {
                'a'..='z' => c as u64 - 'a' as u64,
                '2'..='7' => c as u64 - '2' as u64 + 26,
                _ => return Err(format!("invalid base32 character {c:?}")),
            };
            buffer = (buffer << 5) | value;
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                out.push(((buffer >> bits) & 0xff) as u8);
            }
        }
        if bits > 0 && (buffer & ((1 << bits) - 1)) != 0 {
            return Err("non-zero trailing bits".into());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_name_key() -> [u8; KEY_SIZE] {
        [0x55u8; KEY_SIZE]
    }

    #[test]
    fn standard_roundtrip() {
        let key = test_name_key();
        let name = "my-photo.jpg";

        let encrypted = encrypt_segment(&key, NameMode::Standard, name).unwrap();
        assert_ne!(encrypted, name);
        let decrypted = decrypt_segment(&key, NameMode::Standard, &encrypted).unwrap();

        assert_eq!(decrypted, name);
    }

    #[test]
    fn standard_is_deterministic() {
        let key = test_name_key();
        let enc1 = encrypt_segment(&key, NameMode::Standard, "report.pdf").unwrap();
        let enc2 = encrypt_segment(&key, NameMode::Standard, "report.pdf").unwrap();

        assert_eq!(enc1, enc2, "AES-SIV must be deterministic");
    }

    #[test]
    fn standard_output_is_filesystem_safe() {
        let key = test_name_key();
        let encrypted = encrypt_segment(&key, NameMode::Standard, "weird name / with * stuff").unwrap();
        assert!(encrypted
            .chars()
            .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn standard_decode_is_case_insensitive() {
        let key = test_name_key();
        let encrypted = encrypt_segment(&key, NameMode::Standard, "notes.txt").unwrap();
        let upper = encrypted.to_ascii_uppercase();
        assert_eq!(
            decrypt_segment(&key, NameMode::Standard, &upper).unwrap(),
            "notes.txt"
        );
    }

    #[test]
    fn standard_rejects_garbage() {
        let key = test_name_key();
        let err = decrypt_segment(&key, NameMode::Standard, "not!base32").unwrap_err();
        assert!(matches!(err, CloakError::InvalidName(_)));

        // valid base32 but not a valid SIV ciphertext
        let err = decrypt_segment(&key, NameMode::Standard, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
            .unwrap_err();
        assert!(matches!(err, CloakError::InvalidName(_)));
    }

    #[test]
    fn standard_wrong_key_fails() {
        let encrypted = encrypt_segment(&[0x11u8; KEY_SIZE], NameMode::Standard, "secret.txt").unwrap();
        let result = decrypt_segment(&[0x22u8; KEY_SIZE], NameMode::Standard, &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn off_mode_is_identity() {
        let key = test_name_key();
        assert_eq!(encrypt_segment(&key, NameMode::Off, "plain.txt").unwrap(), "plain.txt");
        assert_eq!(decrypt_segment(&key, NameMode::Off, "plain.txt").unwrap(), "plain.txt");
    }

    #[test]
    fn obfuscate_roundtrip() {
        let key = test_name_key();
        let name = "Holiday Photos 2025.zip";

        let obfuscated = encrypt_segment(&key, NameMode::Obfuscate, name).unwrap();
        assert_ne!(obfuscated, name);
        let restored = decrypt_segment(&key, NameMode::Obfuscate, &obfuscated).unwrap();

        assert_eq!(restored, name);
    }

    #[test]
    fn obfuscate_keeps_separators() {
        let key = test_name_key();
        let obfuscated = encrypt_segment(&key, NameMode::Obfuscate, "a_b-c.txt").unwrap();
        assert_eq!(obfuscated.matches('.').count(), 1);
        assert_eq!(obfuscated.matches('_').count(), 1);
        assert_eq!(obfuscated.matches('-').count(), 1);
    }

    #[test]
    fn base32_known_vectors() {
        assert_eq!(base32::encode(b""), "");
        assert_eq!(base32::encode(b"f"), "my");
        assert_eq!(base32::encode(b"fo"), "mzxq");
        assert_eq!(base32::encode(b"foo"), "mzxw6");
        assert_eq!(base32::encode(b"foob"), "mzxw6yq");
        assert_eq!(base32::encode(b"fooba"), "mzxw6ytb");
        assert_eq!(base32::encode(b"foobar"), "mzxw6ytboi");
    }

    proptest! {
        #[test]
        fn standard_roundtrip_any_name(name in "[^/\\x00]{1,64}") {
            let key = test_name_key();
            let encrypted = encrypt_segment(&key, NameMode::Standard, &name).unwrap();
            let decrypted = decrypt_segment(&key, NameMode::Standard, &encrypted).unwrap();
            prop_assert_eq!(decrypted, name);
        }

        #[test]
        fn obfuscate_roundtrip_any_name(name in "[^/\\x00]{1,64}") {
            let key = test_name_key();
            let obfuscated = encrypt_segment(&key, NameMode::Obfuscate, &name).unwrap();
            let restored = decrypt_segment(&key, NameMode::Obfuscate, &obfuscated).unwrap();
            prop_assert_eq!(restored, name);
        }

        #[test]
        fn base32_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..=128)) {
            let encoded = base32::encode(&data);
            let decoded = base32::decode(&encoded).unwrap();
            prop_assert_eq!(decoded, data);
        }
    }
}
