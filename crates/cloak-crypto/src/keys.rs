//! Key hierarchy: master key → per-purpose derived keys

use hkdf::Hkdf;
use sha2::Sha256;

use crate::kdf::MasterKey;
use crate::KEY_SIZE;

/// Derive the filename encryption key (AES-SIV input) from the master key.
pub fn derive_name_key(master: &MasterKey) -> anyhow::Result<[u8; KEY_SIZE]> {
    hkdf_derive(master.as_bytes(), b"cloak-names")
}

/// Derive the content encryption key (chunk AEAD) from the master key.
pub fn derive_content_key(master: &MasterKey) -> anyhow::Result<[u8; KEY_SIZE]> {
    hkdf_derive(master.as_bytes(), b"cloak-content")
}

/// HKDF-SHA256 key derivation with a domain-specific info string.
fn hkdf_derive(ikm: &[u8; KEY_SIZE], info: &[u8]) -> anyhow::Result<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_master_key() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn domains_produce_different_keys() {
        let master = test_master_key();
        let name_key = derive_name_key(&master).unwrap();
        let content_key = derive_content_key(&master).unwrap();

        assert_ne!(
            name_key, content_key,
            "different domains must produce different keys"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let master = test_master_key();
        assert_eq!(
            derive_name_key(&master).unwrap(),
            derive_name_key(&master).unwrap()
        );
    }
}
