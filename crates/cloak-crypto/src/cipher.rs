//! The assembled cipher: one immutable object the whole overlay shares
//!
//! Built once from the validated settings at overlay initialization and
//! shared read-only (wrap it in an `Arc`). Rebuilding it is the only way to
//! change any cipher parameter.

use cloak_core::{CipherSettings, CloakError, CloakResult, KdfSettings, NameMode};
use secrecy::SecretString;
use tokio::io::AsyncRead;
use zeroize::Zeroize;

use crate::kdf::derive_master_key;
use crate::keys::{derive_content_key, derive_name_key};
use crate::names::{decrypt_segment, encrypt_segment};
use crate::obscure::reveal;
use crate::sizes;
use crate::stream::{ContentCipher, RangeSource};
use crate::KEY_SIZE;

pub struct Cipher {
    name_key: [u8; KEY_SIZE],
    content: ContentCipher,
    file_mode: NameMode,
    dir_mode: NameMode,
    suffix: String,
}

impl Cipher {
    /// Derive the full key hierarchy from the configured credentials.
    ///
    /// Fails on a malformed suffix or undecodable credentials; both are
    /// configuration errors and fatal at initialization.
    pub fn new(settings: &CipherSettings, kdf: &KdfSettings) -> CloakResult<Self> {
        settings.validate_suffix()?;

        let password = reveal(&settings.password)
            .map_err(|e| CloakError::Config(format!("password: {e}")))?;
        let salt =
            reveal(&settings.salt).map_err(|e| CloakError::Config(format!("salt: {e}")))?;

        let master = derive_master_key(&SecretString::from(password), &salt, kdf)
            .map_err(CloakError::Other)?;
        let name_key = derive_name_key(&master).map_err(CloakError::Other)?;
        let mut content_key = derive_content_key(&master).map_err(CloakError::Other)?;
        let content = ContentCipher::new(&content_key);
        content_key.zeroize();

        let dir_mode = if settings.encrypt_dir_names {
            settings.filename_mode
        } else {
            NameMode::Off
        };

        Ok(Self {
            name_key,
            content,
            file_mode: settings.filename_mode,
            dir_mode,
            suffix: settings.suffix.clone(),
        })
    }

    /// Encrypt a file name and append the configured suffix.
    pub fn encrypt_file_name(&self, name: &str) -> CloakResult<String> {
        let encrypted = encrypt_segment(&self.name_key, self.file_mode, name)?;
        Ok(format!("{encrypted}{}", self.suffix))
    }

    /// Strip and validate the suffix, then decrypt the file name.
    pub fn decrypt_file_name(&self, name: &str) -> CloakResult<String> {
        let stripped = name
            .strip_suffix(&self.suffix)
            .ok_or_else(|| CloakError::InvalidName(name.to_string()))?;
        decrypt_segment(&self.name_key, self.file_mode, stripped)
    }

    pub fn encrypt_dir_name(&self, name: &str) -> CloakResult<String> {
        Ok(encrypt_segment(&self.name_key, self.dir_mode, name)?)
    }

    pub fn decrypt_dir_name(&self, name: &str) -> CloakResult<String> {
        decrypt_segment(&self.name_key, self.dir_mode, name)
    }

    pub fn encrypted_size(&self, plain: u64) -> u64 {
        sizes::encrypted_size(plain)
    }

    pub fn decrypted_size(&self, cipher: u64) -> CloakResult<u64> {
        sizes::decrypted_size(cipher)
    }

    /// See [`ContentCipher::encrypt`].
    pub fn encrypt_stream<R>(&self, plaintext: R) -> impl AsyncRead + Send + Unpin
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.content.encrypt(plaintext)
    }

    /// See [`ContentCipher::open_range`].
    pub async fn open_range(
        &self,
        source: &dyn RangeSource,
        offset: u64,
        length: Option<u64>,
    ) -> CloakResult<Box<dyn AsyncRead + Send + Unpin>> {
        self.content.open_range(source, offset, length).await
    }
}

impl Drop for Cipher {
    fn drop(&mut self) {
        self.name_key.zeroize();
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("file_mode", &self.file_mode)
            .field("dir_mode", &self.dir_mode)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}
