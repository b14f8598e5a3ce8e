//! Symmetric encryption of secrets before they reach storage.
//!
//! Every token kept by the proxy (SSO tokens, cluster tokens, VCS tokens and VCS client secrets)
//! passes through a [`Cipher`] before being persisted and is only decrypted at the point of use.
//!
//! Secrets are encrypted with AES-256-GCM.
//! Each ciphertext is prefixed with the random nonce used to produce it.
//!
//! ## Key material
//!
//! The 256 bit key is loaded once at process start, see [`load_key`], from one of:
//!
//! - An inline, hex encoded, configuration value.
//! - A file on an operator provisioned volume (raw 32 bytes or hex text).
//!
//! Failing to load a valid key is a fatal configuration error.
use std::path::Path;
use std::sync::Arc;

use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use anyhow::Context;
use anyhow::Result;
use rand::RngCore;

/// Length, in bytes, of the encryption key.
pub const KEY_LENGTH: usize = 32;

/// Length, in bytes, of the nonce prefixed to each ciphertext.
pub const NONCE_LENGTH: usize = 12;

/// Errors loading key material or processing secrets.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The ciphertext could not be decrypted with the configured key.
    #[error("unable to decrypt secret with the configured key")]
    Decrypt,

    /// The plaintext could not be encrypted.
    #[error("unable to encrypt secret")]
    Encrypt,

    /// The key material is not a valid encryption key.
    #[error("encryption key must be {expected} bytes but {actual} bytes were provided")]
    KeyLength { actual: usize, expected: usize },

    /// No source of key material was configured.
    #[error("no encryption key or encryption key volume was configured")]
    KeyMissing,

    /// The key file on the shared volume could not be read.
    #[error("unable to read encryption key file at '{0}'")]
    KeyRead(String),

    /// The inline key is not valid hex.
    #[error("the inline encryption key is not valid hex")]
    KeyHex,

    /// The ciphertext is too short to contain a nonce.
    #[error("the ciphertext is malformed")]
    Malformed,

    /// Decrypted secret is not valid UTF-8 text.
    #[error("decrypted secret is not valid UTF-8 text")]
    NotUtf8,
}

/// Encrypt and decrypt secrets with the process-wide key.
///
/// Cloning a [`Cipher`] is cheap and all clones share the same key.
#[derive(Clone)]
pub struct Cipher {
    inner: Arc<Aes256Gcm>,
}

impl Cipher {
    /// Decrypt a ciphertext produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LENGTH {
            anyhow::bail!(CipherError::Malformed);
        }
        let (nonce, payload) = ciphertext.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce);
        let plaintext = self
            .inner
            .decrypt(nonce, payload)
            .map_err(|_| CipherError::Decrypt)?;
        Ok(plaintext)
    }

    /// Decrypt a ciphertext and return the plaintext as a string.
    pub fn decrypt_string(&self, ciphertext: &[u8]) -> Result<String> {
        let plaintext = self.decrypt(ciphertext)?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| CipherError::NotUtf8)?;
        Ok(plaintext)
    }

    /// Encrypt a plaintext with a random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let payload = self
            .inner
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut ciphertext = Vec::with_capacity(NONCE_LENGTH + payload.len());
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&payload);
        Ok(ciphertext)
    }

    /// Initialise a [`Cipher`] from raw key material.
    pub fn new(key: &[u8]) -> Result<Cipher> {
        if key.len() != KEY_LENGTH {
            anyhow::bail!(CipherError::KeyLength {
                actual: key.len(),
                expected: KEY_LENGTH,
            });
        }
        let inner = Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::KeyLength {
            actual: key.len(),
            expected: KEY_LENGTH,
        })?;
        Ok(Cipher {
            inner: Arc::new(inner),
        })
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(<redacted>)")
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Cipher {
    /// Initialise a [`Cipher`] with a fixed key for unit tests.
    pub fn fixture() -> Cipher {
        Cipher::new(&[7u8; KEY_LENGTH]).expect("fixture key must be valid")
    }
}

/// Load the encryption key from the inline configuration value or the shared volume.
///
/// The inline value takes precedence when set.
/// Key files may contain the raw key bytes or the hex encoded key.
pub fn load_key(inline: Option<&str>, volume_file: Option<&Path>) -> Result<Vec<u8>> {
    let key = match (inline, volume_file) {
        (Some(inline), _) if !inline.trim().is_empty() => {
            hex::decode(inline.trim()).map_err(|_| CipherError::KeyHex)?
        }
        (_, Some(path)) => {
            let raw = std::fs::read(path)
                .with_context(|| CipherError::KeyRead(path.display().to_string()))?;
            decode_key_file(raw)
        }
        _ => anyhow::bail!(CipherError::KeyMissing),
    };
    if key.len() != KEY_LENGTH {
        anyhow::bail!(CipherError::KeyLength {
            actual: key.len(),
            expected: KEY_LENGTH,
        });
    }
    Ok(key)
}

/// Interpret the content of a key file as raw bytes or hex text.
fn decode_key_file(raw: Vec<u8>) -> Vec<u8> {
    if raw.len() == KEY_LENGTH {
        return raw;
    }
    let text = String::from_utf8_lossy(&raw);
    match hex::decode(text.trim()) {
        Ok(key) => key,
        Err(_) => raw,
    }
}
