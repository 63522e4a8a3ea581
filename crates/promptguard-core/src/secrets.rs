//! Authenticated encryption for system prompts and related secrets.
//!
//! AES-256-GCM with a fresh 96-bit random nonce per call. The blob format
//! is self-describing (`version || nonce || ciphertext+tag`, base64) so any
//! instance holding the master key can decrypt any record.
//!
//! There is deliberately no key-generation fallback here. The master key is
//! process-wide configuration; callers that cannot produce one must refuse
//! to start instead of encrypting with a key that dies with the process.

use crate::{PromptGuardError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

/// Blob format version, first byte of every ciphertext blob.
const BLOB_VERSION: u8 = 1;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts prompt material with a process-wide master key.
pub struct SecretStore {
    master_key: [u8; 32],
}

impl SecretStore {
    /// Create a store from raw key bytes.
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    /// Create a store from a 64-character hex key string.
    pub fn from_hex_key(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() != 64 {
            return Err(PromptGuardError::InvalidMasterKey(format!(
                "expected 64 hex characters, got {}",
                hex.len()
            )));
        }
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
                PromptGuardError::InvalidMasterKey("key is not valid hex".to_string())
            })?;
        }
        Ok(Self::new(key))
    }

    /// Encrypt plaintext into a self-describing base64 blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.master_key)
            .map_err(|_| PromptGuardError::InvalidMasterKey("bad key length".to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| PromptGuardError::DecryptionFailure)?;

        let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`PromptGuardError::DecryptionFailure`] when the tag does
    /// not verify, for any reason. Never returns partial plaintext.
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        let bytes = STANDARD
            .decode(blob)
            .map_err(|_| PromptGuardError::DecryptionFailure)?;

        // version byte + nonce + at least the 16-byte tag
        if bytes.len() < 1 + NONCE_LEN + 16 {
            return Err(PromptGuardError::DecryptionFailure);
        }
        if bytes[0] != BLOB_VERSION {
            return Err(PromptGuardError::DecryptionFailure);
        }

        let nonce = Nonce::from_slice(&bytes[1..1 + NONCE_LEN]);
        let cipher = Aes256Gcm::new_from_slice(&self.master_key)
            .map_err(|_| PromptGuardError::InvalidMasterKey("bad key length".to_string()))?;

        let plaintext = cipher
            .decrypt(nonce, &bytes[1 + NONCE_LEN..])
            .map_err(|_| PromptGuardError::DecryptionFailure)?;

        String::from_utf8(plaintext).map_err(|_| PromptGuardError::DecryptionFailure)
    }
}
