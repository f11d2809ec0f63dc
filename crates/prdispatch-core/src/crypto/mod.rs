//! Token generation, hashing and at-rest encryption of provider tokens.

use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;

use crate::error::{DispatchError, Result};

/// Maximum inbound webhook payload size (10MB).
pub const MAX_WEBHOOK_SIZE: usize = 10 * 1024 * 1024;

/// Computes SHA-256 hash of data and returns as hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    let hash = sha2::Sha256::digest(data);
    hex::encode(hash)
}

/// Generates a new cryptographically random token (64 hex chars).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Encryption key for provider tokens stored in the database.
#[derive(Clone)]
pub struct EncryptionKey(Arc<[u8; 32]>);

impl EncryptionKey {
    /// Reads `ENCRYPTION_KEY`; `Ok(None)` when unset.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var("ENCRYPTION_KEY") {
            Ok(key_str) if !key_str.is_empty() => Self::from_string(&key_str).map(Some),
            _ => Ok(None),
        }
    }

    /// Creates an encryption key from a base64 or hex encoded string.
    pub fn from_string(key_str: &str) -> Result<Self> {
        let key_bytes = if key_str.len() == 64 {
            hex::decode(key_str)
                .map_err(|e| DispatchError::Configuration(format!("Invalid hex key: {}", e)))?
        } else {
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, key_str)
                .map_err(|e| DispatchError::Configuration(format!("Invalid base64 key: {}", e)))?
        };

        if key_bytes.len() != 32 {
            return Err(DispatchError::Configuration(format!(
                "Encryption key must be exactly 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(Self(Arc::new(key)))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Arc::new(bytes))
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Encrypts `plaintext`, binding it to `table_name:row_id` as AAD.
///
/// Returns (ciphertext, nonce).
pub fn encrypt_with_aad(
    key: &EncryptionKey,
    plaintext: &[u8],
    table_name: &str,
    row_id: &str,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| DispatchError::Encryption(format!("Invalid key: {}", e)))?;

    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = format!("{}:{}", table_name, row_id);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: aad.as_bytes() })
        .map_err(|e| DispatchError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok((ciphertext, nonce_bytes.to_vec()))
}

/// Decrypts data produced by [`encrypt_with_aad`] for the same row.
pub fn decrypt_with_aad(
    key: &EncryptionKey,
    ciphertext: &[u8],
    nonce: &[u8],
    table_name: &str,
    row_id: &str,
) -> Result<Vec<u8>> {
    if nonce.len() != 12 {
        return Err(DispatchError::Encryption("Invalid nonce length".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| DispatchError::Encryption(format!("Invalid key: {}", e)))?;

    let nonce = Nonce::from_slice(nonce);
    let aad = format!("{}:{}", table_name, row_id);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: aad.as_bytes() })
        .map_err(|e| DispatchError::Encryption(format!("Decryption failed: {}", e)))
}
