//! Reversible encryption for merchant secret keys at rest.
//!
//! Merchant webhook secrets must be recoverable (they are needed to sign outbound
//! notifications), so they are stored AES-256-GCM encrypted under a process-wide key rather
//! than hashed. Ciphertexts are `nonce(12) || ct+tag`, base64 encoded.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
    Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use thiserror::Error;

/// Process-wide encryption key (32 bytes for AES-256).
pub type EncryptionKey = [u8; 32];

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("ciphertext is malformed")]
    InvalidCiphertext,
}

/// Encrypts `plaintext` under the process key, returning a base64 `nonce || ciphertext` blob.
pub fn encrypt(key: &EncryptionKey, plaintext: &str) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext =
        cipher.encrypt(nonce, plaintext.as_bytes()).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(blob))
}

/// Decrypts a blob produced by [`encrypt`].
pub fn decrypt(key: &EncryptionKey, blob: &str) -> Result<String, CryptoError> {
    let bytes = BASE64.decode(blob).map_err(|_| CryptoError::InvalidCiphertext)?;
    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidCiphertext);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    let nonce = Nonce::from_slice(&bytes[..NONCE_SIZE]);
    let plaintext =
        cipher.decrypt(nonce, &bytes[NONCE_SIZE..]).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidCiphertext)
}

/// Generates a fresh random process key. Useful for tests and first-run tooling.
pub fn generate_key() -> EncryptionKey {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = generate_key();
        let blob = encrypt(&key, "whsec_123456").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), "whsec_123456");
    }

    #[test]
    fn wrong_key_fails() {
        let blob = encrypt(&generate_key(), "whsec_123456").unwrap();
        assert!(decrypt(&generate_key(), &blob).is_err());
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert!(matches!(decrypt(&generate_key(), "c2hvcnQ="), Err(CryptoError::InvalidCiphertext)));
    }
}
