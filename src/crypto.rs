//! Token encryption module using AES-256-GCM
//!
//! The token vault encrypts through the [`TokenCipher`] capability so the key
//! management and algorithm stay swappable. [`AesGcmCipher`] is the production
//! implementation: a version byte, a 12 byte random nonce and the AES-256-GCM
//! ciphertext+tag, with additional authenticated data binding each ciphertext
//! to its `user_id|provider` owner.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Required key length for AES-256
pub const KEY_LEN: usize = 32;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// Why a configured key is unfit for production use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyWeakness {
    #[error("no encryption key configured")]
    Missing,
    #[error("key must be {KEY_LEN} bytes, got {0}")]
    WrongLength(usize),
    #[error("key has too little entropy ({distinct} distinct byte values)")]
    LowEntropy { distinct: usize },
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Random key for development profiles running without a configured key.
    /// Anything encrypted with it is unreadable after a restart.
    pub fn ephemeral() -> Self {
        let mut bytes = vec![0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        ZeroizingKey(bytes)
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Checks a raw key for the conditions that make it unfit for production.
///
/// A key made of fewer than 8 distinct byte values (all zeros, a repeated
/// ASCII character, ...) is treated as a placeholder rather than a real secret.
pub fn assess_key(bytes: Option<&[u8]>) -> Result<(), KeyWeakness> {
    let bytes = bytes.ok_or(KeyWeakness::Missing)?;
    if bytes.len() != KEY_LEN {
        return Err(KeyWeakness::WrongLength(bytes.len()));
    }

    let mut seen = [false; 256];
    for b in bytes {
        seen[*b as usize] = true;
    }
    let distinct = seen.iter().filter(|s| **s).count();
    if distinct < 8 {
        return Err(KeyWeakness::LowEntropy { distinct });
    }

    Ok(())
}

/// Encrypt/decrypt capability injected into the token vault
pub trait TokenCipher: Send + Sync {
    fn encrypt(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM implementation of [`TokenCipher`]
#[derive(Debug, Clone)]
pub struct AesGcmCipher {
    key: CryptoKey,
}

impl AesGcmCipher {
    pub fn new(key: CryptoKey) -> Self {
        Self { key }
    }
}

impl TokenCipher for AesGcmCipher {
    fn encrypt(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encrypt_bytes(&self.key, aad, plaintext)
    }

    fn decrypt(&self, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt_bytes(&self.key, aad, ciphertext)
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // version || nonce || ciphertext+tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Additional authenticated data binding a credential ciphertext to its owner
pub fn credential_aad(user_id: &uuid::Uuid, provider: &str) -> String {
    format!("{}|{}", user_id, provider)
}
