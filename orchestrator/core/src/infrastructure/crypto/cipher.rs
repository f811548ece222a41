// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! ChaCha20-Poly1305 value cipher.
//!
//! Wire form: `***ENC:` + base64(nonce || ciphertext || tag) + `***`.
//! The key is the SHA-256 digest of the platform API token, so any replica
//! holding the same token can open values sealed by another.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const ENCRYPTED_PREFIX: &str = "***ENC:";
pub const ENCRYPTED_SUFFIX: &str = "***";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to seal value: {0}")]
    Seal(String),

    #[error("failed to open value: {0}")]
    Open(String),

    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),
}

/// `true` if `value` carries the encrypted marker.
pub fn is_encrypted(value: &str) -> bool {
    value.len() >= ENCRYPTED_PREFIX.len() + ENCRYPTED_SUFFIX.len()
        && value.starts_with(ENCRYPTED_PREFIX)
        && value.ends_with(ENCRYPTED_SUFFIX)
}

/// Cipher bound to one API token.
#[derive(Clone)]
pub struct SecretCipher {
    aead: ChaCha20Poly1305,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    pub fn new(api_token: &str) -> Self {
        let digest = Sha256::digest(api_token.as_bytes());
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(digest.as_slice())),
        }
    }

    /// Seals `plaintext` with a fresh random nonce. Empty input stays empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Seal(e.to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
        payload.extend_from_slice(nonce.as_slice());
        payload.extend_from_slice(&sealed);

        Ok(format!(
            "{}{}{}",
            ENCRYPTED_PREFIX,
            STANDARD.encode(payload),
            ENCRYPTED_SUFFIX
        ))
    }

    /// Opens a sealed value. Values without the marker are returned unchanged.
    pub fn decrypt(&self, value: &str) -> Result<String, CryptoError> {
        if !is_encrypted(value) {
            return Ok(value.to_string());
        }

        let encoded = &value[ENCRYPTED_PREFIX.len()..value.len() - ENCRYPTED_SUFFIX.len()];
        let payload = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Malformed(format!(
                "payload of {} bytes is shorter than nonce and tag",
                payload.len()
            )));
        }

        let (nonce, sealed) = payload.split_at(NONCE_LEN);
        let opened = self
            .aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| CryptoError::Open(e.to_string()))?;

        String::from_utf8(opened).map_err(|e| CryptoError::Encoding(e.to_string()))
    }

    /// Seals every value in place; the first failure aborts.
    pub fn encrypt_map(&self, values: &mut HashMap<String, String>) -> Result<(), CryptoError> {
        for value in values.values_mut() {
            *value = self.encrypt(value)?;
        }
        Ok(())
    }

    /// Opens every value in place; the first failure aborts.
    pub fn decrypt_map(&self, values: &mut HashMap<String, String>) -> Result<(), CryptoError> {
        for value in values.values_mut() {
            *value = self.decrypt(value)?;
        }
        Ok(())
    }
}

pub fn encrypt(plaintext: &str, api_token: &str) -> Result<String, CryptoError> {
    SecretCipher::new(api_token).encrypt(plaintext)
}

pub fn decrypt(value: &str, api_token: &str) -> Result<String, CryptoError> {
    SecretCipher::new(api_token).decrypt(value)
}
