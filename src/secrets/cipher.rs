//! Password-based sealing of key material.
//!
//! Layout of a sealed blob (base64, standard alphabet):
//! `salt (16) || nonce (12) || AES-256-GCM ciphertext`.
//! The key is derived per record with Argon2id over the service password and
//! the record's random salt.

use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use crate::secrets::{SecretError, SecretResult};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Seals and opens secrets under a password-derived key.
#[derive(Clone)]
pub struct KeyCipher {
    password: Arc<SecretString>,
    params: Params,
}

impl KeyCipher {
    /// Build a cipher with explicit Argon2id cost parameters.
    pub fn new(
        password: SecretString,
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> SecretResult<Self> {
        if password.expose_secret().is_empty() {
            return Err(SecretError::Configuration(
                "wallet password must not be empty".to_string(),
            ));
        }
        let params = Params::new(memory_kib, iterations, parallelism, Some(32))
            .map_err(|e| SecretError::Configuration(format!("invalid Argon2 parameters: {}", e)))?;
        Ok(Self {
            password: Arc::new(password),
            params,
        })
    }

    fn derive_key(&self, salt: &[u8]) -> SecretResult<[u8; 32]> {
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let mut key = [0u8; 32];
        argon2
            .hash_password_into(self.password.expose_secret().as_bytes(), salt, &mut key)
            .map_err(|e| SecretError::Crypto(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }

    /// Encrypt `plaintext` under a fresh salt and nonce.
    pub fn seal(&self, plaintext: &[u8]) -> SecretResult<String> {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let key = self.derive_key(&salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SecretError::Crypto(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`Self::seal`].
    pub fn open(&self, sealed: &str) -> SecretResult<SecretString> {
        let blob = STANDARD
            .decode(sealed)
            .map_err(|e| SecretError::Crypto(format!("sealed blob is not base64: {}", e)))?;
        if blob.len() <= SALT_LEN + NONCE_LEN {
            return Err(SecretError::Crypto("sealed blob is truncated".to_string()));
        }
        let (salt, rest) = blob.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Crypto("decryption failed (wrong password?)".to_string()))?;

        String::from_utf8(plaintext)
            .map(SecretString::from)
            .map_err(|_| SecretError::Crypto("decrypted secret is not UTF-8".to_string()))
    }
}

impl std::fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCipher")
            .field("memory_kib", &self.params.m_cost())
            .field("iterations", &self.params.t_cost())
            .field("parallelism", &self.params.p_cost())
            .finish()
    }
}
