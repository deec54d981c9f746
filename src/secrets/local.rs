//! Local, password-encrypted key custody.
//!
//! Records live in the `secret` namespace of the key-value store. The private
//! key PEM is sealed with [`KeyCipher`]; the public key PEM is kept as base64.
//! This backend signs in-process and is only enabled with
//! `secrets.allow_insecure_local = true`.

use std::sync::Arc;

use alloy::primitives::B256;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;

use crate::secrets::cipher::KeyCipher;
use crate::secrets::{
    fields, record_algorithm, SecretData, SecretError, SecretResult, SecretStore,
};
use crate::signing::{Algorithm, PrivateKey, PublicKey, SigningError, WalletSignature};
use crate::store::{get_json, set_json, KeyValueStore};

/// Namespace holding secret records.
pub const SECRET_NAMESPACE: &str = "secret";

pub struct LocalSecretStore {
    store: Arc<dyn KeyValueStore>,
    cipher: KeyCipher,
    /// Serializes check-then-insert in `add_secret`.
    write_lock: Mutex<()>,
}

impl LocalSecretStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        cipher: KeyCipher,
        allow_insecure: bool,
    ) -> SecretResult<Self> {
        if !allow_insecure {
            return Err(SecretError::InsecureBackendDisabled);
        }
        tracing::warn!("Using local secret backend: private keys are held by this process");
        Ok(Self {
            store,
            cipher,
            write_lock: Mutex::new(()),
        })
    }

    fn load(&self, name: &str) -> SecretResult<SecretData> {
        get_json::<SecretData>(self.store.as_ref(), SECRET_NAMESPACE, name.as_bytes())?
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    async fn load_private_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PrivateKey> {
        let data = self.load(name)?;
        check_algorithm(name, &data, algorithm)?;
        let sealed = data
            .get(fields::PRIVATE_KEY)
            .cloned()
            .ok_or_else(|| SecretError::Backend(format!("Secret '{}' has no private key", name)))?;

        // Argon2 blocks; run it off the async workers.
        let cipher = self.cipher.clone();
        let pem = tokio::task::spawn_blocking(move || cipher.open(&sealed))
            .await
            .map_err(|e| SecretError::Crypto(format!("decryption task failed: {}", e)))??;

        Ok(PrivateKey::from_pkcs8_pem(algorithm, pem.expose_secret())?)
    }
}

fn check_algorithm(name: &str, data: &SecretData, expected: Algorithm) -> SecretResult<()> {
    let stored = record_algorithm(name, data)?;
    if stored != expected {
        return Err(SigningError::UnsupportedAlgorithm(format!(
            "secret '{}' holds a {} key, not {}",
            name, stored, expected
        ))
        .into());
    }
    Ok(())
}

#[async_trait]
impl SecretStore for LocalSecretStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn health(&self) -> SecretResult<()> {
        self.store.keys(SECRET_NAMESPACE)?;
        Ok(())
    }

    async fn add_secret(&self, name: &str, data: SecretData) -> SecretResult<()> {
        if data.is_empty() {
            return Err(SecretError::EmptyData);
        }
        let _guard = self.write_lock.lock().await;
        if self.store.get(SECRET_NAMESPACE, name.as_bytes())?.is_some() {
            return Err(SecretError::Conflict(name.to_string()));
        }
        set_json(self.store.as_ref(), SECRET_NAMESPACE, name.as_bytes(), &data)?;
        Ok(())
    }

    async fn get_secret(&self, name: &str) -> SecretResult<SecretData> {
        self.load(name)
    }

    async fn delete_secret(&self, name: &str) -> SecretResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(SECRET_NAMESPACE, name.as_bytes())?;
        Ok(())
    }

    async fn generate_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PublicKey> {
        let key = PrivateKey::generate(algorithm);
        let public_key = key.public_key();
        let pem = key.to_pkcs8_pem()?;

        let cipher = self.cipher.clone();
        let sealed = tokio::task::spawn_blocking(move || cipher.seal(pem.expose_secret().as_bytes()))
            .await
            .map_err(|e| SecretError::Crypto(format!("encryption task failed: {}", e)))??;

        let mut data = SecretData::new();
        data.insert(fields::PRIVATE_KEY.to_string(), sealed);
        data.insert(
            fields::PUBLIC_KEY.to_string(),
            STANDARD.encode(public_key.to_pem()?),
        );
        data.insert(fields::ALGORITHM.to_string(), algorithm.to_string());
        data.insert(fields::CUSTODY.to_string(), "local".to_string());

        self.add_secret(name, data).await?;
        tracing::info!(name = %name, algorithm = %algorithm, "Generated local key pair");
        Ok(public_key)
    }

    async fn get_public_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PublicKey> {
        let data = self.load(name)?;
        check_algorithm(name, &data, algorithm)?;
        let encoded = data
            .get(fields::PUBLIC_KEY)
            .ok_or_else(|| SecretError::Backend(format!("Secret '{}' has no public key", name)))?;
        let pem = STANDARD
            .decode(encoded)
            .map_err(|e| SecretError::Backend(format!("public key is not base64: {}", e)))?;
        let pem = String::from_utf8(pem)
            .map_err(|_| SecretError::Backend("public key is not UTF-8".to_string()))?;
        Ok(PublicKey::from_pem(algorithm, &pem)?)
    }

    async fn sign(
        &self,
        name: &str,
        algorithm: Algorithm,
        hash: B256,
    ) -> SecretResult<WalletSignature> {
        let key = self.load_private_key(name, algorithm).await?;
        Ok(key.sign(&hash)?)
    }
}

impl std::fmt::Debug for LocalSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSecretStore")
            .field("cipher", &self.cipher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use alloy::primitives::keccak256;
    use secrecy::SecretString;

    fn backend() -> (Arc<MemoryStore>, LocalSecretStore) {
        let store = Arc::new(MemoryStore::new());
        let cipher = KeyCipher::new(SecretString::from("test-password".to_string()), 8, 1, 1).unwrap();
        let secrets = LocalSecretStore::new(store.clone(), cipher, true).unwrap();
        (store, secrets)
    }

    #[test]
    fn test_requires_insecure_flag() {
        let store = Arc::new(MemoryStore::new());
        let cipher = KeyCipher::new(SecretString::from("pw".to_string()), 8, 1, 1).unwrap();
        assert!(matches!(
            LocalSecretStore::new(store, cipher, false),
            Err(SecretError::InsecureBackendDisabled)
        ));
    }

    #[tokio::test]
    async fn test_add_secret_rules() {
        let (_, secrets) = backend();

        assert!(matches!(
            secrets.add_secret("alice", SecretData::new()).await,
            Err(SecretError::EmptyData)
        ));

        let mut data = SecretData::new();
        data.insert("k".into(), "v".into());
        secrets.add_secret("alice", data.clone()).await.unwrap();
        assert!(matches!(
            secrets.add_secret("alice", data.clone()).await,
            Err(SecretError::Conflict(_))
        ));
        assert_eq!(secrets.get_secret("alice").await.unwrap(), data);

        secrets.delete_secret("alice").await.unwrap();
        assert!(matches!(
            secrets.get_secret("alice").await,
            Err(SecretError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_private_key_is_not_stored_in_clear() {
        let (store, secrets) = backend();
        secrets.generate_key("bob", Algorithm::Secp256k1).await.unwrap();

        let raw = store.get(SECRET_NAMESPACE, b"bob").unwrap().unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(!raw.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn test_generate_and_sign() {
        let (_, secrets) = backend();
        let public_key = secrets.generate_key("carol", Algorithm::Secp256k1).await.unwrap();
        assert_eq!(
            secrets.get_public_key("carol", Algorithm::Secp256k1).await.unwrap(),
            public_key
        );

        let hash = keccak256(b"tx");
        let signature = secrets.sign("carol", Algorithm::Secp256k1, hash).await.unwrap();
        let recovered = signature
            .to_eth_signature()
            .unwrap()
            .recover_address_from_prehash(&hash)
            .unwrap();
        assert_eq!(Some(recovered), public_key.address());
    }

    #[tokio::test]
    async fn test_algorithm_mismatch() {
        let (_, secrets) = backend();
        secrets.generate_key("dave", Algorithm::Ed25519).await.unwrap();
        let err = secrets
            .sign("dave", Algorithm::Secp256k1, B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Signing(SigningError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn test_duplicate_generate_conflicts() {
        let (_, secrets) = backend();
        secrets.generate_key("erin", Algorithm::Ed25519).await.unwrap();
        assert!(matches!(
            secrets.generate_key("erin", Algorithm::Secp256k1).await,
            Err(SecretError::Conflict(_))
        ));
    }
}
