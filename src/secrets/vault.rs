//! Vault-compatible remote custody.
//!
//! # Responsibilities
//! - Transit engine: create keys, read public keys, sign hashes server-side
//! - KV v2 engine: one record per wallet name, created with `cas = 0`
//! - Startup probe: reachable and unsealed, or fail
//!
//! Signatures come back as `vault:v<N>:<payload>`; the payload is split off
//! on `:` and decoded (hex, falling back to base64).

use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::config::schema::VaultConfig;
use crate::secrets::{fields, SecretData, SecretError, SecretResult, SecretStore};
use crate::signing::{Algorithm, PublicKey, WalletSignature};

const TOKEN_HEADER: &str = "X-Vault-Token";

pub struct VaultSecretStore {
    client: reqwest::Client,
    config: VaultConfig,
    token: SecretString,
}

impl VaultSecretStore {
    /// Build the client and verify the backend is reachable and unsealed.
    pub async fn connect(config: VaultConfig, token: SecretString) -> SecretResult<Self> {
        let store = Self::new(config, token)?;
        store.check_available().await?;
        tracing::info!(address = %store.config.address, "Connected to vault");
        Ok(store)
    }

    /// Build the client without probing the backend.
    pub fn new(config: VaultConfig, token: SecretString) -> SecretResult<Self> {
        if token.expose_secret().is_empty() {
            return Err(SecretError::Configuration("vault token is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SecretError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            config,
            token,
        })
    }

    /// Reachability then seal status. Both are fatal at startup.
    pub async fn check_available(&self) -> SecretResult<()> {
        let health = self
            .client
            .get(self.url("sys/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| SecretError::Unreachable(e.to_string()))?;
        // 503 is reported for sealed nodes; the seal check below is authoritative.
        if health.status().is_server_error() && health.status() != StatusCode::SERVICE_UNAVAILABLE {
            return Err(SecretError::Unreachable(format!(
                "health endpoint returned {}",
                health.status()
            )));
        }

        let status = self
            .call(Method::GET, "sys/seal-status", None)
            .await?
            .ok_or_else(|| SecretError::Backend("seal status unavailable".to_string()))?;
        match status.get("sealed").and_then(Value::as_bool) {
            Some(false) => Ok(()),
            Some(true) => Err(SecretError::Sealed),
            None => Err(SecretError::Backend("seal status has no 'sealed' field".to_string())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.address.trim_end_matches('/'), path)
    }

    fn kv_data_path(&self, name: &str) -> String {
        format!("{}/data/{}/{}", self.config.kv_mount, self.config.service_prefix, name)
    }

    fn kv_metadata_path(&self, name: &str) -> String {
        format!("{}/metadata/{}/{}", self.config.kv_mount, self.config.service_prefix, name)
    }

    fn key_type(&self, algorithm: Algorithm) -> &str {
        match algorithm {
            Algorithm::Secp256k1 => &self.config.secp256k1_key_type,
            Algorithm::Ed25519 => &self.config.ed25519_key_type,
        }
    }

    /// Issue a request. `Ok(None)` on 404 or an empty body.
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> SecretResult<Option<Value>> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(TOKEN_HEADER, self.token.expose_secret());
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SecretError::Backend(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response
            .text()
            .await
            .map_err(|e| SecretError::Backend(e.to_string()))?;
        if !status.is_success() {
            return Err(SecretError::Backend(format!("{} returned {}: {}", path, status, text)));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| SecretError::Backend(format!("invalid JSON from {}: {}", path, e)))
    }

    async fn read_transit_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PublicKey> {
        let body = self
            .call(Method::GET, &format!("{}/keys/{}", self.config.transit_mount, name), None)
            .await?
            .ok_or_else(|| SecretError::NotFound(name.to_string()))?;
        let data = &body["data"];
        let version = data["latest_version"].as_u64().unwrap_or(1).to_string();
        let encoded = data["keys"][version.as_str()]["public_key"]
            .as_str()
            .ok_or_else(|| SecretError::Backend(format!("transit key '{}' has no public key", name)))?;
        decode_public_key(algorithm, encoded)
    }
}

/// Transit returns PEM for ECDSA keys and base64 raw bytes for ed25519.
fn decode_public_key(algorithm: Algorithm, encoded: &str) -> SecretResult<PublicKey> {
    if encoded.trim_start().starts_with("-----BEGIN") {
        return Ok(PublicKey::from_pem(algorithm, encoded)?);
    }
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SecretError::Backend(format!("undecodable public key: {}", e)))?;
    Ok(PublicKey::from_hex(algorithm, &hex::encode(raw))?)
}

/// Decode `vault:v1:<payload>` into an algorithm-shaped signature.
pub fn decode_signature(algorithm: Algorithm, signature: &str) -> SecretResult<WalletSignature> {
    let payload = signature
        .split(':')
        .nth(2)
        .ok_or_else(|| SecretError::Backend(format!("malformed signature '{}'", signature)))?;

    let bytes = match hex::decode(payload) {
        Ok(bytes) => bytes,
        Err(_) => STANDARD
            .decode(payload)
            .map_err(|e| SecretError::Backend(format!("undecodable signature payload: {}", e)))?,
    };
    Ok(WalletSignature::from_raw(algorithm, &bytes)?)
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    fn backend(&self) -> &'static str {
        "vault"
    }

    async fn health(&self) -> SecretResult<()> {
        self.check_available().await
    }

    async fn add_secret(&self, name: &str, data: SecretData) -> SecretResult<()> {
        if data.is_empty() {
            return Err(SecretError::EmptyData);
        }
        let body = json!({ "options": { "cas": 0 }, "data": data });
        match self.call(Method::POST, &self.kv_data_path(name), Some(body)).await {
            Ok(_) => Ok(()),
            Err(SecretError::Backend(msg)) if msg.contains("check-and-set") => {
                Err(SecretError::Conflict(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_secret(&self, name: &str) -> SecretResult<SecretData> {
        let body = self
            .call(Method::GET, &self.kv_data_path(name), None)
            .await?
            .ok_or_else(|| SecretError::NotFound(name.to_string()))?;
        // Soft-deleted versions come back with `data: null`.
        match &body["data"]["data"] {
            Value::Null => Err(SecretError::NotFound(name.to_string())),
            data => serde_json::from_value(data.clone())
                .map_err(|e| SecretError::Backend(format!("invalid secret payload: {}", e))),
        }
    }

    async fn delete_secret(&self, name: &str) -> SecretResult<()> {
        self.call(Method::DELETE, &self.kv_metadata_path(name), None).await?;
        Ok(())
    }

    async fn generate_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PublicKey> {
        let key_type = self.key_type(algorithm).to_string();
        self.call(
            Method::POST,
            &format!("{}/keys/{}", self.config.transit_mount, name),
            Some(json!({ "type": key_type })),
        )
        .await?;
        let public_key = self.read_transit_key(name, algorithm).await?;

        // The KV record is the uniqueness guard for the name.
        let mut data = SecretData::new();
        data.insert(fields::PUBLIC_KEY.to_string(), public_key.to_pem()?);
        data.insert(fields::ALGORITHM.to_string(), algorithm.to_string());
        data.insert(fields::CUSTODY.to_string(), "transit".to_string());
        data.insert("key_type".to_string(), key_type.clone());
        self.add_secret(name, data).await?;

        tracing::info!(name = %name, algorithm = %algorithm, key_type = %key_type, "Generated transit key");
        Ok(public_key)
    }

    async fn get_public_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PublicKey> {
        self.read_transit_key(name, algorithm).await
    }

    async fn sign(
        &self,
        name: &str,
        algorithm: Algorithm,
        hash: B256,
    ) -> SecretResult<WalletSignature> {
        // `input` is for the built-in engine, `hash_input` for secp256k1 plugins.
        let body = json!({
            "input": STANDARD.encode(hash),
            "prehashed": true,
            "hash_input": hex::encode(hash),
        });
        let response = self
            .call(
                Method::POST,
                &format!("{}/sign/{}", self.config.transit_mount, name),
                Some(body),
            )
            .await?
            .ok_or_else(|| SecretError::NotFound(name.to_string()))?;
        let signature = response["data"]["signature"]
            .as_str()
            .ok_or_else(|| SecretError::Backend("sign response has no signature".to_string()))?;
        decode_signature(algorithm, signature)
    }
}

impl std::fmt::Debug for VaultSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretStore")
            .field("address", &self.config.address)
            .field("kv_mount", &self.config.kv_mount)
            .field("transit_mount", &self.config.transit_mount)
            .finish()
    }
}
