//! HTTP implementation of [`PlatformGateway`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::types::{
    AddWalletRequest, Envelope, FailureReport, NonceData, NonceQuery, NonceUpdate, RawRecord,
    STATUS_FAILURE,
};
use super::{PlatformError, PlatformGateway, PlatformResult};
use crate::config::PlatformConfig;

const ADD_WALLET: &str = "/ncWallet/addWallet";
const GET_NONCE: &str = "/ncWallet/getNonce";
const UPDATE_NONCE: &str = "/ncWallet/updateNonce";
const REPORT_FAILURE: &str = "/ncWallet/reportFailure";
const FETCH_DEPLOYS: &str = "/ncWallet/fetchDeployRecords";
const FETCH_TRANSACTIONS: &str = "/ncWallet/fetchTransactionRecords";
const FETCH_WALLETS: &str = "/ncWallet/fetchPendingWallets";

pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig, auth_token: &SecretString) -> PlatformResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(auth_token.expose_secret())
            .map_err(|_| PlatformError::Configuration("auth token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let instance = HeaderValue::from_str(&config.instance_id)
            .map_err(|_| PlatformError::Configuration("instance id is not a valid header value".into()))?;
        headers.insert("InstanceId", instance);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> PlatformResult<Option<T>> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::unwrap_envelope(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> PlatformResult<Option<T>> {
        let response = self.http.get(self.url(path)).send().await?;
        Self::unwrap_envelope(path, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> PlatformResult<Option<T>> {
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(PlatformError::InvalidResponse(format!("{}: {}", path, e)))
            }
            Err(_) => {
                return Err(PlatformError::Failure(format!(
                    "{} returned HTTP {}",
                    path,
                    status.as_u16()
                )))
            }
        };

        if envelope.status.eq_ignore_ascii_case(STATUS_FAILURE) || !status.is_success() {
            let message = if envelope.message.is_empty() {
                format!("{} returned HTTP {}", path, status.as_u16())
            } else {
                envelope.message
            };
            return Err(PlatformError::Failure(message));
        }

        Ok(envelope.data)
    }

    /// Records stay raw here; the scheduler parses them one at a time.
    async fn fetch_list(&self, path: &str) -> PlatformResult<Vec<RawRecord>> {
        Ok(self.get::<Vec<RawRecord>>(path).await?.unwrap_or_default())
    }
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl PlatformGateway for PlatformClient {
    async fn add_wallet(&self, request: &AddWalletRequest) -> PlatformResult<()> {
        self.post::<_, serde_json::Value>(ADD_WALLET, request).await?;
        tracing::debug!(wallet_id = %request.wallet_id, "Wallet registered with platform");
        Ok(())
    }

    async fn get_nonce(&self, wallet_id: Uuid, chain_id: u64) -> PlatformResult<u64> {
        let query = NonceQuery {
            wallet_id,
            chain_id: chain_id.to_string(),
        };
        let data: Option<NonceData> = self.post(GET_NONCE, &query).await?;
        data.map(|d| d.nonce)
            .ok_or_else(|| PlatformError::InvalidResponse("nonce response has no data".into()))
    }

    async fn update_nonce(&self, update: &NonceUpdate) -> PlatformResult<()> {
        self.post::<_, serde_json::Value>(UPDATE_NONCE, update).await?;
        Ok(())
    }

    async fn report_failure(&self, report: &FailureReport) -> PlatformResult<()> {
        self.post::<_, serde_json::Value>(REPORT_FAILURE, report).await?;
        Ok(())
    }

    async fn fetch_pending_deploys(&self) -> PlatformResult<Vec<RawRecord>> {
        self.fetch_list(FETCH_DEPLOYS).await
    }

    async fn fetch_pending_transactions(&self) -> PlatformResult<Vec<RawRecord>> {
        self.fetch_list(FETCH_TRANSACTIONS).await
    }

    async fn fetch_pending_wallet_approvals(&self) -> PlatformResult<Vec<RawRecord>> {
        self.fetch_list(FETCH_WALLETS).await
    }
}
