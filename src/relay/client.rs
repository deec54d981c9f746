//! HTTP client for the meta-transaction relayer.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{PayloadRequest, RelayError, RelayPayload, RelayResult, Relayer, SendRequest};
use crate::config::RelayConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    tx_hash: String,
}

/// Relayer answers either bare or wrapped in the `{status, message, data}` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Wrapped<T> {
    Envelope {
        status: String,
        #[serde(default)]
        message: String,
        data: Option<T>,
    },
    Bare(T),
}

pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(url: &str, config: &RelayConfig) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> RelayResult<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(RelayError::Rejected(format!(
                "{} returned HTTP {}: {}",
                path,
                status.as_u16(),
                text
            )));
        }

        match serde_json::from_str::<Wrapped<T>>(&text) {
            Ok(Wrapped::Bare(value)) => Ok(value),
            Ok(Wrapped::Envelope { status, message, data }) => {
                if status.eq_ignore_ascii_case("FAILURE") {
                    return Err(RelayError::Rejected(message));
                }
                data.ok_or_else(|| RelayError::InvalidResponse(format!("{} returned no data", path)))
            }
            Err(e) => Err(RelayError::InvalidResponse(format!("{}: {}", path, e))),
        }
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl Relayer for RelayClient {
    async fn payload(&self, request: &PayloadRequest) -> RelayResult<RelayPayload> {
        self.post("/payload", request).await
    }

    async fn send(&self, request: &SendRequest) -> RelayResult<String> {
        let response: SendResponse = self.post("/send", request).await?;
        Ok(response.tx_hash)
    }
}
