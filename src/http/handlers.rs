//! Route handlers for the `/wallet` API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response::{ApiJson, ApiResponse, ApiResult};
use super::server::AppState;
use crate::blockchain::transaction::required_address;
use crate::blockchain::{CallIntent, DeployIntent, EstimateIntent, GasEstimate, Submission, TransactionIntent};
use crate::error::KmsError;
use crate::platform::types::{deserialize_optional_u64, STATUS_FAILURE, STATUS_SUCCESS};
use crate::relay::{GaslessRequest, GaslessSubmission};
use crate::signing::{message, typed_data, TypedDataSigner};
use crate::wallet::Wallet;

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub name: String,
    pub algorithm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub address: String,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: String,
    /// Wei, decimal.
    pub balance: String,
}

#[derive(Debug, Serialize)]
pub struct CallResponse {
    pub response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataRequest {
    pub wallet_id: String,
    /// EIP-712 document, as a JSON object or a JSON string.
    pub data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageRequest {
    pub wallet_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMessageRequest {
    pub wallet_id: String,
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct SignatureResponse {
    pub signature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub secret_backend: &'static str,
    pub secret_backend_healthy: bool,
    pub chain_healthy: bool,
    pub relay_enabled: bool,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let secrets = state.registry.secrets();
    let secret_backend_healthy = match secrets.health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(backend = secrets.backend(), error = %e, "Secret backend unhealthy");
            false
        }
    };
    crate::observability::metrics::record_upstream_health(secrets.backend(), secret_backend_healthy);
    let chain_healthy = state.builder.chain().is_healthy().await;

    let report = HealthReport {
        secret_backend: secrets.backend(),
        secret_backend_healthy,
        chain_healthy,
        relay_enabled: state.relay.is_enabled(),
    };
    let healthy = secret_backend_healthy && chain_healthy;
    let (status, label, message) = if healthy {
        (StatusCode::OK, STATUS_SUCCESS, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, STATUS_FAILURE, "degraded")
    };
    let body = ApiResponse {
        status: label,
        message: message.to_string(),
        data: Some(report),
    };
    (status, Json(body)).into_response()
}

pub async fn create_wallet(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateWalletRequest>,
) -> ApiResult<Wallet> {
    let wallet = state
        .registry
        .create_wallet(&request.name, &request.algorithm)
        .await?;
    Ok(ApiResponse::success("wallet created", wallet))
}

pub async fn sign_and_submit(
    State(state): State<AppState>,
    ApiJson(intent): ApiJson<TransactionIntent>,
) -> ApiResult<Submission> {
    let submission = state.builder.submit(&intent).await?;
    Ok(ApiResponse::success("transaction submitted", submission))
}

pub async fn deploy_contract(
    State(state): State<AppState>,
    ApiJson(intent): ApiJson<DeployIntent>,
) -> ApiResult<Submission> {
    let submission = state.builder.deploy(&intent).await?;
    Ok(ApiResponse::success("contract deployment submitted", submission))
}

pub async fn estimate_gas(
    State(state): State<AppState>,
    ApiJson(intent): ApiJson<EstimateIntent>,
) -> ApiResult<GasEstimate> {
    let estimate = state.builder.estimate_gas(&intent).await?;
    Ok(ApiResponse::success("gas estimated", estimate))
}

pub async fn get_balance(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BalanceRequest>,
) -> ApiResult<BalanceResponse> {
    let address = required_address("address", Some(&request.address))?;
    let balance = state.builder.balance(address, request.chain_id).await?;
    Ok(ApiResponse::success(
        "balance fetched",
        BalanceResponse {
            address: address.to_checksum(None),
            balance: balance.to_string(),
        },
    ))
}

pub async fn call_contract(
    State(state): State<AppState>,
    ApiJson(intent): ApiJson<CallIntent>,
) -> ApiResult<CallResponse> {
    let response = state.builder.call_contract(&intent).await?;
    Ok(ApiResponse::success("contract called", CallResponse { response }))
}

pub async fn sign_typed_data(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TypedDataRequest>,
) -> ApiResult<SignatureResponse> {
    let wallet = state.registry.authorize(&request.wallet_id)?;
    let document = match request.data {
        Value::String(text) => typed_data::parse_typed_data(&text)?,
        other => serde_json::from_value(other)
            .map_err(|e| KmsError::Validation(format!("Invalid typed data: {}", e)))?,
    };
    let signer = TypedDataSigner::new(state.registry.signer(wallet));
    let signature = signer.sign(&document).await?;
    Ok(ApiResponse::success("typed data signed", SignatureResponse { signature }))
}

pub async fn sign_message(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignMessageRequest>,
) -> ApiResult<SignatureResponse> {
    let wallet = state.registry.authorize(&request.wallet_id)?;
    let signer = state.registry.signer(wallet);
    let signature = message::sign_message(&signer, request.message.as_bytes()).await?;
    Ok(ApiResponse::success("message signed", SignatureResponse { signature }))
}

pub async fn verify_signature(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyMessageRequest>,
) -> ApiResult<VerifyResponse> {
    let wallet = state.registry.authorize(&request.wallet_id)?;
    let is_verified =
        message::verify_message(&wallet, request.message.as_bytes(), &request.signature)?;
    Ok(ApiResponse::success("signature checked", VerifyResponse { is_verified }))
}

pub async fn sign_and_submit_gasless(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GaslessRequest>,
) -> ApiResult<GaslessSubmission> {
    let submission = state.relay.submit_gasless(&request).await?;
    Ok(ApiResponse::success("gasless transaction relayed", submission))
}
