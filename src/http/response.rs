//! Response envelope and error mapping.
//!
//! # Responsibilities
//! - Wrap every response in `{status, message, data}`
//! - Map service errors to HTTP status codes
//! - Turn body rejections into validation failures with the same envelope
//!
//! # Design Decisions
//! - Errors after a side effect (`WalletNotSynced`, `AcknowledgeFailed`) carry
//!   the wallet id or tx hash in `data` so callers can reconcile
//! - Upstream failures are 502; local storage failures are 500

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::KmsError;
use crate::platform::types::{STATUS_FAILURE, STATUS_SUCCESS};
use crate::signing::SigningError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Handler error; renders as a `FAILURE` envelope.
#[derive(Debug)]
pub struct ApiError(pub KmsError);

impl<E: Into<KmsError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// HTTP status for a service error.
pub fn status_for(err: &KmsError) -> StatusCode {
    match err {
        KmsError::Validation(_) | KmsError::InvalidAlgorithm(_) | KmsError::Abi(_) => {
            StatusCode::BAD_REQUEST
        }
        KmsError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        KmsError::NotFound(_) => StatusCode::NOT_FOUND,
        KmsError::Conflict(_) => StatusCode::CONFLICT,
        KmsError::UnsupportedForAlgorithm { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        KmsError::Signing(
            SigningError::UnsupportedAlgorithm(_)
            | SigningError::InvalidSignatureLength { .. }
            | SigningError::InvalidRecoveryId(_),
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        KmsError::Signing(_) | KmsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        KmsError::WalletNotSynced { .. }
        | KmsError::AcknowledgeFailed { .. }
        | KmsError::Secret(_)
        | KmsError::Chain(_)
        | KmsError::Platform(_)
        | KmsError::Relay(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_data(err: &KmsError) -> Option<Value> {
    match err {
        KmsError::WalletNotSynced { wallet_id, .. } => Some(json!({ "walletId": wallet_id })),
        KmsError::AcknowledgeFailed { tx_hash, .. } => {
            Some(json!({ "txHash": format!("{:#x}", tx_hash) }))
        }
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let body = ApiResponse {
            status: STATUS_FAILURE,
            message: self.0.to_string(),
            data: error_data(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejections use the failure envelope.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError(KmsError::Validation(rejection.body_text()))),
        }
    }
}
