//! HTTP façade.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum router, request id, limits, timeout, metrics)
//!     → handlers.rs (decode body, call registry / builder / relay)
//!     → response.rs ({status, message, data} envelope, status mapping)
//!     → Send to client
//! ```

pub mod handlers;
pub mod response;
pub mod server;
pub mod tls;

pub use response::{ApiError, ApiJson, ApiResponse};
pub use server::{build_router, AppState, HttpServer};
