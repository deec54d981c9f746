//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the `/wallet` API
//! - Wire up middleware: tracing, request id, security headers, body limit,
//!   timeout and metrics
//! - Serve plain HTTP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::http::header::{CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::tls::load_tls_config;
use crate::blockchain::TransactionBuilder;
use crate::config::schema::{ListenerConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::relay::GaslessRelay;
use crate::wallet::WalletRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<WalletRegistry>,
    pub builder: Arc<TransactionBuilder>,
    pub relay: Arc<GaslessRelay>,
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState, listener: &ListenerConfig, timeouts: &TimeoutConfig) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/createWallet", post(handlers::create_wallet))
        .route("/signAndSubmitTxn", post(handlers::sign_and_submit))
        .route("/deployContract", post(handlers::deploy_contract))
        .route("/estimateGas", post(handlers::estimate_gas))
        .route("/getBalance", post(handlers::get_balance))
        .route("/callContract", post(handlers::call_contract))
        .route("/signEIP712", post(handlers::sign_typed_data))
        .route("/signMessage", post(handlers::sign_message))
        .route("/verifySignature", post(handlers::verify_signature))
        .route("/signAndSubmitGSNTxn", post(handlers::sign_and_submit_gasless))
        .route_layer(middleware::from_fn(track_metrics));

    Router::new()
        .nest("/wallet", api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                // Responses carry signatures and wallet ids.
                .layer(SetResponseHeaderLayer::overriding(
                    CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(RequestBodyLimitLayer::new(listener.max_body_bytes))
                .layer(TimeoutLayer::new(Duration::from_secs(timeouts.request_secs))),
        )
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;
    metrics::record_request(&method, &route, response.status().as_u16(), start);
    response
}

/// HTTP server for the wallet API.
pub struct HttpServer {
    router: Router,
    listener: ListenerConfig,
    shutdown_grace: Duration,
}

impl HttpServer {
    pub fn new(state: AppState, listener: ListenerConfig, timeouts: &TimeoutConfig) -> Self {
        let router = build_router(state, &listener, timeouts);
        Self {
            router,
            listener,
            shutdown_grace: Duration::from_secs(timeouts.shutdown_secs),
        }
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        match &self.listener.tls {
            Some(tls) => {
                let rustls = load_tls_config(tls).await?;
                tracing::info!(address = %addr, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                let grace = self.shutdown_grace;
                let trigger = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    trigger.graceful_shutdown(Some(grace));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                        tracing::info!("HTTP server draining connections");
                    })
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
