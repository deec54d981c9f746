//! Custodial wallet key-management and transaction-signing service.

pub mod blockchain;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod platform;
pub mod relay;
pub mod scheduler;
pub mod secrets;
pub mod signing;
pub mod store;
pub mod wallet;

pub use config::schema::KmsConfig;
pub use error::{KmsError, KmsResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
