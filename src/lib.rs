pub mod api;
pub mod auth;
pub mod business;
pub mod config;
pub mod crypto;
pub mod dashboard;
pub mod error;
pub mod providers;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::AppError;

use std::sync::Arc;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn store::Store>,
    pub crypto: Arc<crypto::CryptoEngine>,
    pub oauth: Arc<dyn providers::OAuthProvider>,
    pub sessions: auth::SessionVerifier,
    pub syncer: sync::Syncer,
}

pub type SharedState = Arc<AppState>;
