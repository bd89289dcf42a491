use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use gbp_sync::auth::SessionVerifier;
use gbp_sync::business::{GoogleBusinessClient, TokioSleeper};
use gbp_sync::crypto::CryptoEngine;
use gbp_sync::providers::GoogleProvider;
use gbp_sync::store::PgStore;
use gbp_sync::sync::Syncer;
use gbp_sync::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gbp_sync=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("gbp-sync v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    let crypto = Arc::new(CryptoEngine::new(&config.master_key, &config.hmac_secret)?);
    let store = Arc::new(PgStore::connect(&config.database_url, crypto.clone()).await?);
    store.migrate().await?;
    info!("Database connected and migrated");

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let oauth = Arc::new(GoogleProvider::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        http.clone(),
    ));
    let business = Arc::new(GoogleBusinessClient::new(http));

    let syncer = Syncer::new(
        store.clone(),
        oauth.clone(),
        business,
        Arc::new(TokioSleeper),
        config.sync.clone(),
    );
    if config.sync.include_insights {
        info!("Insights sync enabled ({} day lookback)", config.sync.metrics_lookback_days);
    }

    let sessions = SessionVerifier::new(
        &config.session_jwt_secret,
        config.session_jwt_audience.as_deref(),
    );

    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        store,
        crypto,
        oauth,
        sessions,
        syncer,
    });

    let app = api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready");
    axum::serve(listener, app).await?;

    Ok(())
}
