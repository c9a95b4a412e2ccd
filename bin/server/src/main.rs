use keyward_identity::InMemoryAccountStore;
use keyward_server::{
    config::ServerConfig, error::ServerError, routes, seed, state::AppState,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> keyward_core::Result<(), ServerError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().map_err(|e| ServerError::Config {
        details: e.to_string(),
    })?;
    tracing::info!(admin_role = config.identity.admin_role(), "Loaded configuration");

    let store = match &config.accounts_file {
        Some(path) => seed::load_accounts(Path::new(path)).await?,
        None => {
            tracing::warn!("ACCOUNTS_FILE not set, starting with an empty account store");
            InMemoryAccountStore::new()
        }
    };

    let state = Arc::new(AppState::new(&config.identity, Arc::new(store)));
    let shutdown = state.shutdown.clone();
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: config.bind_addr.clone(),
            details: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await
        .map_err(|e| ServerError::Serve {
            details: e.to_string(),
        })?;

    Ok(())
}
