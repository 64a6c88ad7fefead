use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{OAuthClient, OAuthError};

use super::config::ServerConfig;
use super::http::{
    AppState, configs_handler, index_handler, method_not_allowed, not_found, oauth_handler,
};

pub fn router(client: OAuthClient) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/configs", get(configs_handler))
        .route("/oauth", post(oauth_handler).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(AppState { client })
}

/// Serves until Ctrl-C. In-flight logins are allowed to finish.
pub async fn serve(config: ServerConfig, client: OAuthClient) -> Result<(), OAuthError> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, ?client, "starting server");

    axum::serve(listener, router(client))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
