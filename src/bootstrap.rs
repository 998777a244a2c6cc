use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Loads `.env` if present. Real deployments configure through the
/// environment directly, so a missing file is not an error.
pub fn init_env() {
    dotenvy::dotenv().ok();
}

pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Attaches shared state and request tracing, then serves the app until the
/// process is stopped.
pub async fn bootstrap(
    service_name: &str,
    app: Router<AppState>,
    state: AppState,
    port: u16,
) -> Result<()> {
    let app = app.with_state(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("{service_name} listening on {addr}");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
