//! Integration server bootstrap and router wiring.

use super::*;

/// Binds `config.bind` and serves the integration routes until `shutdown` resolves.
pub async fn run_integration_server<F>(
    config: IntegrationServerConfig,
    state: Arc<IntegrationServerState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind integration server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound integration server address")?;
    tracing::info!(
        addr = %local_addr,
        ledger = %state.engine.ledger().path().display(),
        "integration server listening"
    );

    let app = build_integration_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("integration server exited unexpectedly")?;
    tracing::info!("integration server stopped");
    Ok(())
}

pub fn build_integration_router(state: Arc<IntegrationServerState>) -> Router {
    Router::new()
        .route(INTEGRATION_WEBHOOK_ENDPOINT, post(handle_integration_webhook))
        .route(INTEGRATION_SYNC_ENDPOINT, post(handle_integration_sync))
        .route(INTEGRATION_CREATE_ENDPOINT, post(handle_integration_create))
        .route(INTEGRATION_STATUS_ENDPOINT, get(handle_integration_status))
        .with_state(state)
}
