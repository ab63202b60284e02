use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use intelli_api::{build_router, build_state, ApiConfig};
use intelli_observability::init_tracing;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("intelli_api");

    let config = ApiConfig::from_env();
    let state = build_state(&config)?;

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match sweeper.agent.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "expired conversations purged"),
                Err(err) => tracing::warn!(error = %err, "conversation purge failed"),
            }
            let idle = sweeper.sweep_rate_limits();
            if idle > 0 {
                tracing::debug!(idle, "idle rate-limit clients dropped");
            }
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        bind = %config.bind,
        rules = ?config.rules_path,
        trust_forwarded = config.trust_forwarded,
        "intelliassist api started"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
