use std::net::SocketAddr;

use anyhow::Result;
use coordinator_service::{build_router, AppState};
use fedround_core::{clear_ready, init_tracing, load_config, mark_ready, Coordinator};
use tokio::signal;
use tracing::info;

const SERVICE: &str = "coordinator-service";

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = load_config(SERVICE)?;
    init_tracing(&cfg.service_name, &cfg.log_level, cfg.json_log)?;
    info!(?cfg, "config loaded");

    let coordinator = Coordinator::from_config(&cfg)?;
    let app = build_router(AppState::new(coordinator), &cfg.service_name, cfg.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "coordinator listening");
    mark_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            clear_ready();
        })
        .await?;
    info!("shutdown");
    Ok(())
}
