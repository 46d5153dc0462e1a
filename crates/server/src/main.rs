use anyhow::Context;
use server::{DeploymentImpl, build_router, config::ServerConfig};
use tokio::net::TcpListener;
use tracing::info;
use utils::{
    assets::data_dir,
    logging::{LogFormat, init_tracing},
};

const DEFAULT_LOG_FILTER: &str = "info,server=debug,services=debug,db=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    // Subscriber first: config loading logs warnings.
    init_tracing(DEFAULT_LOG_FILTER, LogFormat::from_env());
    let config = ServerConfig::from_env()?;

    std::fs::create_dir_all(data_dir()).context("failed to create data directory")?;

    let address = config.bind_address();
    let deployment = DeploymentImpl::new(config).await?;
    let app = build_router(deployment);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Seedwave portal listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
}
