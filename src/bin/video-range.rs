use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use video_range::{router, AppConfig, MediaRoot, RangeServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    tracing::info!(?config, "loaded configuration");

    let server = RangeServer::new(config.stream.clone())?;
    let app = router(server, MediaRoot::new(&config.media_root));

    let listener = TcpListener::bind(config.server.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, media_root = %config.media_root.display(), "listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
    }
}
