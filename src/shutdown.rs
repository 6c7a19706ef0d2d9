use std::future::Future;
use std::io;
use tracing::{error, info};

/// Resolves on Ctrl+C. If the handler cannot be installed it never resolves,
/// so the server keeps running instead of stopping immediately.
pub async fn shutdown_signal() {
    wait_for(tokio::signal::ctrl_c()).await
}

async fn wait_for<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
