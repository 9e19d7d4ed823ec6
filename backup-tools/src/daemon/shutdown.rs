//! Graceful shutdown handling for SIGTERM and SIGINT.

use tokio::signal;
use tracing::info;

/// Wait until SIGINT (Ctrl+C) or, on Unix, SIGTERM is received.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating graceful shutdown...");
    }

    Ok(())
}
