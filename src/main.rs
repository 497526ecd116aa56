//! ONVIF daemon entry point.

use anyhow::Result;
use onvifd::app::{DEFAULT_CONFIG_PATH, Daemon};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging is initialized by Daemon::start once the config is loaded.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let daemon = match Daemon::start(&config_path).await {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!("failed to start daemon: {}", e);
            return Err(e.into());
        }
    };

    daemon.run().await;

    let report = daemon.shutdown().await;
    match report.status {
        onvifd::ShutdownStatus::Success => {
            tracing::info!("shutdown completed in {:?}", report.duration);
        }
        onvifd::ShutdownStatus::Timeout => {
            tracing::warn!(
                "shutdown timed out after {:?}; some tasks were abandoned",
                report.duration
            );
        }
    }

    Ok(())
}
