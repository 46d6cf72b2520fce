//! Shutdown handling for graceful daemon termination
//!
//! Turns Ctrl+C / SIGTERM into a stop request for the control loop. The loop
//! itself resets the fan to 0% before releasing the port, so the signal
//! handler only has to flip the flag and must never exit the process.

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Interrupted by user - shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// Forward the first shutdown signal to `stop`
pub fn spawn_stop_on_signal(stop: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        request_stop(&stop);
    })
}

/// Ask the control loop to drain and exit
pub fn request_stop(stop: &watch::Sender<bool>) {
    // send_replace succeeds even when the loop already finished
    stop.send_replace(true);
}
