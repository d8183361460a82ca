//! Termination signal handling.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}

/// Cancel `token` on the first termination signal.
///
/// Returns without cancelling if the token is cancelled by someone else first.
pub async fn listen_for_shutdown(token: CancellationToken) {
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown requested, cancelling scheduler");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_returns_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let listener = tokio::spawn(listen_for_shutdown(token.clone()));
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
