//! Signal handling for the watcher.
//!
//! SIGTERM and SIGINT cancel the returned token; the monitor then exits
//! without sending anything. SIGHUP is swallowed so the watcher survives
//! the submitting terminal closing.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Install the watcher's signal handlers.
///
/// Must be called from inside a Tokio runtime. Fails only if a handler
/// cannot be registered.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, stopping watcher");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, stopping watcher");
                    break;
                }
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, ignoring");
                }
            }
        }
        token_clone.cancel();
    });

    Ok(token)
}
