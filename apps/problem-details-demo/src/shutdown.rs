use tokio::signal;

/// Resolve on Ctrl+C or SIGTERM, whichever comes first.
pub async fn wait_for_signal() {
    tokio::select! {
        () = ctrl_c() => tracing::info!("received Ctrl+C"),
        () = sigterm() => tracing::info!("received SIGTERM"),
    }
    tracing::info!("shutting down");
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(%e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn sigterm() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut handler) => {
            handler.recv().await;
        }
        Err(e) => {
            tracing::error!(%e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
