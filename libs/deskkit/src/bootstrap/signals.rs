use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Signals that end the UI loop.
enum ShutdownSignal {
    CtrlC,
    #[cfg(unix)]
    Sigterm,
}

/// Cancel `token` on the first termination signal (Ctrl+C, SIGTERM).
pub(crate) async fn cancel_on_signal(token: CancellationToken) {
    let received = tokio::select! {
        () = token.cancelled() => return,
        result = wait_ctrl_c() => result,
        result = wait_sigterm() => result,
    };
    match received {
        Ok(ShutdownSignal::CtrlC) => tracing::info!("Received Ctrl+C signal"),
        #[cfg(unix)]
        Ok(ShutdownSignal::Sigterm) => tracing::info!("Received SIGTERM signal"),
        Err(e) => {
            tracing::warn!(error = %e, "Signal handler failed; shutdown only via the UI");
            return;
        }
    }
    token.cancel();
}

async fn wait_ctrl_c() -> std::io::Result<ShutdownSignal> {
    signal::ctrl_c().await?;
    Ok(ShutdownSignal::CtrlC)
}

#[cfg(unix)]
async fn wait_sigterm() -> std::io::Result<ShutdownSignal> {
    let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    handler.recv().await;
    Ok(ShutdownSignal::Sigterm)
}

#[cfg(not(unix))]
async fn wait_sigterm() -> std::io::Result<ShutdownSignal> {
    std::future::pending::<std::io::Result<ShutdownSignal>>().await
}
