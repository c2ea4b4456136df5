use crate::Result;

/// Resolve on the first interrupt (Ctrl+C) or, on unix, termination signal.
pub async fn shutdown_signal() -> Result<()> {
    // ---
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
