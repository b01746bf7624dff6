//! Termination signals

use std::io;
use tokio::signal::unix::{signal, SignalKind};

/// Wait for SIGINT or SIGTERM and return its name
pub async fn shutdown_signal() -> io::Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "interrupt",
        _ = terminate.recv() => "terminated",
    };

    Ok(name)
}
