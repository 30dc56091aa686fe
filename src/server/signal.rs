// Signal handling module
//
// SIGINT (Ctrl+C) and SIGTERM both request a graceful stop: the accept loop
// ends and in-flight transfers are left to finish.

use crate::logger;

/// Resolves once the process is asked to stop
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            logger::log_warning(&format!("Cannot listen for SIGTERM: {e}"));
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        () = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => logger::log_info("[Signal] SIGTERM received"),
    }
}

/// Windows fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => logger::log_info("[Signal] SIGINT received"),
        Err(e) => {
            logger::log_error(&format!("Cannot listen for Ctrl+C: {e}"));
            std::future::pending::<()>().await;
        }
    }
}
