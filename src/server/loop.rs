// Server loop module
// Accepts connections until the shutdown future resolves

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::{accept_connection, ConnectionContext};
use crate::logger;

/// Accept connections on `listener` until `shutdown` completes.
///
/// Connections already being served keep running in their own tasks.
pub async fn start_server_loop(
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &ctx),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = &mut shutdown => {
                logger::log_shutdown(ctx.active.load(Ordering::SeqCst));
                break;
            }
        }
    }
}
