use std::sync::Arc;

use zipserve::config::Config;
use zipserve::logger;
use zipserve::serve::Server;
use zipserve::server::{create_reusable_listener, shutdown_signal, start_server_loop, ConnectionContext};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config file path (without extension) may be given as the first argument
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    let server = Server::new(cfg.server_config()?);

    // Worker threads from configuration, CPU cores otherwise
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg, server))
}

async fn async_main(cfg: Config, server: Server) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = create_reusable_listener(addr)?;
    logger::log_server_start(&addr, &cfg);

    let ctx = Arc::new(ConnectionContext::new(server, &cfg));

    // Use LocalSet for spawn_local support
    let local = tokio::task::LocalSet::new();
    local
        .run_until(start_server_loop(listener, ctx, shutdown_signal()))
        .await;
    Ok(())
}
