// Server module entry point
// Listener creation, per-connection service and the accept loop

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module gets another name
#[path = "loop.rs"]
pub mod server_loop;

pub use connection::ConnectionContext;
pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;
pub use signal::shutdown_signal;
