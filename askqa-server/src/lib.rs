//! `askqa-server` exposes the question answering pipeline over HTTP and
//! provides the `askqa` command-line launcher.

pub mod cli;
pub mod server;

pub use server::{AppState, ServerConfig, app_router, build_state, client_identity, run_server};
