//! Execution modes
//!
//! - `serve`: HTTP server with the background retry task
//! - `retry-once`: one retry pass against the store, then exit

pub mod retry;
pub mod server;

pub use retry::run_retry_once;
pub use server::run_server;
