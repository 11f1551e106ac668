//! Calc Model API Server module
//!
//! HTTP evaluation interface over one export directory.
//! Run with `calc-model-server`.

pub mod handlers;
pub mod server;

pub use server::{build_router, run_api_server, ApiConfig, AppState};
