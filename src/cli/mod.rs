//! CLI command handlers

pub mod commands;

pub use commands::{compare, deps, model, run, watch, RunOptions};
