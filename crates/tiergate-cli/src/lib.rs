//! # tiergate-cli
//!
//! Command-line host for the decision gate.
//!
//! ## Commands
//!
//! - `tiergate evaluate` - Evaluate one request document
//! - `tiergate run` - Serve JSON-lines requests on stdin with config hot-reload
//! - `tiergate tier` / `tiergate override` - Inspect or set an account's tier
//! - `tiergate tiers` - Print the tier table
//! - `tiergate config` / `tiergate doctor` - Show and validate configuration

pub mod commands;
pub mod protocol;
pub mod state;

pub use commands::Cli;
