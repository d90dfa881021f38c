//! # tiergate-core
//!
//! Core types and primitives for the tiergate permission gate.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! permission tiers, the snapshots a caller hands to the gate, trade proposals,
//! the error taxonomy, and the audit event bus.

pub mod error;
pub mod event;
pub mod types;

pub use error::{GateError, Result};
pub use event::{EventBus, GateEvent};
pub use types::*;
