//! # tiergate-config
//!
//! Configuration system for tiergate. Reads from `tiergate.toml` and
//! environment variables, in that precedence order.
//!
//! The constraint catalog is validated as a whole: a file with any error is
//! rejected and the previous catalog stays active. Supports hot-reload via
//! filesystem watcher.

pub mod catalog;
pub mod loader;
pub mod schema;

pub use catalog::{
    ConstraintCatalog, DowngradeRule, HardLimits, LiquidationLimits, ProtectionRule, SoftRules,
    TierLimits, UpgradeRule,
};
pub use loader::ConfigLoader;
pub use schema::{ConfigWarning, GateConfig, LoggingConfig, StateConfig, WarningSeverity};
