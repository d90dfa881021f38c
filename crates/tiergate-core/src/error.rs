use thiserror::Error;

/// Unified error type for the gate.
///
/// Constraint outcomes (rejections, reductions, forced liquidation) are *not*
/// errors; they are returned as a `Decision`. Errors here mean the caller
/// handed the gate something it cannot evaluate, or the configuration is bad.
#[derive(Error, Debug)]
pub enum GateError {
    // ── Input errors ───────────────────────────────────────────
    #[error("precondition violated: {field}: {reason}")]
    Precondition { field: String, reason: String },

    #[error("unknown permission tier: {0}")]
    UnknownTier(u8),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── State errors ───────────────────────────────────────────
    #[error("state error: {0}")]
    State(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl GateError {
    pub fn precondition(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Precondition {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by malformed caller input.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. } | Self::UnknownTier(_))
    }

    /// Whether the error was caused by an invalid constraint catalog.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ConfigValidation { .. })
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
