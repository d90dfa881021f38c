use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::ConstraintCatalog;

/// Root configuration, maps to `tiergate.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub catalog: ConstraintCatalog,
    pub logging: LoggingConfig,
    pub state: StateConfig,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,
    /// Output format: pretty, json, compact.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── State ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file holding one tier row per account.
    pub path: PathBuf,
    /// Append-only JSON-lines file receiving every gate event. Disabled if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tiergate-state.json"),
            audit_log: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl GateConfig {
    /// Validate the whole config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();
        self.catalog.collect_issues(&mut warnings);

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // ── State path ───
        if self.state.path.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "state.path".into(),
                message: "state path is empty; tiers will not survive a restart".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'tiergate-state.json'".into()),
            });
        }

        split_errors(warnings)
    }
}

/// Fail with every error-severity message joined, otherwise pass the
/// remaining warnings through.
pub(crate) fn split_errors(warnings: Vec<ConfigWarning>) -> Result<Vec<ConfigWarning>, String> {
    let errors: Vec<String> = warnings
        .iter()
        .filter(|w| w.severity == WarningSeverity::Error)
        .map(|w| format!("{}: {}", w.field, w.message))
        .collect();

    if !errors.is_empty() {
        return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
    }

    Ok(warnings)
}
