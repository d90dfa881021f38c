//! JSON shapes exchanged with callers of `tiergate evaluate` and `tiergate run`.

use serde::{Deserialize, Serialize};
use tiergate_core::{AccountSnapshot, GateError, PerformanceSnapshot, TradeProposal};

/// One evaluation request. `tiergate run` reads one per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Required on the `run` stream; `evaluate --account` overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub proposal: TradeProposal,
    pub account: AccountSnapshot,
    pub performance: PerformanceSnapshot,
}

impl EvaluationRequest {
    pub fn parse(raw: &str) -> tiergate_core::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The account to evaluate: the override if given, else the request's own.
    pub fn resolve_account(&self, explicit: Option<&str>) -> tiergate_core::Result<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.account_id.clone())
            .ok_or_else(|| GateError::precondition("account_id", "missing from request"))
    }
}

/// Written in place of a decision when a request cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The line was not a valid request document.
    InvalidRequest,
    Precondition,
    Configuration,
    Internal,
}

impl ErrorResponse {
    pub fn from_error(err: &GateError, account_id: Option<String>) -> Self {
        let kind = if err.is_precondition() {
            ErrorKind::Precondition
        } else if err.is_configuration() {
            ErrorKind::Configuration
        } else if matches!(err, GateError::Serialization(_)) {
            ErrorKind::InvalidRequest
        } else {
            ErrorKind::Internal
        };
        Self {
            error: err.to_string(),
            kind,
            account_id,
        }
    }
}

/// Evaluate one JSON-lines request against `gate`.
///
/// Returns the line to write back (a decision or an [`ErrorResponse`]) and
/// whether the account's tier changed.
pub fn respond(gate: &tiergate_autonomy::DecisionGate, line: &str) -> (String, bool) {
    let request = match EvaluationRequest::parse(line) {
        Ok(r) => r,
        Err(e) => return (render_error(&e, None), false),
    };
    let account_id = match request.resolve_account(None) {
        Ok(id) => id,
        Err(e) => return (render_error(&e, None), false),
    };

    match gate.evaluate(
        &account_id,
        &request.proposal,
        &request.account,
        &request.performance,
    ) {
        Ok(decision) => {
            let changed = decision.tier_transition.is_some();
            match serde_json::to_string(&decision) {
                Ok(json) => (json, changed),
                Err(e) => (render_error(&e.into(), Some(account_id)), changed),
            }
        }
        Err(e) => (render_error(&e, Some(account_id)), false),
    }
}

fn render_error(err: &GateError, account_id: Option<String>) -> String {
    serde_json::to_string(&ErrorResponse::from_error(err, account_id))
        .unwrap_or_else(|_| r#"{"error":"unrenderable error","kind":"internal"}"#.to_string())
}
