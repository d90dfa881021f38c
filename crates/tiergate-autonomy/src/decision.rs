use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tiergate_core::{AccountId, PermissionTier, TierTransition};
use uuid::Uuid;

/// Final disposition of a trade proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Approved,
    /// Approved at a smaller notional than proposed.
    ApprovedReduced,
    Rejected,
    /// The account must be flattened now; overrides any other outcome.
    ForceLiquidate,
}

impl Outcome {
    /// Whether the caller may execute the proposal.
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedReduced)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Approved => "APPROVED",
            Self::ApprovedReduced => "APPROVED_REDUCED",
            Self::Rejected => "REJECTED",
            Self::ForceLiquidate => "FORCE_LIQUIDATE",
        })
    }
}

/// The gate's answer for one proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Correlates the decision with audit events and downstream orders.
    pub decision_id: Uuid,
    pub account_id: AccountId,
    pub symbol: String,
    pub outcome: Outcome,
    pub proposed_notional_usd: f64,
    /// Never above `proposed_notional_usd`; zero unless approved.
    pub adjusted_notional_usd: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Tier the proposal was validated against.
    pub validated_tier: PermissionTier,
    /// Tier in effect after this evaluation.
    pub resulting_tier: PermissionTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_transition: Option<TierTransition>,
    pub evaluated_at: DateTime<Utc>,
}

/// The outcome reached before liquidation and tier evaluation run.
#[derive(Debug, Clone)]
pub(crate) struct Tentative {
    pub outcome: Outcome,
    pub notional_usd: f64,
    pub reason: String,
    pub warnings: Vec<String>,
}

impl Tentative {
    pub fn rejected(reason: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            outcome: Outcome::Rejected,
            notional_usd: 0.0,
            reason: reason.into(),
            warnings,
        }
    }
}
