//! # tiergate-autonomy
//!
//! The tiered-autonomy decision gate. Six permission tiers (T0-T5) bound what
//! an automated signal source may do; every proposal passes through soft and
//! hard constraints, a liquidation check and a tier re-evaluation before a
//! single [`Decision`] comes back.

pub mod decision;
pub mod evaluator;
pub mod gate;
pub mod ledger;
pub mod liquidation;
pub mod validator;

pub use decision::{Decision, Outcome};
pub use evaluator::{AssessmentKind, TierAssessment, TierEvaluator};
pub use gate::DecisionGate;
pub use ledger::PermissionLedger;
pub use liquidation::{LiquidationMonitor, LiquidationTrigger};
pub use validator::{
    Adjustment, ConstraintValidator, ConstraintVerdict, HardConstraint, ProposalContext,
    SoftOutcome,
};
