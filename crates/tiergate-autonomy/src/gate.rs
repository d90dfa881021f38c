use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tiergate_config::{ConfigWarning, ConstraintCatalog};
use tiergate_core::{
    AccountId, AccountSnapshot, AccountTierRecord, EventBus, GateError, GateEvent,
    PerformanceSnapshot, PermissionTier, Result, TierTransition, TradeProposal, TransitionSource,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::decision::{Decision, Outcome, Tentative};
use crate::evaluator::TierEvaluator;
use crate::ledger::PermissionLedger;
use crate::liquidation::LiquidationMonitor;
use crate::validator::{ConstraintValidator, ConstraintVerdict, SoftOutcome};

type SharedLedger = Arc<Mutex<PermissionLedger>>;

/// Sequences validation, liquidation checks and tier evaluation into one
/// atomic decision per proposal, and owns every account's ledger.
///
/// Each account's ledger sits behind its own mutex, held for the whole
/// read-validate-commit sequence. Different accounts evaluate in parallel.
/// The catalog is swapped as a whole; an evaluation keeps the snapshot it
/// started with.
pub struct DecisionGate {
    catalog: RwLock<Arc<ConstraintCatalog>>,
    accounts: RwLock<HashMap<AccountId, SharedLedger>>,
    validator: ConstraintValidator,
    events: EventBus,
}

impl DecisionGate {
    /// Build a gate around a validated catalog.
    pub fn new(catalog: ConstraintCatalog) -> Result<Self> {
        Self::with_validator(catalog, ConstraintValidator::new())
    }

    /// Like [`new`](Self::new) with a custom set of hard constraints.
    pub fn with_validator(catalog: ConstraintCatalog, validator: ConstraintValidator) -> Result<Self> {
        let warnings = catalog.validate().map_err(GateError::Config)?;
        for w in &warnings {
            warn!(field = %w.field, "{}", w.message);
        }
        Ok(Self {
            catalog: RwLock::new(Arc::new(catalog)),
            accounts: RwLock::new(HashMap::new()),
            validator,
            events: EventBus::default(),
        })
    }

    /// The catalog currently in effect.
    pub fn catalog(&self) -> Arc<ConstraintCatalog> {
        self.catalog.read().clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    /// Validate and atomically replace the catalog. On error the previous
    /// catalog stays active.
    pub fn load_constraint_catalog(&self, catalog: ConstraintCatalog) -> Result<Vec<ConfigWarning>> {
        let warnings = match catalog.validate() {
            Ok(w) => w,
            Err(e) => {
                error!("rejected constraint catalog: {e}");
                return Err(GateError::Config(e));
            }
        };
        *self.catalog.write() = Arc::new(catalog);
        info!(warnings = warnings.len(), "constraint catalog loaded");
        self.events.publish(GateEvent::CatalogReloaded { at: Utc::now() });
        Ok(warnings)
    }

    /// The account's tier. Unknown accounts report the catalog's initial
    /// tier and stay unregistered.
    pub fn current_tier(&self, account_id: &str) -> PermissionTier {
        let ledger = self.accounts.read().get(account_id).cloned();
        match ledger {
            Some(ledger) => ledger.lock().current(),
            None => self.catalog.read().initial_tier,
        }
    }

    /// Evaluate one proposal for one account.
    ///
    /// Malformed input is an error and mutates nothing. Everything else,
    /// including every constraint failure, is a [`Decision`].
    pub fn evaluate(
        &self,
        account_id: &str,
        proposal: &TradeProposal,
        account: &AccountSnapshot,
        performance: &PerformanceSnapshot,
    ) -> Result<Decision> {
        if account_id.trim().is_empty() {
            return Err(GateError::precondition("account_id", "must not be empty"));
        }
        proposal.validate()?;
        account.validate()?;
        performance.validate()?;

        let catalog = self.catalog();
        let ledger = self.ledger_for(account_id, &catalog);
        let mut ledger = ledger.lock();

        let current = ledger.current();
        let limits = catalog.tier_limits(current)?;
        let opens = proposal.direction.opens_position();

        // ── Tentative outcome ───
        let tentative = if opens && !current.allows_new_positions() {
            Tentative::rejected(
                format!("protection mode: {current} does not allow new positions"),
                Vec::new(),
            )
        } else {
            match self.validator.check_soft(proposal, account, limits, &catalog.soft) {
                SoftOutcome::Rejected(reason) => Tentative::rejected(reason, Vec::new()),
                SoftOutcome::Adjusted(adj) => {
                    match self.validator.check_hard(proposal, account, &adj, limits, &catalog.hard) {
                        ConstraintVerdict::Reject(reason) => Tentative::rejected(reason, adj.warnings),
                        ConstraintVerdict::Pass if adj.is_reduced() => Tentative {
                            outcome: Outcome::ApprovedReduced,
                            notional_usd: adj.notional_usd,
                            reason: adj.reductions.join("; "),
                            warnings: adj.warnings,
                        },
                        ConstraintVerdict::Pass => Tentative {
                            outcome: Outcome::Approved,
                            notional_usd: adj.notional_usd,
                            reason: "all constraints satisfied".into(),
                            warnings: adj.warnings,
                        },
                    }
                }
            }
        };

        // Computed before any commit so a failure leaves the ledger untouched.
        let assessment = TierEvaluator::new(&catalog).evaluate(current, performance)?;

        // ── Liquidation override ───
        let trigger = LiquidationMonitor::new(&catalog.liquidation).check(account);

        let (tentative, transition) = match trigger {
            Some(trigger) => {
                error!(
                    account_id,
                    symbol = %proposal.symbol,
                    tier = %current,
                    trigger = %trigger,
                    "forced liquidation"
                );
                self.events.publish(GateEvent::ForcedLiquidation {
                    account_id: account_id.to_string(),
                    symbol: proposal.symbol.clone(),
                    trigger: trigger.to_string(),
                    previous_tier: current,
                    at: Utc::now(),
                });
                let transition = (current != PermissionTier::Protection).then(|| {
                    ledger.set(
                        PermissionTier::Protection,
                        format!("forced liquidation: {trigger}"),
                        TransitionSource::Liquidation,
                        None,
                    )
                });
                let tentative = Tentative {
                    outcome: Outcome::ForceLiquidate,
                    notional_usd: 0.0,
                    reason: format!("forced liquidation: {trigger}"),
                    warnings: tentative.warnings,
                };
                (tentative, transition)
            }
            None => {
                let transition = (assessment.next != current).then(|| {
                    ledger.set(
                        assessment.next,
                        assessment.reason.clone(),
                        TransitionSource::Evaluator,
                        None,
                    )
                });
                (tentative, transition)
            }
        };

        if let Some(t) = &transition {
            warn!(
                account_id,
                from = %t.from,
                to = %t.to,
                source = ?t.source,
                "tier transition: {}",
                t.reason
            );
            self.events.publish(GateEvent::TierChanged { transition: t.clone() });
        } else {
            debug!(account_id, tier = %current, "{}", assessment.reason);
        }

        if tentative.outcome == Outcome::Rejected {
            self.events.publish(GateEvent::ProposalRejected {
                account_id: account_id.to_string(),
                symbol: proposal.symbol.clone(),
                reason: tentative.reason.clone(),
                tier: current,
            });
        }

        let decision = Decision {
            decision_id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            symbol: proposal.symbol.clone(),
            outcome: tentative.outcome,
            proposed_notional_usd: proposal.notional_usd,
            adjusted_notional_usd: tentative.notional_usd.min(proposal.notional_usd),
            reason: tentative.reason,
            warnings: tentative.warnings,
            validated_tier: current,
            resulting_tier: ledger.current(),
            tier_transition: transition,
            evaluated_at: Utc::now(),
        };

        info!(
            account_id,
            decision_id = %decision.decision_id,
            symbol = %decision.symbol,
            direction = %proposal.direction,
            outcome = %decision.outcome,
            notional = decision.adjusted_notional_usd,
            tier = %decision.resulting_tier,
            "decision"
        );
        Ok(decision)
    }

    /// Administrative tier change; the only way out of T0.
    pub fn manual_override(
        &self,
        account_id: &str,
        target: PermissionTier,
        operator_id: &str,
        reason: &str,
    ) -> Result<TierTransition> {
        if account_id.trim().is_empty() {
            return Err(GateError::precondition("account_id", "must not be empty"));
        }
        if operator_id.trim().is_empty() {
            return Err(GateError::precondition("operator_id", "must not be empty"));
        }
        if reason.trim().is_empty() {
            return Err(GateError::precondition("reason", "must not be empty"));
        }

        let catalog = self.catalog();
        let ledger = self.ledger_for(account_id, &catalog);
        let transition = ledger.lock().set(
            target,
            reason,
            TransitionSource::ManualOverride,
            Some(operator_id.to_string()),
        );

        warn!(
            account_id,
            operator = operator_id,
            from = %transition.from,
            to = %transition.to,
            "manual tier override: {reason}"
        );
        self.events.publish(GateEvent::ManualOverride {
            transition: transition.clone(),
        });
        Ok(transition)
    }

    /// Load persisted rows. A known account is overwritten in place under its
    /// own lock, so it waits for any evaluation already holding the ledger.
    /// Returns how many rows were loaded.
    pub fn restore(&self, records: impl IntoIterator<Item = AccountTierRecord>) -> usize {
        let mut accounts = self.accounts.write();
        let mut count = 0;
        for record in records {
            match accounts.get(&record.account_id) {
                Some(existing) => *existing.lock() = PermissionLedger::from_record(record),
                None => {
                    accounts.insert(
                        record.account_id.clone(),
                        Arc::new(Mutex::new(PermissionLedger::from_record(record))),
                    );
                }
            }
            count += 1;
        }
        info!(count, "restored account tiers");
        count
    }

    /// Every account's persisted row, ordered by account id.
    pub fn export(&self) -> Vec<AccountTierRecord> {
        let ledgers: Vec<SharedLedger> = self.accounts.read().values().cloned().collect();
        let mut records: Vec<AccountTierRecord> = ledgers.iter().map(|l| l.lock().record()).collect();
        records.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        records
    }

    fn ledger_for(&self, account_id: &str, catalog: &ConstraintCatalog) -> SharedLedger {
        if let Some(ledger) = self.accounts.read().get(account_id) {
            return ledger.clone();
        }
        self.accounts
            .write()
            .entry(account_id.to_string())
            .or_insert_with(|| {
                info!(account_id, tier = %catalog.initial_tier, "registering account");
                Arc::new(Mutex::new(PermissionLedger::new(
                    account_id,
                    catalog.initial_tier,
                    "initial tier",
                )))
            })
            .clone()
    }
}
