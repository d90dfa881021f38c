use tiergate_config::{HardLimits, SoftRules, TierLimits};
use tiergate_core::{AccountSnapshot, TradeProposal};
use tracing::{debug, info, warn};

/// Verdict of a single hard constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintVerdict {
    Pass,
    /// Proposal is rejected with a reason.
    Reject(String),
}

/// The proposal after soft constraints adjusted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub notional_usd: f64,
    /// Required margin scaled in proportion to the notional.
    pub required_margin: f64,
    /// Why the notional was reduced. Empty when untouched.
    pub reductions: Vec<String>,
    /// Non-blocking annotations.
    pub warnings: Vec<String>,
}

impl Adjustment {
    fn unchanged(proposal: &TradeProposal) -> Self {
        Self {
            notional_usd: proposal.notional_usd,
            required_margin: proposal.required_margin,
            reductions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_reduced(&self) -> bool {
        !self.reductions.is_empty()
    }

    fn reduce_to(&mut self, proposal: &TradeProposal, notional: f64, why: String) {
        let notional = notional.clamp(0.0, self.notional_usd);
        self.notional_usd = notional;
        self.required_margin = if proposal.notional_usd > 0.0 {
            proposal.required_margin * (notional / proposal.notional_usd)
        } else {
            proposal.required_margin
        };
        self.reductions.push(why);
    }
}

/// Outcome of the soft pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SoftOutcome {
    Adjusted(Adjustment),
    Rejected(String),
}

/// Everything a hard constraint may look at.
pub struct ProposalContext<'a> {
    pub proposal: &'a TradeProposal,
    pub account: &'a AccountSnapshot,
    pub tier: &'a TierLimits,
    pub hard: &'a HardLimits,
    /// Notional after soft adjustments.
    pub notional_usd: f64,
    /// Margin the trade consumes; zero for closes and holds.
    pub required_margin: f64,
}

/// A single capital-preservation rule.
pub trait HardConstraint: Send + Sync {
    fn name(&self) -> &str;

    /// Account-protection rules run for every direction; the rest only for
    /// proposals that open a position.
    fn protects_account(&self) -> bool {
        false
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict;
}

/// Applies soft adjustments and hard constraints to one proposal.
///
/// Stateless across calls: limits come in as arguments, so one validator can
/// serve every account and survive catalog swaps.
pub struct ConstraintValidator {
    rules: Vec<Box<dyn HardConstraint>>,
}

impl Default for ConstraintValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintValidator {
    pub fn new() -> Self {
        let mut validator = Self { rules: Vec::new() };
        // Register built-in constraints. Order only decides which reason is reported.
        validator.add_rule(Box::new(MarginRatioConstraint));
        validator.add_rule(Box::new(DrawdownConstraint));
        validator.add_rule(Box::new(DailyLossConstraint));
        validator.add_rule(Box::new(LeverageCeilingConstraint));
        validator.add_rule(Box::new(CashReserveConstraint));
        validator.add_rule(Box::new(AssetConcentrationConstraint));
        validator.add_rule(Box::new(TierLeverageConstraint));
        validator
    }

    pub fn add_rule(&mut self, rule: Box<dyn HardConstraint>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Confidence scaling, frequency guidance and tier sizing.
    pub fn check_soft(
        &self,
        proposal: &TradeProposal,
        account: &AccountSnapshot,
        tier: &TierLimits,
        soft: &SoftRules,
    ) -> SoftOutcome {
        let mut adj = Adjustment::unchanged(proposal);
        let opens = proposal.direction.opens_position();

        // ── Confidence ───
        if opens {
            let threshold = tier.confidence_threshold;
            if proposal.confidence < threshold {
                if proposal.confidence >= threshold - soft.confidence_band {
                    let reduced = proposal.notional_usd * soft.reduction_factor;
                    adj.reduce_to(
                        proposal,
                        reduced,
                        format!(
                            "confidence {:.2} within {:.2} of threshold {:.2}",
                            proposal.confidence, soft.confidence_band, threshold
                        ),
                    );
                } else {
                    return SoftOutcome::Rejected(format!(
                        "confidence below threshold: {:.2} < {:.2} for {}",
                        proposal.confidence, threshold, tier.tier
                    ));
                }
            }
        }

        // ── Frequency ───
        // Closes and holds stay available at the limit so an account can always de-risk.
        if opens {
            if let Some(max) = tier.max_daily_trades {
                let count = account.daily_trade_count;
                if count >= max {
                    return SoftOutcome::Rejected(format!(
                        "daily trade limit reached: {count}/{max} for {}",
                        tier.tier
                    ));
                }
                if f64::from(count) >= f64::from(max) * soft.frequency_warning_ratio {
                    warn!(count, max, tier = %tier.tier, "approaching daily trade limit");
                    adj.warnings.push(format!(
                        "approaching daily trade limit: {count}/{max}"
                    ));
                }
            }
        }

        // ── Tier sizing ───
        if opens {
            let cap = account.equity * tier.max_position_pct;
            if adj.notional_usd > cap {
                let from = adj.notional_usd;
                adj.reduce_to(
                    proposal,
                    cap,
                    format!(
                        "notional {from:.2} capped at {:.0}% of equity ({cap:.2}) for {}",
                        tier.max_position_pct * 100.0,
                        tier.tier
                    ),
                );
            }
        }

        SoftOutcome::Adjusted(adj)
    }

    /// Run hard constraints, stopping at the first failure.
    pub fn check_hard(
        &self,
        proposal: &TradeProposal,
        account: &AccountSnapshot,
        adjustment: &Adjustment,
        tier: &TierLimits,
        hard: &HardLimits,
    ) -> ConstraintVerdict {
        let opens = proposal.direction.opens_position();
        let ctx = ProposalContext {
            proposal,
            account,
            tier,
            hard,
            notional_usd: adjustment.notional_usd,
            required_margin: if opens { adjustment.required_margin } else { 0.0 },
        };

        for rule in &self.rules {
            if !opens && !rule.protects_account() {
                continue;
            }
            match rule.evaluate(&ctx) {
                ConstraintVerdict::Pass => {
                    debug!(rule = rule.name(), "hard constraint passed");
                }
                verdict @ ConstraintVerdict::Reject(_) => {
                    info!(
                        rule = rule.name(),
                        symbol = %proposal.symbol,
                        "hard constraint rejected proposal"
                    );
                    return verdict;
                }
            }
        }

        ConstraintVerdict::Pass
    }
}

// ── Built-in hard constraints ──────────────────────────────────

/// Projected margin ratio after posting the trade's margin.
struct MarginRatioConstraint;

impl HardConstraint for MarginRatioConstraint {
    fn name(&self) -> &str {
        "margin_ratio"
    }

    fn protects_account(&self) -> bool {
        true
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
        let projected = ctx.account.margin_ratio - ctx.required_margin / ctx.account.equity;
        if projected < ctx.hard.min_margin_ratio {
            ConstraintVerdict::Reject(format!(
                "margin ratio after trade {:.3} below minimum {:.3}",
                projected, ctx.hard.min_margin_ratio
            ))
        } else {
            ConstraintVerdict::Pass
        }
    }
}

struct DrawdownConstraint;

impl HardConstraint for DrawdownConstraint {
    fn name(&self) -> &str {
        "total_drawdown"
    }

    fn protects_account(&self) -> bool {
        true
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
        if ctx.account.total_drawdown >= ctx.hard.max_total_drawdown {
            ConstraintVerdict::Reject(format!(
                "total drawdown {:.2}% at or above limit {:.2}%",
                ctx.account.total_drawdown * 100.0,
                ctx.hard.max_total_drawdown * 100.0
            ))
        } else {
            ConstraintVerdict::Pass
        }
    }
}

struct DailyLossConstraint;

impl HardConstraint for DailyLossConstraint {
    fn name(&self) -> &str {
        "daily_loss"
    }

    fn protects_account(&self) -> bool {
        true
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
        if ctx.account.daily_loss_pct >= ctx.hard.max_daily_loss {
            ConstraintVerdict::Reject(format!(
                "daily loss {:.2}% at or above limit {:.2}%",
                ctx.account.daily_loss_pct * 100.0,
                ctx.hard.max_daily_loss * 100.0
            ))
        } else {
            ConstraintVerdict::Pass
        }
    }
}

/// Absolute leverage ceiling, whatever the tier.
struct LeverageCeilingConstraint;

impl HardConstraint for LeverageCeilingConstraint {
    fn name(&self) -> &str {
        "leverage_ceiling"
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
        if ctx.proposal.leverage > ctx.hard.max_leverage {
            ConstraintVerdict::Reject(format!(
                "leverage {}x exceeds absolute maximum {}x",
                ctx.proposal.leverage, ctx.hard.max_leverage
            ))
        } else {
            ConstraintVerdict::Pass
        }
    }
}

struct CashReserveConstraint;

impl HardConstraint for CashReserveConstraint {
    fn name(&self) -> &str {
        "cash_reserve"
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
        let remaining = ctx.account.cash_balance - ctx.required_margin;
        let reserve = ctx.account.equity * ctx.hard.min_cash_reserve_pct;
        if remaining < reserve {
            ConstraintVerdict::Reject(format!(
                "cash after margin {remaining:.2} below reserve {reserve:.2}"
            ))
        } else {
            ConstraintVerdict::Pass
        }
    }
}

/// Single-symbol concentration, existing exposure included.
struct AssetConcentrationConstraint;

impl HardConstraint for AssetConcentrationConstraint {
    fn name(&self) -> &str {
        "asset_concentration"
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
        let existing = ctx.account.exposure(&ctx.proposal.symbol);
        let share = (existing + ctx.notional_usd) / ctx.account.equity;
        if share > ctx.hard.max_single_asset_pct {
            ConstraintVerdict::Reject(format!(
                "{} exposure would reach {:.2}% of equity, limit {:.2}%",
                ctx.proposal.symbol,
                share * 100.0,
                ctx.hard.max_single_asset_pct * 100.0
            ))
        } else {
            ConstraintVerdict::Pass
        }
    }
}

struct TierLeverageConstraint;

impl HardConstraint for TierLeverageConstraint {
    fn name(&self) -> &str {
        "tier_leverage"
    }

    fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
        if ctx.proposal.leverage > ctx.tier.max_leverage {
            ConstraintVerdict::Reject(format!(
                "leverage {}x exceeds {} limit {}x",
                ctx.proposal.leverage, ctx.tier.tier, ctx.tier.max_leverage
            ))
        } else {
            ConstraintVerdict::Pass
        }
    }
}
