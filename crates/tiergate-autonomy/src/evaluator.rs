use tiergate_config::{ConstraintCatalog, DowngradeRule, UpgradeRule};
use tiergate_core::{PermissionTier, PerformanceSnapshot};

/// Which rule produced a tier assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentKind {
    /// Global drop to T0.
    Protection,
    /// One-step tier-specific drop.
    Downgrade,
    /// One-step climb.
    Upgrade,
    Stable,
}

/// Result of one evaluation: where the account should be, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct TierAssessment {
    pub next: PermissionTier,
    pub reason: String,
    pub kind: AssessmentKind,
}

impl TierAssessment {
    fn new(next: PermissionTier, kind: AssessmentKind, reason: impl Into<String>) -> Self {
        Self {
            next,
            reason: reason.into(),
            kind,
        }
    }
}

/// Decides the next tier from `(current tier, performance)`.
///
/// Pure: reads only its arguments and the catalog it borrows, so the same
/// inputs always produce the same assessment. Checks run in a fixed order:
///
/// 1. global protection (drawdown / loss streak) drops straight to T0;
/// 2. the current tier's downgrade rule drops one step;
/// 3. the current tier's upgrade rule climbs one step (never out of T0);
/// 4. otherwise the tier is stable.
pub struct TierEvaluator<'a> {
    catalog: &'a ConstraintCatalog,
}

impl<'a> TierEvaluator<'a> {
    pub fn new(catalog: &'a ConstraintCatalog) -> Self {
        Self { catalog }
    }

    pub fn evaluate(
        &self,
        current: PermissionTier,
        perf: &PerformanceSnapshot,
    ) -> tiergate_core::Result<TierAssessment> {
        if let Some(why) = self.protection_breach(perf) {
            return Ok(TierAssessment::new(
                PermissionTier::Protection,
                AssessmentKind::Protection,
                format!("risk protection triggered: {why}"),
            ));
        }

        if current == PermissionTier::Protection {
            return Ok(TierAssessment::new(
                current,
                AssessmentKind::Stable,
                "protection mode: manual override required",
            ));
        }

        let limits = self.catalog.tier_limits(current)?;

        if let (Some(rule), Some(lower)) = (limits.downgrade.as_ref(), current.next_down()) {
            if let Some(why) = downgrade_breach(rule, perf) {
                return Ok(TierAssessment::new(
                    lower,
                    AssessmentKind::Downgrade,
                    format!("downgrade {current} -> {lower}: {why}"),
                ));
            }
        }

        if let (Some(rule), Some(higher)) = (limits.upgrade.as_ref(), current.next_up()) {
            if upgrade_met(rule, perf) {
                return Ok(TierAssessment::new(
                    higher,
                    AssessmentKind::Upgrade,
                    format!("upgrade {current} -> {higher}: conditions met"),
                ));
            }
        }

        Ok(TierAssessment::new(current, AssessmentKind::Stable, "stable"))
    }

    fn protection_breach(&self, perf: &PerformanceSnapshot) -> Option<String> {
        let rule = &self.catalog.protection;
        if perf.max_drawdown >= rule.max_drawdown {
            return Some(format!(
                "max drawdown {:.2}% >= {:.2}%",
                perf.max_drawdown * 100.0,
                rule.max_drawdown * 100.0
            ));
        }
        if perf.consecutive_losses >= rule.max_consecutive_losses {
            return Some(format!(
                "{} consecutive losses >= {}",
                perf.consecutive_losses, rule.max_consecutive_losses
            ));
        }
        None
    }
}

fn downgrade_breach(rule: &DowngradeRule, perf: &PerformanceSnapshot) -> Option<String> {
    if let Some(min) = rule.min_win_rate_30d {
        if perf.win_rate_30d < min {
            return Some(format!("30d win rate {:.2} < {:.2}", perf.win_rate_30d, min));
        }
    }
    if let Some(min) = rule.min_win_rate_7d {
        if perf.win_rate_7d < min {
            return Some(format!("7d win rate {:.2} < {:.2}", perf.win_rate_7d, min));
        }
    }
    if let Some(max) = rule.max_consecutive_losses {
        if perf.consecutive_losses >= max {
            return Some(format!("{} consecutive losses >= {}", perf.consecutive_losses, max));
        }
    }
    None
}

fn upgrade_met(rule: &UpgradeRule, perf: &PerformanceSnapshot) -> bool {
    perf.days_active >= rule.min_days_active
        && perf.win_rate_7d >= rule.min_win_rate_7d
        && perf.win_rate_30d >= rule.min_win_rate_30d
        && perf.sharpe_ratio >= rule.min_sharpe_ratio
        && perf.max_drawdown <= rule.max_drawdown
        && perf.total_trades >= rule.min_total_trades
        && perf.profit_consistency >= rule.min_profit_consistency
        && perf.consecutive_profitable_days >= rule.min_consecutive_profitable_days
}
