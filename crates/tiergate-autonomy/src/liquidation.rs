use serde::{Deserialize, Serialize};
use tiergate_config::LiquidationLimits;
use tiergate_core::AccountSnapshot;

/// Why an account must be liquidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiquidationTrigger {
    /// Margin ratio fell below the forced-liquidation floor
    MarginRatio { ratio: f64, limit: f64 },
    /// Loss for the current day reached the limit
    DailyLoss { loss: f64, limit: f64 },
    /// Drawdown from peak equity reached the limit
    Drawdown { drawdown: f64, limit: f64 },
}

impl std::fmt::Display for LiquidationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiquidationTrigger::MarginRatio { ratio, limit } => {
                write!(f, "margin ratio {:.3} below liquidation floor {:.3}", ratio, limit)
            }
            LiquidationTrigger::DailyLoss { loss, limit } => write!(
                f,
                "daily loss {:.2}% reached limit {:.2}%",
                loss * 100.0,
                limit * 100.0
            ),
            LiquidationTrigger::Drawdown { drawdown, limit } => write!(
                f,
                "total drawdown {:.2}% reached limit {:.2}%",
                drawdown * 100.0,
                limit * 100.0
            ),
        }
    }
}

/// Inspects account health and reports the first breached liquidation trigger.
///
/// Checks run in a fixed order (margin, daily loss, drawdown), so the reported
/// trigger is deterministic when several fire at once.
pub struct LiquidationMonitor<'a> {
    limits: &'a LiquidationLimits,
}

impl<'a> LiquidationMonitor<'a> {
    pub fn new(limits: &'a LiquidationLimits) -> Self {
        Self { limits }
    }

    pub fn check(&self, account: &AccountSnapshot) -> Option<LiquidationTrigger> {
        let l = self.limits;
        if account.margin_ratio < l.forced_liquidation_margin {
            return Some(LiquidationTrigger::MarginRatio {
                ratio: account.margin_ratio,
                limit: l.forced_liquidation_margin,
            });
        }
        if account.daily_loss_pct >= l.max_daily_loss {
            return Some(LiquidationTrigger::DailyLoss {
                loss: account.daily_loss_pct,
                limit: l.max_daily_loss,
            });
        }
        if account.total_drawdown >= l.max_total_drawdown {
            return Some(LiquidationTrigger::Drawdown {
                drawdown: account.total_drawdown,
                limit: l.max_total_drawdown,
            });
        }
        None
    }
}
