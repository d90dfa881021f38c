use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{GateError, Result};

/// Identifier of a trading account. Each account owns one permission ledger.
pub type AccountId = String;

/// Six permission tiers bounding how much autonomy a signal source gets:
///
/// - **T0 (Protection)**: no new positions; only closes and holds.
/// - **T1 (Probation)**: smallest sizes, highest confidence bar.
/// - **T2 (Restricted)**: modest sizing, low leverage.
/// - **T3 (Standard)**: normal operation.
/// - **T4 (Trusted)**: larger sizes and leverage.
/// - **T5 (Autonomous)**: maximum autonomy within hard limits.
///
/// Tiers serialize as their number (`3`, not `"Standard"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PermissionTier {
    Protection = 0,
    Probation = 1,
    Restricted = 2,
    Standard = 3,
    Trusted = 4,
    Autonomous = 5,
}

impl PermissionTier {
    pub const ALL: [PermissionTier; 6] = [
        Self::Protection,
        Self::Probation,
        Self::Restricted,
        Self::Standard,
        Self::Trusted,
        Self::Autonomous,
    ];

    pub fn level(self) -> u8 {
        self as u8
    }

    /// Whether this tier may open new positions at all.
    pub fn allows_new_positions(self) -> bool {
        self > Self::Protection
    }

    /// The tier one step above, if any.
    pub fn next_up(self) -> Option<Self> {
        Self::try_from(self.level() + 1).ok()
    }

    /// The tier one step below, if any.
    pub fn next_down(self) -> Option<Self> {
        self.level().checked_sub(1).and_then(|l| Self::try_from(l).ok())
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Protection => "Protection",
            Self::Probation => "Probation",
            Self::Restricted => "Restricted",
            Self::Standard => "Standard",
            Self::Trusted => "Trusted",
            Self::Autonomous => "Autonomous",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Protection => "No new positions, closes and holds only",
            Self::Probation => "Smallest sizing, highest confidence requirement",
            Self::Restricted => "Modest sizing and leverage",
            Self::Standard => "Normal autonomous operation",
            Self::Trusted => "Larger sizing and leverage",
            Self::Autonomous => "Maximum autonomy within hard limits",
        }
    }
}

impl TryFrom<u8> for PermissionTier {
    type Error = GateError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Protection),
            1 => Ok(Self::Probation),
            2 => Ok(Self::Restricted),
            3 => Ok(Self::Standard),
            4 => Ok(Self::Trusted),
            5 => Ok(Self::Autonomous),
            other => Err(GateError::UnknownTier(other)),
        }
    }
}

impl From<PermissionTier> for u8 {
    fn from(tier: PermissionTier) -> u8 {
        tier as u8
    }
}

impl fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{} ({})", self.level(), self.name())
    }
}

/// What a proposal wants to do with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Close,
    Hold,
}

impl Direction {
    /// Long and short add exposure; close and hold never do.
    pub fn opens_position(self) -> bool {
        matches!(self, Self::Long | Self::Short)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Close => "close",
            Self::Hold => "hold",
        })
    }
}

/// Recent trading performance of the signal source, produced by the caller
/// once per evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub win_rate_7d: f64,
    pub win_rate_30d: f64,
    pub sharpe_ratio: f64,
    /// Fraction of equity lost from the peak (0..1).
    pub max_drawdown: f64,
    pub consecutive_losses: u32,
    pub total_trades: u32,
    pub profitable_trades: u32,
    pub days_active: u32,
    /// Share of trading days that closed in profit (0..1).
    pub profit_consistency: f64,
    pub consecutive_profitable_days: u32,
}

impl PerformanceSnapshot {
    pub fn validate(&self) -> Result<()> {
        fraction("performance.win_rate_7d", self.win_rate_7d)?;
        fraction("performance.win_rate_30d", self.win_rate_30d)?;
        finite("performance.sharpe_ratio", self.sharpe_ratio)?;
        fraction("performance.max_drawdown", self.max_drawdown)?;
        fraction("performance.profit_consistency", self.profit_consistency)?;
        if self.profitable_trades > self.total_trades {
            return Err(GateError::precondition(
                "performance.profitable_trades",
                format!(
                    "{} profitable trades exceeds {} total trades",
                    self.profitable_trades, self.total_trades
                ),
            ));
        }
        Ok(())
    }
}

/// Current state of the trading account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub cash_balance: f64,
    /// Available collateral relative to required collateral.
    pub margin_ratio: f64,
    pub total_drawdown: f64,
    pub daily_loss_pct: f64,
    /// Notional value currently held per symbol.
    #[serde(default)]
    pub per_asset_exposure: HashMap<String, f64>,
    pub daily_trade_count: u32,
}

impl AccountSnapshot {
    pub fn validate(&self) -> Result<()> {
        finite("account.equity", self.equity)?;
        if self.equity <= 0.0 {
            return Err(GateError::precondition(
                "account.equity",
                format!("equity must be positive, got {}", self.equity),
            ));
        }
        finite("account.cash_balance", self.cash_balance)?;
        non_negative("account.margin_ratio", self.margin_ratio)?;
        fraction("account.total_drawdown", self.total_drawdown)?;
        fraction("account.daily_loss_pct", self.daily_loss_pct)?;
        for (symbol, notional) in &self.per_asset_exposure {
            non_negative(&format!("account.per_asset_exposure.{symbol}"), *notional)?;
        }
        Ok(())
    }

    /// Existing notional held in `symbol`, zero if none.
    pub fn exposure(&self, symbol: &str) -> f64 {
        self.per_asset_exposure.get(symbol).copied().unwrap_or(0.0)
    }
}

/// A candidate action from the signal source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub symbol: String,
    pub direction: Direction,
    pub notional_usd: f64,
    pub leverage: u32,
    pub confidence: f64,
    pub required_margin: f64,
}

impl TradeProposal {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(GateError::precondition("proposal.symbol", "symbol is empty"));
        }
        non_negative("proposal.notional_usd", self.notional_usd)?;
        fraction("proposal.confidence", self.confidence)?;
        non_negative("proposal.required_margin", self.required_margin)?;
        if self.direction.opens_position() && self.leverage == 0 {
            return Err(GateError::precondition(
                "proposal.leverage",
                "opening proposals need leverage of at least 1",
            ));
        }
        Ok(())
    }
}

/// What moved an account from one tier to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSource {
    /// Cyclical performance evaluation.
    Evaluator,
    /// Forced liquidation override.
    Liquidation,
    /// Administrative override by a named operator.
    ManualOverride,
}

/// Audit record of a single tier change. The gate hands these to the caller;
/// it never keeps a log of them itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTransition {
    pub account_id: AccountId,
    pub from: PermissionTier,
    pub to: PermissionTier,
    pub reason: String,
    pub source: TransitionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub at: DateTime<Utc>,
}

impl TierTransition {
    pub fn is_downgrade(&self) -> bool {
        self.to < self.from
    }
}

/// The persisted row for one account: everything the host needs to restore
/// the account's tier after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTierRecord {
    pub account_id: AccountId,
    pub tier: PermissionTier,
    pub updated_at: DateTime<Utc>,
    pub reason: String,
}

fn finite(field: &str, v: f64) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(GateError::precondition(field, format!("{v} is not a finite number")))
    }
}

fn non_negative(field: &str, v: f64) -> Result<()> {
    finite(field, v)?;
    if v < 0.0 {
        return Err(GateError::precondition(field, format!("{v} is negative")));
    }
    Ok(())
}

fn fraction(field: &str, v: f64) -> Result<()> {
    finite(field, v)?;
    if !(0.0..=1.0).contains(&v) {
        return Err(GateError::precondition(field, format!("{v} is outside 0..1")));
    }
    Ok(())
}
