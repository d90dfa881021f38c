use serde::{Deserialize, Serialize};
use tiergate_core::{GateError, PermissionTier};

use crate::schema::{ConfigWarning, WarningSeverity};

/// Every threshold the gate evaluates against. Loaded once, validated as a
/// whole, and swapped atomically; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintCatalog {
    /// Tier assigned to an account the gate has not seen before.
    pub initial_tier: PermissionTier,
    /// One entry per tier, T0 through T5.
    pub tiers: Vec<TierLimits>,
    pub hard: HardLimits,
    pub soft: SoftRules,
    pub liquidation: LiquidationLimits,
    pub protection: ProtectionRule,
}

// ── Tier table ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    pub tier: PermissionTier,
    /// Largest single position as a fraction of equity.
    pub max_position_pct: f64,
    pub max_leverage: u32,
    /// Minimum signal confidence for full-size approval (0..1).
    pub confidence_threshold: f64,
    /// Trades allowed per day. Absent means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_daily_trades: Option<u32>,
    /// When to drop one tier. Absent for tiers that only fall via protection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downgrade: Option<DowngradeRule>,
    /// What it takes to climb to the next tier. Absent for T0 and T5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<UpgradeRule>,
}

/// Any single breached condition triggers a one-step downgrade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DowngradeRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_win_rate_7d: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_win_rate_30d: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_losses: Option<u32>,
}

/// All conditions must hold for a one-step upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeRule {
    pub min_days_active: u32,
    pub min_win_rate_7d: f64,
    pub min_win_rate_30d: f64,
    pub min_sharpe_ratio: f64,
    /// Upgrade only while drawdown stays at or below this fraction.
    pub max_drawdown: f64,
    pub min_total_trades: u32,
    pub min_profit_consistency: f64,
    pub min_consecutive_profitable_days: u32,
}

impl Default for UpgradeRule {
    fn default() -> Self {
        Self {
            min_days_active: 0,
            min_win_rate_7d: 0.0,
            min_win_rate_30d: 0.0,
            min_sharpe_ratio: 0.0,
            max_drawdown: 1.0,
            min_total_trades: 0,
            min_profit_consistency: 0.0,
            min_consecutive_profitable_days: 0,
        }
    }
}

// ── Account-level limits ───────────────────────────────────────

/// Capital-preservation limits. Breaking any of them rejects the proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardLimits {
    /// Minimum projected margin ratio after the trade.
    pub min_margin_ratio: f64,
    pub max_total_drawdown: f64,
    pub max_daily_loss: f64,
    /// Absolute leverage ceiling, independent of tier.
    pub max_leverage: u32,
    /// Cash that must remain after posting margin, as a fraction of equity.
    pub min_cash_reserve_pct: f64,
    /// Largest exposure to one symbol, as a fraction of equity.
    pub max_single_asset_pct: f64,
}

impl Default for HardLimits {
    fn default() -> Self {
        Self {
            min_margin_ratio: 0.20,
            max_total_drawdown: 0.10,
            max_daily_loss: 0.05,
            max_leverage: 5,
            min_cash_reserve_pct: 0.10,
            max_single_asset_pct: 0.30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftRules {
    /// How far below the tier's confidence threshold a signal may fall and
    /// still be approved at reduced size.
    pub confidence_band: f64,
    /// Multiplier applied to the notional of a reduced approval.
    pub reduction_factor: f64,
    /// Share of the daily trade limit at which a warning is attached.
    pub frequency_warning_ratio: f64,
}

impl Default for SoftRules {
    fn default() -> Self {
        Self {
            confidence_band: 0.05,
            reduction_factor: 0.5,
            frequency_warning_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidationLimits {
    /// Force liquidation when the margin ratio drops below this.
    pub forced_liquidation_margin: f64,
    pub max_daily_loss: f64,
    pub max_total_drawdown: f64,
}

impl Default for LiquidationLimits {
    fn default() -> Self {
        Self {
            forced_liquidation_margin: 0.15,
            max_daily_loss: 0.05,
            max_total_drawdown: 0.10,
        }
    }
}

/// Global drop to T0 from any tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionRule {
    pub max_drawdown: f64,
    pub max_consecutive_losses: u32,
}

impl Default for ProtectionRule {
    fn default() -> Self {
        Self {
            max_drawdown: 0.10,
            max_consecutive_losses: 5,
        }
    }
}

impl Default for ConstraintCatalog {
    fn default() -> Self {
        Self {
            initial_tier: PermissionTier::Probation,
            tiers: default_tier_table(),
            hard: HardLimits::default(),
            soft: SoftRules::default(),
            liquidation: LiquidationLimits::default(),
            protection: ProtectionRule::default(),
        }
    }
}

fn default_tier_table() -> Vec<TierLimits> {
    vec![
        TierLimits {
            tier: PermissionTier::Protection,
            max_position_pct: 0.0,
            max_leverage: 0,
            confidence_threshold: 1.0,
            // Closes must always be possible in protection mode.
            max_daily_trades: None,
            downgrade: None,
            upgrade: None,
        },
        TierLimits {
            tier: PermissionTier::Probation,
            max_position_pct: 0.05,
            max_leverage: 1,
            confidence_threshold: 0.80,
            max_daily_trades: Some(5),
            downgrade: None,
            upgrade: Some(UpgradeRule {
                min_days_active: 7,
                min_win_rate_7d: 0.55,
                min_win_rate_30d: 0.50,
                min_sharpe_ratio: 0.5,
                max_drawdown: 0.05,
                min_total_trades: 20,
                ..UpgradeRule::default()
            }),
        },
        TierLimits {
            tier: PermissionTier::Restricted,
            max_position_pct: 0.10,
            max_leverage: 2,
            confidence_threshold: 0.75,
            max_daily_trades: Some(10),
            downgrade: Some(DowngradeRule {
                max_consecutive_losses: Some(3),
                ..DowngradeRule::default()
            }),
            upgrade: Some(UpgradeRule {
                min_days_active: 14,
                min_win_rate_7d: 0.55,
                min_win_rate_30d: 0.55,
                min_sharpe_ratio: 1.0,
                max_drawdown: 0.05,
                min_total_trades: 50,
                ..UpgradeRule::default()
            }),
        },
        TierLimits {
            tier: PermissionTier::Standard,
            max_position_pct: 0.15,
            max_leverage: 3,
            confidence_threshold: 0.70,
            max_daily_trades: Some(20),
            downgrade: Some(DowngradeRule {
                min_win_rate_7d: Some(0.45),
                ..DowngradeRule::default()
            }),
            upgrade: Some(UpgradeRule {
                min_days_active: 30,
                min_win_rate_7d: 0.60,
                min_win_rate_30d: 0.58,
                min_sharpe_ratio: 1.5,
                max_drawdown: 0.04,
                min_total_trades: 100,
                min_profit_consistency: 0.55,
                ..UpgradeRule::default()
            }),
        },
        TierLimits {
            tier: PermissionTier::Trusted,
            max_position_pct: 0.20,
            max_leverage: 4,
            confidence_threshold: 0.65,
            max_daily_trades: Some(30),
            downgrade: Some(DowngradeRule {
                min_win_rate_30d: Some(0.55),
                ..DowngradeRule::default()
            }),
            upgrade: Some(UpgradeRule {
                min_days_active: 60,
                min_win_rate_7d: 0.65,
                min_win_rate_30d: 0.65,
                min_sharpe_ratio: 2.0,
                max_drawdown: 0.03,
                min_total_trades: 200,
                min_profit_consistency: 0.60,
                min_consecutive_profitable_days: 5,
            }),
        },
        TierLimits {
            tier: PermissionTier::Autonomous,
            max_position_pct: 0.25,
            max_leverage: 5,
            confidence_threshold: 0.60,
            max_daily_trades: None,
            downgrade: Some(DowngradeRule {
                min_win_rate_30d: Some(0.65),
                ..DowngradeRule::default()
            }),
            upgrade: None,
        },
    ]
}

impl ConstraintCatalog {
    /// Limits for `tier`. Only fails on a catalog that skipped validation.
    pub fn tier_limits(&self, tier: PermissionTier) -> tiergate_core::Result<&TierLimits> {
        self.tiers
            .iter()
            .find(|t| t.tier == tier)
            .ok_or_else(|| GateError::Config(format!("tier table has no entry for {tier}")))
    }

    /// Validate the catalog and return every issue found.
    /// Returns `Err` with all error-severity messages joined if any exist.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();
        self.collect_issues(&mut warnings);
        crate::schema::split_errors(warnings)
    }

    pub(crate) fn collect_issues(&self, warnings: &mut Vec<ConfigWarning>) {
        // ── Tier table shape ───
        for tier in PermissionTier::ALL {
            let count = self.tiers.iter().filter(|t| t.tier == tier).count();
            if count == 0 {
                warnings.push(issue(
                    "catalog.tiers",
                    format!("tier table has a gap: {tier} is missing"),
                    WarningSeverity::Error,
                    Some("Define exactly one [[catalog.tiers]] entry per tier 0-5"),
                ));
            } else if count > 1 {
                warnings.push(issue(
                    "catalog.tiers",
                    format!("{tier} is defined {count} times"),
                    WarningSeverity::Error,
                    None,
                ));
            }
        }

        // ── Per-tier ranges ───
        for t in &self.tiers {
            let prefix = format!("catalog.tiers[{}]", t.tier.level());
            fraction(warnings, &format!("{prefix}.max_position_pct"), t.max_position_pct);
            fraction(warnings, &format!("{prefix}.confidence_threshold"), t.confidence_threshold);

            if t.tier == PermissionTier::Protection {
                if t.max_position_pct > 0.0 {
                    warnings.push(issue(
                        &format!("{prefix}.max_position_pct"),
                        "T0 position size is ignored; T0 never opens positions".into(),
                        WarningSeverity::Info,
                        None,
                    ));
                }
            } else {
                if t.max_leverage == 0 {
                    warnings.push(issue(
                        &format!("{prefix}.max_leverage"),
                        format!("{} allows no leverage at all", t.tier),
                        WarningSeverity::Error,
                        Some("Tiers above T0 need max_leverage >= 1"),
                    ));
                } else if t.max_leverage > self.hard.max_leverage {
                    warnings.push(issue(
                        &format!("{prefix}.max_leverage"),
                        format!(
                            "{}x exceeds the absolute ceiling of {}x; the ceiling wins",
                            t.max_leverage, self.hard.max_leverage
                        ),
                        WarningSeverity::Warning,
                        None,
                    ));
                }
                if t.max_daily_trades == Some(0) {
                    warnings.push(issue(
                        &format!("{prefix}.max_daily_trades"),
                        format!("{} can never trade", t.tier),
                        WarningSeverity::Warning,
                        Some("Remove the key for unbounded trading or set a positive limit"),
                    ));
                }
            }

            if let Some(ref d) = t.downgrade {
                if let Some(v) = d.min_win_rate_7d {
                    fraction(warnings, &format!("{prefix}.downgrade.min_win_rate_7d"), v);
                }
                if let Some(v) = d.min_win_rate_30d {
                    fraction(warnings, &format!("{prefix}.downgrade.min_win_rate_30d"), v);
                }
                if d.max_consecutive_losses == Some(0) {
                    warnings.push(issue(
                        &format!("{prefix}.downgrade.max_consecutive_losses"),
                        format!("0 downgrades {} on every evaluation", t.tier),
                        WarningSeverity::Error,
                        Some("Set a positive streak, e.g. 3, or remove the key"),
                    ));
                }
            }

            if let Some(ref u) = t.upgrade {
                let p = format!("{prefix}.upgrade");
                if t.tier == PermissionTier::Protection {
                    warnings.push(issue(
                        &p,
                        "T0 never upgrades automatically; this rule is ignored".into(),
                        WarningSeverity::Warning,
                        Some("Use a manual override to leave protection mode"),
                    ));
                }
                if t.tier == PermissionTier::Autonomous {
                    warnings.push(issue(
                        &p,
                        "T5 is the top tier; this rule is ignored".into(),
                        WarningSeverity::Info,
                        None,
                    ));
                }
                fraction(warnings, &format!("{p}.min_win_rate_7d"), u.min_win_rate_7d);
                fraction(warnings, &format!("{p}.min_win_rate_30d"), u.min_win_rate_30d);
                fraction(warnings, &format!("{p}.max_drawdown"), u.max_drawdown);
                fraction(warnings, &format!("{p}.min_profit_consistency"), u.min_profit_consistency);
                if !u.min_sharpe_ratio.is_finite() {
                    warnings.push(issue(
                        &format!("{p}.min_sharpe_ratio"),
                        format!("{} is not a finite number; the upgrade can never fire", u.min_sharpe_ratio),
                        WarningSeverity::Error,
                        Some("Use a plain number such as 1.0"),
                    ));
                }
                if u.max_drawdown >= self.protection.max_drawdown {
                    warnings.push(issue(
                        &format!("{p}.max_drawdown"),
                        format!(
                            "allows {:.1}% drawdown, which already trips protection at {:.1}%",
                            u.max_drawdown * 100.0,
                            self.protection.max_drawdown * 100.0
                        ),
                        WarningSeverity::Warning,
                        None,
                    ));
                }
            }
        }

        self.check_monotonic(warnings);
        self.check_hysteresis(warnings);

        // ── Hard limits ───
        fraction(warnings, "catalog.hard.min_margin_ratio", self.hard.min_margin_ratio);
        fraction(warnings, "catalog.hard.max_total_drawdown", self.hard.max_total_drawdown);
        fraction(warnings, "catalog.hard.max_daily_loss", self.hard.max_daily_loss);
        fraction(warnings, "catalog.hard.min_cash_reserve_pct", self.hard.min_cash_reserve_pct);
        fraction(warnings, "catalog.hard.max_single_asset_pct", self.hard.max_single_asset_pct);
        if self.hard.max_leverage == 0 {
            warnings.push(issue(
                "catalog.hard.max_leverage",
                "absolute leverage ceiling is 0, nothing can be opened".into(),
                WarningSeverity::Error,
                Some("Set to e.g. 5"),
            ));
        }

        // ── Soft rules ───
        fraction(warnings, "catalog.soft.confidence_band", self.soft.confidence_band);
        if !(self.soft.reduction_factor > 0.0 && self.soft.reduction_factor <= 1.0) {
            warnings.push(issue(
                "catalog.soft.reduction_factor",
                format!("{} is outside (0, 1]", self.soft.reduction_factor),
                WarningSeverity::Error,
                Some("A reduced approval must keep a positive share of the notional, e.g. 0.5"),
            ));
        }
        if !(self.soft.frequency_warning_ratio > 0.0 && self.soft.frequency_warning_ratio <= 1.0) {
            warnings.push(issue(
                "catalog.soft.frequency_warning_ratio",
                format!("{} is outside (0, 1]", self.soft.frequency_warning_ratio),
                WarningSeverity::Error,
                None,
            ));
        }

        // ── Liquidation ───
        fraction(
            warnings,
            "catalog.liquidation.forced_liquidation_margin",
            self.liquidation.forced_liquidation_margin,
        );
        fraction(warnings, "catalog.liquidation.max_daily_loss", self.liquidation.max_daily_loss);
        fraction(
            warnings,
            "catalog.liquidation.max_total_drawdown",
            self.liquidation.max_total_drawdown,
        );
        if self.liquidation.forced_liquidation_margin >= self.hard.min_margin_ratio {
            warnings.push(issue(
                "catalog.liquidation.forced_liquidation_margin",
                format!(
                    "liquidation margin {} is not below the hard minimum {}",
                    self.liquidation.forced_liquidation_margin, self.hard.min_margin_ratio
                ),
                WarningSeverity::Warning,
                Some("Liquidation should sit below the level where new trades are refused"),
            ));
        }

        // ── Protection ───
        fraction(warnings, "catalog.protection.max_drawdown", self.protection.max_drawdown);
        if self.protection.max_consecutive_losses == 0 {
            warnings.push(issue(
                "catalog.protection.max_consecutive_losses",
                "0 keeps every account permanently in protection mode".into(),
                WarningSeverity::Error,
                Some("Set to e.g. 5"),
            ));
        }

        // ── Initial tier ───
        if self.initial_tier >= PermissionTier::Standard {
            warnings.push(issue(
                "catalog.initial_tier",
                format!("new accounts start at {}", self.initial_tier),
                WarningSeverity::Warning,
                Some("New signal sources usually start at T1 and earn their way up"),
            ));
        }
    }

    /// Higher tiers should never be stricter than lower ones.
    fn check_monotonic(&self, warnings: &mut Vec<ConfigWarning>) {
        let mut sorted: Vec<&TierLimits> = self
            .tiers
            .iter()
            .filter(|t| t.tier.allows_new_positions())
            .collect();
        sorted.sort_by_key(|t| t.tier);
        for pair in sorted.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let stricter = hi.max_position_pct < lo.max_position_pct
                || hi.max_leverage < lo.max_leverage
                || hi.confidence_threshold > lo.confidence_threshold;
            if stricter {
                warnings.push(issue(
                    &format!("catalog.tiers[{}]", hi.tier.level()),
                    format!("{} is stricter than {}", hi.tier, lo.tier),
                    WarningSeverity::Warning,
                    Some("Sizing and leverage should grow, confidence bars should fall, with tier"),
                ));
            }
        }
    }

    /// An upgrade into tier N must not land the account inside tier N's own
    /// downgrade rule, otherwise it oscillates every cycle.
    fn check_hysteresis(&self, warnings: &mut Vec<ConfigWarning>) {
        for t in &self.tiers {
            let (Some(up), Some(next)) = (t.upgrade.as_ref(), t.tier.next_up()) else {
                continue;
            };
            let Some(down) = self
                .tiers
                .iter()
                .find(|n| n.tier == next)
                .and_then(|n| n.downgrade.as_ref())
            else {
                continue;
            };
            let field = format!("catalog.tiers[{}].upgrade", t.tier.level());
            if let Some(min) = down.min_win_rate_7d {
                if up.min_win_rate_7d < min {
                    warnings.push(oscillation(&field, "min_win_rate_7d", up.min_win_rate_7d, min, next));
                }
            }
            if let Some(min) = down.min_win_rate_30d {
                if up.min_win_rate_30d < min {
                    warnings.push(oscillation(&field, "min_win_rate_30d", up.min_win_rate_30d, min, next));
                }
            }
        }
    }
}

fn oscillation(field: &str, key: &str, up: f64, down: f64, next: PermissionTier) -> ConfigWarning {
    issue(
        &format!("{field}.{key}"),
        format!("upgrade requires {up} but {next} downgrades below {down}"),
        WarningSeverity::Warning,
        Some("Upgrade thresholds should be at least the destination tier's downgrade thresholds"),
    )
}

fn fraction(warnings: &mut Vec<ConfigWarning>, field: &str, v: f64) {
    if !v.is_finite() || !(0.0..=1.0).contains(&v) {
        warnings.push(issue(
            field,
            format!("{v} is outside 0..1"),
            WarningSeverity::Error,
            Some("Percentages are fractions, e.g. 0.10 for 10%"),
        ));
    }
}

fn issue(field: &str, message: String, severity: WarningSeverity, hint: Option<&str>) -> ConfigWarning {
    ConfigWarning {
        field: field.into(),
        message,
        severity,
        hint: hint.map(Into::into),
    }
}
