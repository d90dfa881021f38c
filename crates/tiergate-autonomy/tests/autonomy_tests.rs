#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tiergate_config::ConstraintCatalog;
    use tiergate_core::{
        AccountSnapshot, AccountTierRecord, Direction, PerformanceSnapshot, PermissionTier,
        TradeProposal,
    };

    fn healthy_account() -> AccountSnapshot {
        AccountSnapshot {
            equity: 100_000.0,
            cash_balance: 80_000.0,
            margin_ratio: 0.8,
            total_drawdown: 0.02,
            daily_loss_pct: 0.01,
            per_asset_exposure: Default::default(),
            daily_trade_count: 0,
        }
    }

    /// Middling record: no tier-specific downgrade below T4, no upgrade anywhere.
    fn steady_performance() -> PerformanceSnapshot {
        PerformanceSnapshot {
            win_rate_7d: 0.50,
            win_rate_30d: 0.50,
            sharpe_ratio: 0.5,
            max_drawdown: 0.02,
            consecutive_losses: 1,
            total_trades: 30,
            profitable_trades: 15,
            days_active: 10,
            profit_consistency: 0.5,
            consecutive_profitable_days: 1,
        }
    }

    /// Clears every default upgrade rule.
    fn strong_performance() -> PerformanceSnapshot {
        PerformanceSnapshot {
            win_rate_7d: 0.70,
            win_rate_30d: 0.70,
            sharpe_ratio: 2.5,
            max_drawdown: 0.02,
            consecutive_losses: 0,
            total_trades: 300,
            profitable_trades: 210,
            days_active: 90,
            profit_consistency: 0.70,
            consecutive_profitable_days: 10,
        }
    }

    fn proposal(direction: Direction, notional: f64, confidence: f64) -> TradeProposal {
        TradeProposal {
            symbol: "BTC-USD".into(),
            direction,
            notional_usd: notional,
            leverage: 1,
            confidence,
            required_margin: notional / 5.0,
        }
    }

    fn record(account: &str, tier: PermissionTier) -> AccountTierRecord {
        AccountTierRecord {
            account_id: account.into(),
            tier,
            updated_at: Utc::now(),
            reason: "fixture".into(),
        }
    }

    // ── Permission Ledger ──────────────────────────────────────

    mod ledger {
        use super::*;
        use tiergate_autonomy::PermissionLedger;
        use tiergate_core::TransitionSource;

        #[test]
        fn test_set_returns_transition() {
            let mut ledger = PermissionLedger::new("acct-1", PermissionTier::Probation, "initial tier");
            let t = ledger.set(
                PermissionTier::Restricted,
                "upgrade",
                TransitionSource::Evaluator,
                None,
            );
            assert_eq!(t.account_id, "acct-1");
            assert_eq!(t.from, PermissionTier::Probation);
            assert_eq!(t.to, PermissionTier::Restricted);
            assert_eq!(t.source, TransitionSource::Evaluator);
            assert!(!t.is_downgrade());
            assert_eq!(ledger.current(), PermissionTier::Restricted);
            assert_eq!(ledger.reason(), "upgrade");
            assert_eq!(ledger.updated_at(), t.at);
        }

        #[test]
        fn test_current_is_idempotent() {
            let ledger = PermissionLedger::new("acct-1", PermissionTier::Standard, "x");
            assert_eq!(ledger.current(), ledger.current());
            assert_eq!(ledger.current(), PermissionTier::Standard);
        }

        #[test]
        fn test_set_level_rejects_unknown_tier() {
            let mut ledger = PermissionLedger::new("acct-1", PermissionTier::Standard, "x");
            let err = ledger
                .set_level(9, "bad", TransitionSource::ManualOverride, Some("ops".into()))
                .unwrap_err();
            assert!(err.is_precondition());
            assert_eq!(ledger.current(), PermissionTier::Standard);
            assert_eq!(ledger.reason(), "x");
        }

        #[test]
        fn test_set_level_known_tier() {
            let mut ledger = PermissionLedger::new("acct-1", PermissionTier::Protection, "x");
            let t = ledger
                .set_level(2, "reinstated", TransitionSource::ManualOverride, Some("ops".into()))
                .unwrap();
            assert_eq!(t.to, PermissionTier::Restricted);
            assert_eq!(t.operator.as_deref(), Some("ops"));
        }

        #[test]
        fn test_record_roundtrip() {
            let ledger = PermissionLedger::new("acct-1", PermissionTier::Trusted, "restored");
            let row = ledger.record();
            let back = PermissionLedger::from_record(row.clone());
            assert_eq!(back.account_id(), "acct-1");
            assert_eq!(back.current(), PermissionTier::Trusted);
            assert_eq!(back.updated_at(), row.updated_at);
            assert_eq!(back.reason(), "restored");
        }
    }

    // ── Tier Evaluator ─────────────────────────────────────────

    mod evaluator {
        use super::*;
        use tiergate_autonomy::{AssessmentKind, TierEvaluator};

        fn assess(tier: PermissionTier, perf: &PerformanceSnapshot) -> (PermissionTier, String, AssessmentKind) {
            let catalog = ConstraintCatalog::default();
            let a = TierEvaluator::new(&catalog).evaluate(tier, perf).unwrap();
            (a.next, a.reason, a.kind)
        }

        #[test]
        fn test_drawdown_triggers_protection_from_any_tier() {
            let mut perf = strong_performance();
            perf.max_drawdown = 0.12;
            for tier in PermissionTier::ALL {
                let (next, reason, kind) = assess(tier, &perf);
                assert_eq!(next, PermissionTier::Protection);
                assert_eq!(kind, AssessmentKind::Protection);
                assert!(reason.starts_with("risk protection triggered"), "{reason}");
            }
        }

        #[test]
        fn test_loss_streak_protection_beats_tier_rule() {
            // T2 drops one step at 3 losses, but 5 losses is global protection.
            let mut perf = steady_performance();
            perf.consecutive_losses = 5;
            let (next, _, kind) = assess(PermissionTier::Restricted, &perf);
            assert_eq!(next, PermissionTier::Protection);
            assert_eq!(kind, AssessmentKind::Protection);
        }

        #[test]
        fn test_tier_specific_downgrades() {
            let mut t2 = steady_performance();
            t2.consecutive_losses = 3;
            assert_eq!(assess(PermissionTier::Restricted, &t2).0, PermissionTier::Probation);

            let mut t3 = steady_performance();
            t3.win_rate_7d = 0.40;
            assert_eq!(assess(PermissionTier::Standard, &t3).0, PermissionTier::Restricted);

            let mut t4 = strong_performance();
            t4.win_rate_30d = 0.50;
            assert_eq!(assess(PermissionTier::Trusted, &t4).0, PermissionTier::Standard);

            let mut t5 = strong_performance();
            t5.win_rate_30d = 0.60;
            let (next, reason, kind) = assess(PermissionTier::Autonomous, &t5);
            assert_eq!(next, PermissionTier::Trusted);
            assert_eq!(kind, AssessmentKind::Downgrade);
            assert!(reason.contains("30d win rate"), "{reason}");
        }

        #[test]
        fn test_downgrade_is_single_step() {
            let mut perf = strong_performance();
            perf.win_rate_30d = 0.40;
            perf.win_rate_7d = 0.40;
            assert_eq!(assess(PermissionTier::Autonomous, &perf).0, PermissionTier::Trusted);
        }

        #[test]
        fn test_upgrades_climb_one_step() {
            let perf = strong_performance();
            assert_eq!(assess(PermissionTier::Probation, &perf).0, PermissionTier::Restricted);
            assert_eq!(assess(PermissionTier::Restricted, &perf).0, PermissionTier::Standard);
            assert_eq!(assess(PermissionTier::Standard, &perf).0, PermissionTier::Trusted);
            let (next, reason, kind) = assess(PermissionTier::Trusted, &perf);
            assert_eq!(next, PermissionTier::Autonomous);
            assert_eq!(kind, AssessmentKind::Upgrade);
            assert!(reason.starts_with("upgrade"));
        }

        #[test]
        fn test_upgrade_needs_every_condition() {
            let mut perf = strong_performance();
            perf.consecutive_profitable_days = 4;
            assert_eq!(assess(PermissionTier::Trusted, &perf).0, PermissionTier::Trusted);

            let mut perf = strong_performance();
            perf.sharpe_ratio = 0.4;
            assert_eq!(assess(PermissionTier::Probation, &perf).0, PermissionTier::Probation);
        }

        #[test]
        fn test_protection_never_upgrades_automatically() {
            let (next, reason, kind) = assess(PermissionTier::Protection, &strong_performance());
            assert_eq!(next, PermissionTier::Protection);
            assert_eq!(kind, AssessmentKind::Stable);
            assert!(reason.contains("manual override"));
        }

        #[test]
        fn test_top_tier_is_stable() {
            let (next, reason, _) = assess(PermissionTier::Autonomous, &strong_performance());
            assert_eq!(next, PermissionTier::Autonomous);
            assert_eq!(reason, "stable");
        }

        #[test]
        fn test_stable_reason() {
            let (next, reason, kind) = assess(PermissionTier::Standard, &steady_performance());
            assert_eq!(next, PermissionTier::Standard);
            assert_eq!(reason, "stable");
            assert_eq!(kind, AssessmentKind::Stable);
        }

        #[test]
        fn test_deterministic() {
            let catalog = ConstraintCatalog::default();
            let eval = TierEvaluator::new(&catalog);
            for tier in PermissionTier::ALL {
                for perf in [steady_performance(), strong_performance()] {
                    let a = eval.evaluate(tier, &perf).unwrap();
                    let b = eval.evaluate(tier, &perf).unwrap();
                    assert_eq!(a, b);
                }
            }
        }
    }

    // ── Constraint Validator ───────────────────────────────────

    mod validator {
        use super::*;
        use tiergate_autonomy::{
            Adjustment, ConstraintValidator, ConstraintVerdict, HardConstraint, ProposalContext,
            SoftOutcome,
        };

        fn soft(tier: PermissionTier, p: &TradeProposal, a: &AccountSnapshot) -> SoftOutcome {
            let catalog = ConstraintCatalog::default();
            let limits = catalog.tier_limits(tier).unwrap();
            ConstraintValidator::new().check_soft(p, a, limits, &catalog.soft)
        }

        fn hard(tier: PermissionTier, p: &TradeProposal, a: &AccountSnapshot) -> ConstraintVerdict {
            let catalog = ConstraintCatalog::default();
            let limits = catalog.tier_limits(tier).unwrap();
            let validator = ConstraintValidator::new();
            let adj = match validator.check_soft(p, a, limits, &catalog.soft) {
                SoftOutcome::Adjusted(adj) => adj,
                SoftOutcome::Rejected(r) => panic!("soft rejection: {r}"),
            };
            validator.check_hard(p, a, &adj, limits, &catalog.hard)
        }

        fn adjusted(outcome: SoftOutcome) -> Adjustment {
            match outcome {
                SoftOutcome::Adjusted(adj) => adj,
                SoftOutcome::Rejected(r) => panic!("unexpected rejection: {r}"),
            }
        }

        fn rejection(verdict: ConstraintVerdict) -> String {
            match verdict {
                ConstraintVerdict::Reject(r) => r,
                ConstraintVerdict::Pass => panic!("expected rejection"),
            }
        }

        #[test]
        fn test_builtin_rules_registered() {
            let names = ConstraintValidator::new().rule_names().join(",");
            assert_eq!(
                names,
                "margin_ratio,total_drawdown,daily_loss,leverage_ceiling,cash_reserve,asset_concentration,tier_leverage"
            );
        }

        #[test]
        fn test_confidence_at_threshold_unchanged() {
            let p = proposal(Direction::Long, 10_000.0, 0.70);
            let adj = adjusted(soft(PermissionTier::Standard, &p, &healthy_account()));
            assert!(!adj.is_reduced());
            assert_eq!(adj.notional_usd, 10_000.0);
        }

        #[test]
        fn test_confidence_in_band_halves_notional_and_margin() {
            let p = proposal(Direction::Short, 10_000.0, 0.68);
            let adj = adjusted(soft(PermissionTier::Standard, &p, &healthy_account()));
            assert!(adj.is_reduced());
            assert!((adj.notional_usd - 5_000.0).abs() < 1e-9);
            assert!((adj.required_margin - 1_000.0).abs() < 1e-9);
        }

        #[test]
        fn test_confidence_below_band_rejects() {
            let p = proposal(Direction::Long, 10_000.0, 0.60);
            match soft(PermissionTier::Standard, &p, &healthy_account()) {
                SoftOutcome::Rejected(r) => assert!(r.starts_with("confidence below threshold"), "{r}"),
                other => panic!("expected rejection, got {other:?}"),
            }
        }

        #[test]
        fn test_confidence_ignored_for_close() {
            let p = proposal(Direction::Close, 10_000.0, 0.0);
            let adj = adjusted(soft(PermissionTier::Standard, &p, &healthy_account()));
            assert!(!adj.is_reduced());
        }

        #[test]
        fn test_frequency_limit_rejects() {
            let mut a = healthy_account();
            a.daily_trade_count = 10;
            let p = proposal(Direction::Long, 1_000.0, 0.9);
            match soft(PermissionTier::Restricted, &p, &a) {
                SoftOutcome::Rejected(r) => assert!(r.starts_with("daily trade limit"), "{r}"),
                other => panic!("expected rejection, got {other:?}"),
            }
        }

        #[test]
        fn test_frequency_limit_skips_close() {
            let mut a = healthy_account();
            a.daily_trade_count = 10;
            let p = proposal(Direction::Close, 1_000.0, 0.9);
            let adj = adjusted(soft(PermissionTier::Restricted, &p, &a));
            assert!(adj.warnings.is_empty());
        }

        #[test]
        fn test_frequency_limit_skips_hold() {
            let mut a = healthy_account();
            a.daily_trade_count = 50;
            let p = proposal(Direction::Hold, 0.0, 0.0);
            assert!(matches!(soft(PermissionTier::Restricted, &p, &a), SoftOutcome::Adjusted(_)));
        }

        #[test]
        fn test_frequency_warning_near_limit() {
            let mut a = healthy_account();
            a.daily_trade_count = 8;
            let p = proposal(Direction::Long, 1_000.0, 0.9);
            let adj = adjusted(soft(PermissionTier::Restricted, &p, &a));
            assert!(!adj.is_reduced());
            assert_eq!(adj.warnings.len(), 1);
            assert!(adj.warnings[0].contains("8/10"));
        }

        #[test]
        fn test_tier_sizing_caps_notional() {
            // T1 allows 5% of 100k.
            let p = proposal(Direction::Long, 8_000.0, 0.9);
            let adj = adjusted(soft(PermissionTier::Probation, &p, &healthy_account()));
            assert!(adj.is_reduced());
            assert!((adj.notional_usd - 5_000.0).abs() < 1e-9);
            assert!((adj.required_margin - 1_000.0).abs() < 1e-9);
        }

        #[test]
        fn test_healthy_proposal_passes() {
            let p = proposal(Direction::Long, 5_000.0, 0.9);
            assert_eq!(hard(PermissionTier::Standard, &p, &healthy_account()), ConstraintVerdict::Pass);
        }

        #[test]
        fn test_projected_margin_rejects() {
            let mut a = healthy_account();
            a.margin_ratio = 0.22;
            let mut p = proposal(Direction::Long, 5_000.0, 0.9);
            p.required_margin = 5_000.0;
            let r = rejection(hard(PermissionTier::Standard, &p, &a));
            assert!(r.starts_with("margin ratio after trade"), "{r}");
        }

        #[test]
        fn test_absolute_leverage_ceiling() {
            let mut p = proposal(Direction::Long, 5_000.0, 0.9);
            p.leverage = 6;
            let r = rejection(hard(PermissionTier::Autonomous, &p, &healthy_account()));
            assert!(r.contains("absolute maximum 5x"), "{r}");
        }

        #[test]
        fn test_tier_leverage_ceiling() {
            let mut p = proposal(Direction::Long, 1_000.0, 0.9);
            p.leverage = 3;
            let r = rejection(hard(PermissionTier::Probation, &p, &healthy_account()));
            assert!(r.contains("T1 (Probation) limit 1x"), "{r}");
        }

        #[test]
        fn test_cash_reserve() {
            let mut a = healthy_account();
            a.cash_balance = 10_500.0;
            let p = proposal(Direction::Long, 5_000.0, 0.9);
            let r = rejection(hard(PermissionTier::Standard, &p, &a));
            assert!(r.starts_with("cash after margin"), "{r}");
        }

        #[test]
        fn test_asset_concentration_counts_existing_exposure() {
            let mut a = healthy_account();
            a.per_asset_exposure.insert("BTC-USD".into(), 28_000.0);
            let p = proposal(Direction::Long, 5_000.0, 0.9);
            let r = rejection(hard(PermissionTier::Standard, &p, &a));
            assert!(r.contains("BTC-USD exposure"), "{r}");

            let mut other = proposal(Direction::Long, 5_000.0, 0.9);
            other.symbol = "ETH-USD".into();
            assert_eq!(hard(PermissionTier::Standard, &other, &a), ConstraintVerdict::Pass);
        }

        #[test]
        fn test_close_runs_protection_subset_only() {
            let mut p = proposal(Direction::Close, 50_000.0, 0.0);
            p.leverage = 20;
            let mut a = healthy_account();
            a.cash_balance = 0.0;
            assert_eq!(hard(PermissionTier::Protection, &p, &a), ConstraintVerdict::Pass);

            a.margin_ratio = 0.18;
            let r = rejection(hard(PermissionTier::Protection, &p, &a));
            assert!(r.starts_with("margin ratio"), "{r}");
        }

        struct NoDoge;

        impl HardConstraint for NoDoge {
            fn name(&self) -> &str {
                "no_doge"
            }

            fn evaluate(&self, ctx: &ProposalContext<'_>) -> ConstraintVerdict {
                if ctx.proposal.symbol == "DOGE-USD" {
                    ConstraintVerdict::Reject("symbol not tradable".into())
                } else {
                    ConstraintVerdict::Pass
                }
            }
        }

        #[test]
        fn test_custom_rule() {
            let catalog = ConstraintCatalog::default();
            let limits = catalog.tier_limits(PermissionTier::Standard).unwrap();
            let mut validator = ConstraintValidator::new();
            validator.add_rule(Box::new(NoDoge));

            let mut p = proposal(Direction::Long, 1_000.0, 0.9);
            p.symbol = "DOGE-USD".into();
            let a = healthy_account();
            let adj = adjusted(validator.check_soft(&p, &a, limits, &catalog.soft));
            assert_eq!(
                validator.check_hard(&p, &a, &adj, limits, &catalog.hard),
                ConstraintVerdict::Reject("symbol not tradable".into())
            );
        }
    }

    // ── Liquidation Monitor ────────────────────────────────────

    mod liquidation {
        use super::*;
        use tiergate_autonomy::{LiquidationMonitor, LiquidationTrigger};
        use tiergate_config::LiquidationLimits;

        #[test]
        fn test_healthy_account_no_trigger() {
            let limits = LiquidationLimits::default();
            assert_eq!(LiquidationMonitor::new(&limits).check(&healthy_account()), None);
        }

        #[test]
        fn test_each_trigger() {
            let limits = LiquidationLimits::default();
            let monitor = LiquidationMonitor::new(&limits);

            let mut a = healthy_account();
            a.margin_ratio = 0.149;
            assert!(matches!(monitor.check(&a), Some(LiquidationTrigger::MarginRatio { .. })));

            let mut a = healthy_account();
            a.daily_loss_pct = 0.05;
            assert!(matches!(monitor.check(&a), Some(LiquidationTrigger::DailyLoss { .. })));

            let mut a = healthy_account();
            a.total_drawdown = 0.10;
            assert!(matches!(monitor.check(&a), Some(LiquidationTrigger::Drawdown { .. })));
        }

        #[test]
        fn test_margin_boundary_is_exclusive() {
            let limits = LiquidationLimits::default();
            let mut a = healthy_account();
            a.margin_ratio = 0.15;
            assert_eq!(LiquidationMonitor::new(&limits).check(&a), None);
        }

        #[test]
        fn test_margin_reported_first() {
            let limits = LiquidationLimits::default();
            let mut a = healthy_account();
            a.margin_ratio = 0.05;
            a.total_drawdown = 0.5;
            a.daily_loss_pct = 0.5;
            let trigger = LiquidationMonitor::new(&limits).check(&a).unwrap();
            assert_eq!(trigger.to_string(), "margin ratio 0.050 below liquidation floor 0.150");
        }
    }

    // ── Decision Gate ──────────────────────────────────────────

    mod gate {
        use super::*;
        use tiergate_autonomy::{DecisionGate, Outcome};
        use tiergate_core::TransitionSource;

        fn gate_at(account: &str, tier: PermissionTier) -> DecisionGate {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            gate.restore([record(account, tier)]);
            gate
        }

        #[test]
        fn test_reduced_confidence_scenario() {
            let gate = gate_at("acct", PermissionTier::Standard);
            let p = proposal(Direction::Long, 10_000.0, 0.68);
            let d = gate
                .evaluate("acct", &p, &healthy_account(), &steady_performance())
                .unwrap();
            assert_eq!(d.outcome, Outcome::ApprovedReduced);
            assert!((d.adjusted_notional_usd - 5_000.0).abs() < 1e-9);
            assert_eq!(d.proposed_notional_usd, 10_000.0);
            assert_eq!(d.validated_tier, PermissionTier::Standard);
            assert_eq!(d.resulting_tier, PermissionTier::Standard);
            assert!(d.tier_transition.is_none());
        }

        #[test]
        fn test_daily_limit_scenario() {
            let gate = gate_at("acct", PermissionTier::Restricted);
            let mut a = healthy_account();
            a.daily_trade_count = 10;
            let p = proposal(Direction::Long, 1_000.0, 0.9);
            let d = gate.evaluate("acct", &p, &a, &steady_performance()).unwrap();
            assert_eq!(d.outcome, Outcome::Rejected);
            assert!(d.reason.starts_with("daily trade limit"), "{}", d.reason);
            assert_eq!(d.adjusted_notional_usd, 0.0);
            assert_eq!(d.resulting_tier, PermissionTier::Restricted);
            assert_eq!(gate.current_tier("acct"), PermissionTier::Restricted);
        }

        #[test]
        fn test_close_allowed_at_daily_limit() {
            let gate = gate_at("acct", PermissionTier::Restricted);
            let mut a = healthy_account();
            a.daily_trade_count = 10;
            let p = proposal(Direction::Close, 1_000.0, 0.9);
            let d = gate.evaluate("acct", &p, &a, &steady_performance()).unwrap();
            assert_eq!(d.outcome, Outcome::Approved);
            assert_eq!(d.adjusted_notional_usd, 1_000.0);
        }

        #[test]
        fn test_drawdown_scenario() {
            let gate = gate_at("acct", PermissionTier::Trusted);
            let mut a = healthy_account();
            a.total_drawdown = 0.12;
            let mut perf = strong_performance();
            perf.max_drawdown = 0.12;

            let d = gate
                .evaluate("acct", &proposal(Direction::Long, 1_000.0, 0.9), &a, &perf)
                .unwrap();
            assert_eq!(d.outcome, Outcome::ForceLiquidate);
            assert_eq!(d.resulting_tier, PermissionTier::Protection);
            let t = d.tier_transition.unwrap();
            assert_eq!(t.source, TransitionSource::Liquidation);
            assert_eq!(t.from, PermissionTier::Trusted);

            // Even a healthy account cannot open at T0 afterwards.
            let d = gate
                .evaluate(
                    "acct",
                    &proposal(Direction::Long, 1_000.0, 0.99),
                    &healthy_account(),
                    &strong_performance(),
                )
                .unwrap();
            assert_eq!(d.outcome, Outcome::Rejected);
            assert!(d.reason.starts_with("protection mode"));
            assert_eq!(d.resulting_tier, PermissionTier::Protection);
        }

        #[test]
        fn test_margin_call_overrides_close() {
            let gate = gate_at("acct", PermissionTier::Standard);
            let mut a = healthy_account();
            a.margin_ratio = 0.10;
            let d = gate
                .evaluate("acct", &proposal(Direction::Close, 5_000.0, 0.0), &a, &steady_performance())
                .unwrap();
            assert_eq!(d.outcome, Outcome::ForceLiquidate);
            assert_eq!(d.adjusted_notional_usd, 0.0);
            assert_eq!(d.resulting_tier, PermissionTier::Protection);
            assert!(d.reason.starts_with("forced liquidation"));
        }

        #[test]
        fn test_liquidation_at_protection_records_no_transition() {
            let gate = gate_at("acct", PermissionTier::Protection);
            let mut a = healthy_account();
            a.daily_loss_pct = 0.07;
            let d = gate
                .evaluate("acct", &proposal(Direction::Hold, 0.0, 0.0), &a, &steady_performance())
                .unwrap();
            assert_eq!(d.outcome, Outcome::ForceLiquidate);
            assert!(d.tier_transition.is_none());
        }

        #[test]
        fn test_liquidation_discards_evaluator_upgrade() {
            let gate = gate_at("acct", PermissionTier::Probation);
            let mut a = healthy_account();
            a.margin_ratio = 0.12;
            let d = gate
                .evaluate("acct", &proposal(Direction::Hold, 0.0, 0.0), &a, &strong_performance())
                .unwrap();
            assert_eq!(d.resulting_tier, PermissionTier::Protection);
        }

        #[test]
        fn test_protection_allows_close_and_hold() {
            let gate = gate_at("acct", PermissionTier::Protection);
            let d = gate
                .evaluate(
                    "acct",
                    &proposal(Direction::Close, 3_000.0, 0.0),
                    &healthy_account(),
                    &steady_performance(),
                )
                .unwrap();
            assert_eq!(d.outcome, Outcome::Approved);
            assert_eq!(d.adjusted_notional_usd, 3_000.0);

            let d = gate
                .evaluate("acct", &proposal(Direction::Hold, 0.0, 0.0), &healthy_account(), &steady_performance())
                .unwrap();
            assert_eq!(d.outcome, Outcome::Approved);
        }

        #[test]
        fn test_protection_rejects_every_opener() {
            let gate = gate_at("acct", PermissionTier::Protection);
            for direction in [Direction::Long, Direction::Short] {
                let d = gate
                    .evaluate("acct", &proposal(direction, 100.0, 1.0), &healthy_account(), &strong_performance())
                    .unwrap();
                assert!(!d.outcome.is_approved());
                assert_eq!(d.resulting_tier, PermissionTier::Protection);
            }
        }

        #[test]
        fn test_evaluator_transition_is_committed() {
            let gate = gate_at("acct", PermissionTier::Probation);
            let d = gate
                .evaluate(
                    "acct",
                    &proposal(Direction::Long, 1_000.0, 0.9),
                    &healthy_account(),
                    &strong_performance(),
                )
                .unwrap();
            assert_eq!(d.outcome, Outcome::Approved);
            assert_eq!(d.validated_tier, PermissionTier::Probation);
            assert_eq!(d.resulting_tier, PermissionTier::Restricted);
            let t = d.tier_transition.unwrap();
            assert_eq!(t.source, TransitionSource::Evaluator);
            assert_eq!(gate.current_tier("acct"), PermissionTier::Restricted);
        }

        #[test]
        fn test_malformed_input_is_error_and_mutates_nothing() {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            let mut a = healthy_account();
            a.equity = 0.0;
            let err = gate
                .evaluate("acct", &proposal(Direction::Long, 100.0, 0.9), &a, &steady_performance())
                .unwrap_err();
            assert!(err.is_precondition());
            assert!(gate.export().is_empty());

            let mut p = proposal(Direction::Long, 100.0, 0.9);
            p.confidence = 1.5;
            assert!(gate
                .evaluate("acct", &p, &healthy_account(), &steady_performance())
                .unwrap_err()
                .is_precondition());

            assert!(gate
                .evaluate("", &proposal(Direction::Hold, 0.0, 0.0), &healthy_account(), &steady_performance())
                .unwrap_err()
                .is_precondition());
        }

        #[test]
        fn test_unknown_account_reports_initial_tier_without_registering() {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            assert_eq!(gate.current_tier("ghost"), PermissionTier::Probation);
            assert_eq!(gate.current_tier("ghost"), PermissionTier::Probation);
            assert!(gate.export().is_empty());
        }

        #[test]
        fn test_manual_override_leaves_protection() {
            let gate = gate_at("acct", PermissionTier::Protection);
            let t = gate
                .manual_override("acct", PermissionTier::Probation, "risk-desk", "reviewed")
                .unwrap();
            assert_eq!(t.from, PermissionTier::Protection);
            assert_eq!(t.to, PermissionTier::Probation);
            assert_eq!(t.source, TransitionSource::ManualOverride);
            assert_eq!(t.operator.as_deref(), Some("risk-desk"));
            assert_eq!(gate.current_tier("acct"), PermissionTier::Probation);
        }

        #[test]
        fn test_manual_override_requires_operator_and_reason() {
            let gate = gate_at("acct", PermissionTier::Protection);
            assert!(gate
                .manual_override("acct", PermissionTier::Standard, " ", "reviewed")
                .unwrap_err()
                .is_precondition());
            assert!(gate
                .manual_override("acct", PermissionTier::Standard, "ops", "")
                .unwrap_err()
                .is_precondition());
            assert_eq!(gate.current_tier("acct"), PermissionTier::Protection);
        }

        #[test]
        fn test_invalid_catalog_keeps_previous() {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            let mut bad = ConstraintCatalog::default();
            bad.hard.max_total_drawdown = 1.5;
            let err = gate.load_constraint_catalog(bad).unwrap_err();
            assert!(err.is_configuration());
            assert_eq!(*gate.catalog(), ConstraintCatalog::default());
        }

        #[test]
        fn test_catalog_swap_takes_effect() {
            let gate = gate_at("acct", PermissionTier::Standard);
            let mut tighter = ConstraintCatalog::default();
            tighter.soft.reduction_factor = 0.25;
            let warnings = gate.load_constraint_catalog(tighter).unwrap();
            assert!(warnings.is_empty());

            let d = gate
                .evaluate(
                    "acct",
                    &proposal(Direction::Long, 10_000.0, 0.68),
                    &healthy_account(),
                    &steady_performance(),
                )
                .unwrap();
            assert!((d.adjusted_notional_usd - 2_500.0).abs() < 1e-9);
        }

        #[test]
        fn test_new_rejects_invalid_catalog() {
            let mut bad = ConstraintCatalog::default();
            bad.tiers.pop();
            assert!(DecisionGate::new(bad).is_err());
        }

        #[test]
        fn test_restore_and_export() {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            let loaded = gate.restore([
                record("b", PermissionTier::Trusted),
                record("a", PermissionTier::Protection),
            ]);
            assert_eq!(loaded, 2);
            let rows = gate.export();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].account_id, "a");
            assert_eq!(rows[0].tier, PermissionTier::Protection);
            assert_eq!(rows[1].tier, PermissionTier::Trusted);
            assert_eq!(rows[1].reason, "fixture");
        }

        /// Holds the first evaluation inside the hard pass until released.
        struct Pause {
            entered: std::sync::Mutex<Option<std::sync::mpsc::Sender<()>>>,
            release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        }

        impl tiergate_autonomy::HardConstraint for Pause {
            fn name(&self) -> &str {
                "pause"
            }

            fn evaluate(
                &self,
                _ctx: &tiergate_autonomy::ProposalContext<'_>,
            ) -> tiergate_autonomy::ConstraintVerdict {
                if let Some(tx) = self.entered.lock().unwrap().take() {
                    tx.send(()).unwrap();
                    self.release.lock().unwrap().recv().unwrap();
                }
                tiergate_autonomy::ConstraintVerdict::Pass
            }
        }

        #[test]
        fn test_restore_waits_for_in_flight_evaluation() {
            use std::sync::{Arc, mpsc};
            use std::time::Duration;

            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let mut validator = tiergate_autonomy::ConstraintValidator::new();
            validator.add_rule(Box::new(Pause {
                entered: std::sync::Mutex::new(Some(entered_tx)),
                release: std::sync::Mutex::new(release_rx),
            }));
            let gate = Arc::new(
                DecisionGate::with_validator(ConstraintCatalog::default(), validator).unwrap(),
            );
            gate.restore([record("acct", PermissionTier::Restricted)]);

            let evaluating = {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    gate.evaluate(
                        "acct",
                        &proposal(Direction::Long, 1_000.0, 0.9),
                        &healthy_account(),
                        &strong_performance(),
                    )
                    .unwrap()
                })
            };
            entered_rx.recv().unwrap();

            let restoring = {
                let gate = gate.clone();
                std::thread::spawn(move || gate.restore([record("acct", PermissionTier::Trusted)]))
            };
            std::thread::sleep(Duration::from_millis(100));
            assert!(!restoring.is_finished());

            release_tx.send(()).unwrap();
            let d = evaluating.join().unwrap();
            assert_eq!(restoring.join().unwrap(), 1);

            let t = d.tier_transition.unwrap();
            assert_eq!((t.from, t.to), (PermissionTier::Restricted, PermissionTier::Standard));
            // The restored row lands after the commit on the same ledger.
            assert_eq!(gate.current_tier("acct"), PermissionTier::Trusted);
            assert_eq!(gate.export().len(), 1);
        }

        #[test]
        fn test_decision_serializes_outcome() {
            let gate = gate_at("acct", PermissionTier::Standard);
            let d = gate
                .evaluate(
                    "acct",
                    &proposal(Direction::Long, 10_000.0, 0.68),
                    &healthy_account(),
                    &steady_performance(),
                )
                .unwrap();
            let json = serde_json::to_value(&d).unwrap();
            assert_eq!(json["outcome"], "APPROVED_REDUCED");
            assert_eq!(json["resulting_tier"], 3);
            assert!(json.get("tier_transition").is_none());
        }

        #[test]
        fn test_concurrent_evaluations_serialize_per_account() {
            use std::sync::Arc;

            let gate = Arc::new(gate_at("shared", PermissionTier::Probation));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let gate = gate.clone();
                    std::thread::spawn(move || {
                        gate.evaluate(
                            "shared",
                            &proposal(Direction::Hold, 0.0, 0.0),
                            &healthy_account(),
                            &strong_performance(),
                        )
                        .unwrap()
                    })
                })
                .collect();

            let mut transitions: Vec<(u8, u8)> = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter_map(|d| {
                    let t = d.tier_transition?;
                    assert_eq!(t.from, d.validated_tier);
                    Some((t.from.level(), t.to.level()))
                })
                .collect();
            transitions.sort();

            // Every climb recorded exactly once, each from the tier it validated against.
            assert_eq!(transitions, vec![(1, 2), (2, 3), (3, 4), (4, 5)]);
            assert_eq!(gate.current_tier("shared"), PermissionTier::Autonomous);
        }

        #[test]
        fn test_accounts_are_independent() {
            let gate = gate_at("a", PermissionTier::Standard);
            let mut a = healthy_account();
            a.margin_ratio = 0.05;
            gate.evaluate("a", &proposal(Direction::Hold, 0.0, 0.0), &a, &steady_performance())
                .unwrap();
            assert_eq!(gate.current_tier("a"), PermissionTier::Protection);

            let d = gate
                .evaluate("b", &proposal(Direction::Long, 1_000.0, 0.9), &healthy_account(), &steady_performance())
                .unwrap();
            assert_eq!(d.validated_tier, PermissionTier::Probation);
            assert_eq!(d.outcome, Outcome::Approved);
        }
    }

    // ── Events ─────────────────────────────────────────────────

    mod events {
        use super::*;
        use tiergate_autonomy::DecisionGate;
        use tiergate_core::GateEvent;

        #[tokio::test]
        async fn test_override_publishes_event() {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            let mut rx = gate.subscribe();
            gate.manual_override("acct", PermissionTier::Standard, "ops", "promotion")
                .unwrap();
            match rx.recv().await.unwrap() {
                GateEvent::ManualOverride { transition } => {
                    assert_eq!(transition.to, PermissionTier::Standard);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_liquidation_publishes_events() {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            let mut rx = gate.subscribe();
            let mut a = healthy_account();
            a.margin_ratio = 0.1;
            gate.evaluate("acct", &proposal(Direction::Hold, 0.0, 0.0), &a, &steady_performance())
                .unwrap();

            let first = rx.recv().await.unwrap();
            assert!(matches!(first, GateEvent::ForcedLiquidation { .. }));
            assert!(first.is_high_severity());
            match rx.recv().await.unwrap() {
                GateEvent::TierChanged { transition } => {
                    assert_eq!(transition.to, PermissionTier::Protection);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_rejection_and_reload_events() {
            let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
            let mut rx = gate.subscribe();
            gate.evaluate(
                "acct",
                &proposal(Direction::Long, 1_000.0, 0.1),
                &healthy_account(),
                &steady_performance(),
            )
            .unwrap();
            assert!(matches!(rx.recv().await.unwrap(), GateEvent::ProposalRejected { .. }));

            gate.load_constraint_catalog(ConstraintCatalog::default()).unwrap();
            assert!(matches!(rx.recv().await.unwrap(), GateEvent::CatalogReloaded { .. }));
        }
    }

    // ── Properties ─────────────────────────────────────────────

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use tiergate_autonomy::{DecisionGate, Outcome};

        fn direction() -> impl Strategy<Value = Direction> {
            prop_oneof![
                Just(Direction::Long),
                Just(Direction::Short),
                Just(Direction::Close),
                Just(Direction::Hold),
            ]
        }

        fn tier() -> impl Strategy<Value = PermissionTier> {
            prop::sample::select(PermissionTier::ALL.to_vec())
        }

        prop_compose! {
            fn any_proposal()(
                direction in direction(),
                notional in 0.0f64..1_000_000.0,
                leverage in 1u32..10,
                confidence in 0.0f64..=1.0,
                margin_share in 0.0f64..=1.0,
            ) -> TradeProposal {
                TradeProposal {
                    symbol: "ETH-USD".into(),
                    direction,
                    notional_usd: notional,
                    leverage,
                    confidence,
                    required_margin: notional * margin_share,
                }
            }
        }

        prop_compose! {
            fn any_performance()(
                win_rate_7d in 0.0f64..=1.0,
                win_rate_30d in 0.0f64..=1.0,
                sharpe_ratio in -3.0f64..4.0,
                max_drawdown in 0.0f64..=1.0,
                consecutive_losses in 0u32..10,
                total_trades in 0u32..500,
                days_active in 0u32..120,
                profit_consistency in 0.0f64..=1.0,
                consecutive_profitable_days in 0u32..20,
            ) -> PerformanceSnapshot {
                PerformanceSnapshot {
                    win_rate_7d,
                    win_rate_30d,
                    sharpe_ratio,
                    max_drawdown,
                    consecutive_losses,
                    total_trades,
                    profitable_trades: total_trades / 2,
                    days_active,
                    profit_consistency,
                    consecutive_profitable_days,
                }
            }
        }

        prop_compose! {
            fn any_account(margin: std::ops::Range<f64>)(
                equity in 1.0f64..10_000_000.0,
                cash_share in 0.0f64..=1.0,
                margin_ratio in margin,
                total_drawdown in 0.0f64..=1.0,
                daily_loss_pct in 0.0f64..=1.0,
                daily_trade_count in 0u32..40,
            ) -> AccountSnapshot {
                AccountSnapshot {
                    equity,
                    cash_balance: equity * cash_share,
                    margin_ratio,
                    total_drawdown,
                    daily_loss_pct,
                    per_asset_exposure: Default::default(),
                    daily_trade_count,
                }
            }
        }

        proptest! {
            #[test]
            fn prop_low_margin_always_liquidates(
                start in tier(),
                p in any_proposal(),
                a in any_account(0.0..0.15),
                perf in any_performance(),
            ) {
                let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
                gate.restore([record("acct", start)]);
                let d = gate.evaluate("acct", &p, &a, &perf).unwrap();
                prop_assert_eq!(d.outcome, Outcome::ForceLiquidate);
                prop_assert_eq!(d.resulting_tier, PermissionTier::Protection);
                prop_assert_eq!(d.adjusted_notional_usd, 0.0);
                prop_assert_eq!(gate.current_tier("acct"), PermissionTier::Protection);
            }

            #[test]
            fn prop_adjusted_never_exceeds_proposed(
                start in tier(),
                p in any_proposal(),
                a in any_account(0.0..2.0),
                perf in any_performance(),
            ) {
                let gate = DecisionGate::new(ConstraintCatalog::default()).unwrap();
                gate.restore([record("acct", start)]);
                let d = gate.evaluate("acct", &p, &a, &perf).unwrap();
                prop_assert!(d.adjusted_notional_usd <= p.notional_usd);
                if start == PermissionTier::Protection && p.direction.opens_position() {
                    prop_assert!(!d.outcome.is_approved());
                }
            }
        }
    }
}
