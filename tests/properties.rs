use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;

use tradegate::config::GateConfig;
use tradegate::engine::GateContext;
use tradegate::execution::{PositionState, StopContext};
use tradegate::models::{MarketSnapshot, PositionSide};
use tradegate::risk::{BudgetConfig, RiskBudget};
use tradegate::sizing::{candidate_grid, kelly_fraction, MonteCarloConfig, MonteCarloValidator};
use tradegate::trigger::{CooldownConfig, ReasonKind, TriggerConfig, TriggerGate, TriggerLevel};

const SYMBOLS: [&str; 4] = ["BTC", "ETH", "SOL", "DOGE"];

fn snapshot_strategy() -> impl Strategy<Value = (usize, i64, f64, f64, f64)> {
    (
        0..SYMBOLS.len(),
        0i64..400,         // seconds since previous snapshot
        -0.15f64..0.15,    // price change
        0.0f64..7.0,       // volume ratio
        0.0f64..100.0,     // rsi
    )
}

proptest! {
    #[test]
    fn test_kelly_stays_in_range(p in 0.0f64..1.0, b in 0.0f64..20.0, max in 0.0f64..1.0) {
        let f = kelly_fraction(p, b, max);
        prop_assert!(f >= 0.0);
        prop_assert!(f <= max);
    }

    #[test]
    fn test_kelly_zero_outside_domain(p in prop_oneof![-2.0f64..=0.0, 1.0f64..3.0], b in -5.0f64..5.0) {
        prop_assert_eq!(kelly_fraction(p, b, 0.25), 0.0);
    }

    #[test]
    fn test_kelly_zero_without_payoff(p in 0.01f64..0.99, b in -5.0f64..=0.0) {
        prop_assert_eq!(kelly_fraction(p, b, 0.25), 0.0);
    }

    #[test]
    fn test_gate_respects_cooldowns(steps in prop::collection::vec(snapshot_strategy(), 1..80)) {
        let config = TriggerConfig::default();
        let cooldowns = config.cooldown.clone();
        let mut gate = TriggerGate::new(config).unwrap();

        let mut now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut last_by_signal = HashMap::new();
        let mut last_by_symbol = HashMap::new();

        for (symbol, gap, change, volume, rsi) in steps {
            now += Duration::seconds(gap);
            let snapshot = MarketSnapshot::new(SYMBOLS[symbol], 100.0, now)
                .with_price_change(change)
                .with_volume_ratio(volume)
                .with_rsi(rsi);

            let Some(signal) = gate.evaluate(&snapshot).into_signal() else {
                continue;
            };

            prop_assert!(signal.level >= TriggerLevel::Level1);
            prop_assert!(signal.level <= TriggerLevel::Level3);
            if signal.level == TriggerLevel::Level3 {
                prop_assert!(
                    signal.has_reason(ReasonKind::BlackSwan)
                        || signal.has_reason(ReasonKind::ExtremePriceChange)
                        || signal.has_reason(ReasonKind::MassiveLiquidation)
                );
            }

            let key = (signal.symbol.clone(), signal.trigger_type);
            if let Some((at, level)) = last_by_signal.get(&key) {
                prop_assert!(now - *at >= cooldowns.for_level(*level));
            }
            if let Some(at) = last_by_symbol.get(&signal.symbol) {
                prop_assert!(now - *at >= Duration::seconds(cooldowns.symbol_secs));
            }

            last_by_signal.insert(key, (now, signal.level));
            last_by_symbol.insert(signal.symbol.clone(), now);
        }
    }

    #[test]
    fn test_gate_hourly_cap(cap in 1usize..6, count in 1usize..40) {
        let config = TriggerConfig {
            cooldown: CooldownConfig { hourly_cap: cap, ..Default::default() },
            ..Default::default()
        };
        let mut gate = TriggerGate::new(config).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut admitted = 0;
        for i in 0..count {
            // distinct symbols so only the cap can block
            let snapshot = MarketSnapshot::new(format!("SYM{}", i), 10.0, start + Duration::seconds(i as i64))
                .with_price_change(0.015);
            if gate.evaluate(&snapshot).signal().is_some() {
                admitted += 1;
            }
        }

        prop_assert_eq!(admitted, count.min(cap));
    }

    #[test]
    fn test_trailing_stop_never_loosens(moves in prop::collection::vec(-0.04f64..0.05, 1..60)) {
        let ctx = GateContext::new(GateConfig::default()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        let id = ctx.open_position("ETH", PositionSide::Long, 100.0, 5_000.0, 0.05, t0).unwrap();
        let tick = StopContext::at(t0 + Duration::hours(1));

        // push into trailing first
        let mut price = 112.0;
        let mut previous = ctx.update_stop(id, price, &tick).unwrap().stop_price;

        for step in moves {
            price *= 1.0 + step;
            let decision = ctx.update_stop(id, price, &tick).unwrap();
            if decision.is_closed() {
                break;
            }
            prop_assert_eq!(decision.state, PositionState::Trailing);
            prop_assert!(decision.stop_price >= previous);
            previous = decision.stop_price;
        }
    }

    #[test]
    fn test_daily_breaker_is_sticky(loss in 10_000.0f64..40_000.0, gains in prop::collection::vec(0.0f64..50_000.0, 1..10)) {
        let mut budget = RiskBudget::new(BudgetConfig::default(), Utc::now());
        budget.record_pnl(-loss);
        prop_assert!(!budget.check_daily().can_trade);

        for gain in gains {
            budget.record_pnl(gain);
            prop_assert!(!budget.check_daily().can_trade);
            prop_assert!(budget.halt_reason().is_some());
        }

        budget.reset_daily();
        prop_assert!(budget.halt_reason().is_none() || budget.monthly_stop);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_monte_carlo_seeded_runs_agree(
        returns in prop::collection::vec(-0.1f64..0.12, 20..60),
        seed in any::<u64>(),
    ) {
        let config = MonteCarloConfig {
            seed: Some(seed),
            time_budget_ms: 60_000,
            ..Default::default()
        };
        let grid = candidate_grid(0.01, 0.25, 10);

        let a = MonteCarloValidator::new(config.clone()).validate(&returns, &grid, 50).unwrap();
        let b = MonteCarloValidator::new(config).validate(&returns, &grid, 50).unwrap();

        prop_assert_eq!(a.best, b.best);
        prop_assert_eq!(a.candidates, b.candidates);
    }
}
