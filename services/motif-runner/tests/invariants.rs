//! Property tests for risk and weighting invariants.
//!
//! 1. Motif weights always normalise to one
//! 2. Trailing stops only tighten
//! 3. Open risk never exceeds the portfolio cap
//! 4. Stops sit on the losing side of entry
//! 5. Partial closes conserve quantity and PnL

use std::collections::BTreeMap;

use proptest::prelude::*;

use motif_runner::config::RiskConfig;
use motif_runner::ensemble::MotifWeights;
use motif_runner::motifs::MotifType;
use motif_runner::risk::{PositionState, RiskManager};
use motif_runner::types::Side;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_weight() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => 0.0..2.0_f64,
        1 => -1.0..0.0_f64,
        1 => Just(f64::NAN),
    ]
}

fn arb_price() -> impl Strategy<Value = f64> {
    (50.0..150.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn open_long(risk: &mut RiskManager, entry: f64, stop: f64, target: f64, qty: f64) -> motif_runner::PositionId {
    let position = risk
        .open_position_with_levels("SOLUSDT", Side::Long, entry, stop, target, qty)
        .unwrap();
    risk.confirm_position(position.id, "test-order").unwrap();
    position.id
}

// ── 1. Weight normalisation ──────────────────────────────────────────

proptest! {
    #[test]
    fn merged_weights_sum_to_one(
        updates in prop::collection::vec((0usize..4, arb_weight()), 1..12),
    ) {
        let mut weights = MotifWeights::equal();
        for (index, value) in updates {
            let mut update = BTreeMap::new();
            update.insert(MotifType::ALL[index], value);
            weights.merge(&update);

            prop_assert!((weights.sum() - 1.0).abs() < 1e-9);
            for (_, w) in weights.iter() {
                prop_assert!(w >= 0.0 && w.is_finite());
            }
        }
    }
}

// ── 2. Trailing monotonicity ─────────────────────────────────────────

proptest! {
    #[test]
    fn trailing_stop_never_loosens(
        prices in prop::collection::vec(arb_price(), 1..40),
        atr in 0.5..5.0_f64,
    ) {
        let mut risk = RiskManager::new(RiskConfig::default());
        let id = open_long(&mut risk, 100.0, 95.0, 120.0, 1.0);

        let mut last_stop = 95.0;
        for price in prices {
            risk.update_trailing_stop(id, price, atr).unwrap();
            let stop = risk.position(id).unwrap().stop_loss;
            prop_assert!(stop >= last_stop);
            prop_assert!(stop >= 95.0);
            last_stop = stop;
        }
    }
}

// ── 3. Portfolio risk cap ────────────────────────────────────────────

proptest! {
    #[test]
    fn open_risk_stays_under_cap(
        proposals in prop::collection::vec(
            (arb_price(), 0.80..0.99_f64, 2.0..4.0_f64, 0.1..5.0_f64),
            1..20,
        ),
    ) {
        let config = RiskConfig::default();
        let mut risk = RiskManager::new(config);
        let cap = config.initial_balance * config.max_total_risk;

        for (entry, stop_fraction, ratio, qty) in proposals {
            let stop = entry * stop_fraction;
            let target = entry + (entry - stop) * ratio;
            let _ = risk.open_position_with_levels("SOLUSDT", Side::Long, entry, stop, target, qty);
            prop_assert!(risk.total_open_risk() <= cap + 1e-9);
        }
    }
}

// ── 4. Stop direction ────────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_is_on_losing_side(
        entry in arb_price(),
        bullish in 0.55..1.0_f64,
        bearish in 0.0..0.45_f64,
        volatility in 0.0..1.0_f64,
        atr in prop::option::of(0.1..5.0_f64),
    ) {
        let risk = RiskManager::new(RiskConfig::default());

        let long_stop = risk.calculate_stop_loss(entry, bullish, volatility, atr);
        prop_assert!(long_stop < entry);
        let long_target = risk.calculate_take_profit(entry, long_stop, risk.default_risk_reward());
        prop_assert!(long_target > entry);

        let short_stop = risk.calculate_stop_loss(entry, bearish, volatility, atr);
        prop_assert!(short_stop > entry);
        let short_target = risk.calculate_take_profit(entry, short_stop, risk.default_risk_reward());
        prop_assert!(short_target < entry);
    }

    #[test]
    fn position_size_respects_notional_cap(
        entry in arb_price(),
        stop_fraction in 0.90..0.999_f64,
        signal in 0.0..1.0_f64,
        confidence in 0.0..1.0_f64,
        volatility in 0.0..1.0_f64,
        adjustment in 0.5..1.5_f64,
    ) {
        let config = RiskConfig::default();
        let risk = RiskManager::new(config);
        let qty = risk.calculate_position_size(
            entry,
            entry * stop_fraction,
            signal,
            confidence,
            volatility,
            adjustment,
        );
        prop_assert!(qty >= 0.0);
        prop_assert!(qty * entry <= config.initial_balance * config.max_notional_fraction + 1e-9);
    }
}

// ── 5. Partial-close conservation ────────────────────────────────────

proptest! {
    #[test]
    fn partial_then_full_close_conserves_quantity(
        qty in 1.0..5.0_f64,
        fraction in 0.1..0.9_f64,
        first_exit in 80.0..130.0_f64,
        second_exit in 80.0..130.0_f64,
    ) {
        let mut risk = RiskManager::new(RiskConfig::default());
        let start_balance = risk.balance();
        let id = open_long(&mut risk, 100.0, 95.0, 120.0, qty);

        let partial = risk.close_position(id, first_exit, Some(qty * fraction)).unwrap();
        prop_assert!(partial.is_partial());
        prop_assert_eq!(risk.position(id).unwrap().state, PositionState::Open);

        let rest = risk.close_position(id, second_exit, None).unwrap();
        prop_assert!(!rest.is_partial());
        prop_assert!(risk.position(id).is_none());

        prop_assert!((partial.closed_quantity + rest.closed_quantity - qty).abs() < 1e-9);
        let after_partial = &partial.position;
        prop_assert!((after_partial.quantity + after_partial.partial_closed_quantity - qty).abs() < 1e-9);
        prop_assert!((rest.position.partial_closed_quantity - rest.position.original_quantity).abs() < 1e-9);
        let expected = (first_exit - 100.0) * qty * fraction + (second_exit - 100.0) * qty * (1.0 - fraction);
        prop_assert!((partial.pnl + rest.pnl - expected).abs() < 1e-6);
        prop_assert!((risk.balance() - start_balance - expected).abs() < 1e-6);
        prop_assert!((rest.position.realized_pnl - expected).abs() < 1e-6);
    }
}
