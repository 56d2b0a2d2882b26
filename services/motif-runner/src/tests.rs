//! Cross-module tests for motif-runner

use rust_decimal::Decimal;

use crate::config::{LearningConfig, RiskConfig, Settings};
use crate::ensemble::MotifEnsemble;
use crate::exchange::{order_request, OrderGateway, PaperGateway};
use crate::learning::{AdaptiveLearningEngine, Action, PriceState, TradeOutcome};
use crate::motifs::MotifType;
use crate::risk::{PositionState, RiskManager};
use crate::types::{OrderSide, Side};

fn learning() -> AdaptiveLearningEngine {
    AdaptiveLearningEngine::new(&LearningConfig {
        seed: Some(42),
        ..LearningConfig::default()
    })
}

#[test]
fn test_default_settings_are_valid() {
    assert!(Settings::default().validate().is_ok());
}

#[test]
fn test_learned_weights_shift_ensemble_towards_winning_motif() {
    let mut engine = learning();
    let mut ensemble = MotifEnsemble::default();

    for i in 0..20 {
        engine.record_trade_outcome(&TradeOutcome {
            motif: MotifType::Trend,
            success: true,
            from_state: PriceState::Uptrend,
            to_state: PriceState::UptrendStrong,
            action: Action::Long,
            reward: 0.01,
        });
        if i % 2 == 0 {
            engine.record_trade_outcome(&TradeOutcome {
                motif: MotifType::Momentum,
                success: false,
                from_state: PriceState::Uptrend,
                to_state: PriceState::Downtrend,
                action: Action::Long,
                reward: -0.01,
            });
        }
        ensemble.update_weights(engine.learned_weights().as_map());
    }

    let w = ensemble.weights();
    assert!((w.sum() - 1.0).abs() < 1e-9);
    assert!(w.get(MotifType::Trend) > w.get(MotifType::Volatility));
    assert!(w.get(MotifType::Volatility) > w.get(MotifType::Momentum));
    // 21/22 trend vs 1/12 momentum
    assert!(engine.bayesian().estimate_success_rate(MotifType::Trend) > 0.95);
}

#[test]
fn test_markov_prediction_follows_only_observed_transition() {
    let mut engine = learning();
    for _ in 0..10 {
        engine.observe_transition(PriceState::Neutral, PriceState::Uptrend);
    }
    for _ in 0..5 {
        assert_eq!(engine.predict_next_state(PriceState::Neutral), PriceState::Uptrend);
    }
    assert_eq!(
        engine.predict_next_state(PriceState::DowntrendStrong),
        PriceState::DowntrendStrong
    );
}

#[tokio::test]
async fn test_pending_position_confirmed_by_paper_fill() {
    let mut risk = RiskManager::new(RiskConfig::default());
    let gateway = PaperGateway::new("USDT", Decimal::from(10_000), 0);

    let position = risk
        .open_position("SOLUSDT", 0.7, 100.0, 98.0, 105.0, 5.0)
        .unwrap();
    assert_eq!(position.state, PositionState::Pending);
    assert!(risk.open_positions_for("SOLUSDT").is_empty());

    let request = order_request("SOLUSDT", Side::Long.entry_order(), 5.0, 100.0).unwrap();
    assert_eq!(request.side, OrderSide::Buy);
    let ack = gateway.place_order(&request).await.unwrap();
    risk.confirm_position(position.id, &ack.order_id).unwrap();

    let open = risk.position(position.id).unwrap();
    assert_eq!(open.state, PositionState::Open);
    assert_eq!(open.order_id.as_deref(), Some(ack.order_id.as_str()));

    let trade = risk.close_position(position.id, 103.0, None).unwrap();
    assert!((trade.pnl - 15.0).abs() < 1e-9);
    assert!((risk.balance() - 10_015.0).abs() < 1e-9);
}

#[test]
fn test_abandoned_position_frees_risk_budget() {
    let mut risk = RiskManager::new(RiskConfig::default());
    let a = risk
        .open_position("BTCUSDT", 0.7, 1000.0, 750.0, 1625.0, 1.0)
        .unwrap();
    risk.open_position("ETHUSDT", 0.7, 1000.0, 750.0, 1625.0, 1.0)
        .unwrap();
    assert!(risk
        .open_position("SOLUSDT", 0.7, 1000.0, 750.0, 1625.0, 1.0)
        .is_err());

    risk.abandon_position(a.id).unwrap();
    assert!((risk.balance() - 10_000.0).abs() < 1e-12);
    assert!(risk
        .open_position("SOLUSDT", 0.7, 1000.0, 750.0, 1625.0, 1.0)
        .is_ok());
}
