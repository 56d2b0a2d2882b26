//! Adaptive learning engine
//!
//! Owns the Bayesian outcome counts, two Markov transition tables and the
//! Q-table. [`AdaptiveLearningEngine::record_trade_outcome`] is the single
//! feedback entry point: every realized close fans out to all three models.
//!
//! The cycle table holds one-step transitions and drives prediction. Entry to
//! exit transitions span many cycles, so they go to a separate trade table.
//!
//! Randomness (Markov sampling, ε-greedy, Monte Carlo) comes from one seedable
//! generator so tests can pin exact outcomes.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LearningConfig;
use crate::ensemble::MotifWeights;
use crate::motifs::MotifType;

pub mod bayesian;
pub mod markov;
pub mod monte_carlo;
pub mod qlearning;

pub use bayesian::{BayesianUpdater, OutcomeCounts};
pub use markov::{get_price_state, MarkovChain, PriceState};
pub use monte_carlo::{simulate_scenarios, SimulationBias, SimulationParams, SimulationSummary};
pub use qlearning::{Action, QLearningAgent, QParams};

/// Realized result of one closed trade, as fed back into learning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Motif credited with the entry decision
    pub motif: MotifType,
    pub success: bool,
    pub from_state: PriceState,
    pub to_state: PriceState,
    pub action: Action,
    pub reward: f64,
}

pub struct AdaptiveLearningEngine {
    bayesian: BayesianUpdater,
    markov: MarkovChain,
    trade_markov: MarkovChain,
    q_agent: QLearningAgent,
    simulation: SimulationParams,
    rng: StdRng,
}

impl AdaptiveLearningEngine {
    pub fn new(config: &LearningConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            bayesian: BayesianUpdater::new(),
            markov: MarkovChain::new(),
            trade_markov: MarkovChain::new(),
            q_agent: QLearningAgent::new(QParams {
                learning_rate: config.learning_rate,
                discount: config.discount_factor,
                exploration: config.exploration_rate,
            }),
            simulation: SimulationParams {
                scenarios: config.simulation_scenarios,
                steps: config.simulation_steps,
                drift: config.simulation_drift,
            },
            rng,
        }
    }

    pub fn bayesian(&self) -> &BayesianUpdater {
        &self.bayesian
    }

    pub fn markov(&self) -> &MarkovChain {
        &self.markov
    }

    /// Entry-state to exit-state counts of realized trades
    pub fn trade_transitions(&self) -> &MarkovChain {
        &self.trade_markov
    }

    pub fn q_agent(&self) -> &QLearningAgent {
        &self.q_agent
    }

    /// Fan a realized outcome out to the Bayesian, Markov and Q models
    pub fn record_trade_outcome(&mut self, outcome: &TradeOutcome) {
        self.bayesian.record_outcome(outcome.motif, outcome.success);
        self.trade_markov
            .record_transition(outcome.from_state, outcome.to_state);
        let q = self.q_agent.record_reward(
            outcome.from_state,
            outcome.action,
            outcome.reward,
            outcome.to_state,
        );
        debug!(
            "Learning update | motif {} success {} | {:?} -> {:?} | Q({:?}) = {:.4}",
            outcome.motif, outcome.success, outcome.from_state, outcome.to_state, outcome.action, q
        );
    }

    /// Record a one-step market-state transition between consecutive cycles
    pub fn observe_transition(&mut self, from: PriceState, to: PriceState) {
        self.markov.record_transition(from, to);
    }

    /// Candidate ensemble weights from the Bayesian posterior
    pub fn learned_weights(&self) -> MotifWeights {
        self.bayesian.update_weights()
    }

    pub fn predict_next_state(&mut self, current: PriceState) -> PriceState {
        self.markov.predict_next_state(current, &mut self.rng)
    }

    pub fn select_action(&mut self, state: PriceState) -> Action {
        self.q_agent.select_action(state, &mut self.rng)
    }

    pub fn simulate(&mut self, base_price: f64, volatility: f64) -> Option<SimulationSummary> {
        simulate_scenarios(base_price, volatility, self.simulation, &mut self.rng)
    }

    /// Shared generator for callers that need reproducible randomness
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AdaptiveLearningEngine {
        AdaptiveLearningEngine::new(&LearningConfig {
            seed: Some(17),
            ..LearningConfig::default()
        })
    }

    #[test]
    fn test_outcome_fans_out() {
        let mut learning = engine();
        learning.record_trade_outcome(&TradeOutcome {
            motif: MotifType::Momentum,
            success: true,
            from_state: PriceState::Neutral,
            to_state: PriceState::Uptrend,
            action: Action::Long,
            reward: 1.0,
        });

        assert_eq!(learning.bayesian().counts(MotifType::Momentum).successes, 1);
        assert_eq!(
            learning
                .trade_transitions()
                .count(PriceState::Neutral, PriceState::Uptrend),
            1
        );
        // trade horizons stay out of the one-step table
        assert_eq!(
            learning.markov().count(PriceState::Neutral, PriceState::Uptrend),
            0
        );
        assert_eq!(
            learning.predict_next_state(PriceState::Neutral),
            PriceState::Neutral
        );
        assert!((learning.q_agent().q_value(PriceState::Neutral, Action::Long) - 0.1).abs() < 1e-12);
        assert!(learning.learned_weights().get(MotifType::Momentum) > 0.25);
    }

    #[test]
    fn test_seeded_engines_agree() {
        let mut a = engine();
        let mut b = engine();
        let sa = a.simulate(100.0, 0.02).unwrap();
        let sb = b.simulate(100.0, 0.02).unwrap();
        assert_eq!(sa.mean, sb.mean);
        assert_eq!(a.select_action(PriceState::Neutral), b.select_action(PriceState::Neutral));
    }
}
