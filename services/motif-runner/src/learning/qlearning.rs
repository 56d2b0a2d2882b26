//! Tabular Q-learning over price states

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::markov::PriceState;
use crate::types::Side;

/// Discrete actions available to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Long,
    Short,
    Neutral,
    ReducePosition,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Long,
        Action::Short,
        Action::Neutral,
        Action::ReducePosition,
    ];
}

impl From<Side> for Action {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Action::Long,
            Side::Short => Action::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QParams {
    pub learning_rate: f64,
    pub discount: f64,
    pub exploration: f64,
}

impl Default for QParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.95,
            exploration: 0.1,
        }
    }
}

/// Q-table keyed by (state, action); unseen pairs are zero
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QLearningAgent {
    table: HashMap<(PriceState, Action), f64>,
    params: QParams,
}

impl QLearningAgent {
    pub fn new(params: QParams) -> Self {
        Self {
            table: HashMap::new(),
            params,
        }
    }

    pub fn q_value(&self, state: PriceState, action: Action) -> f64 {
        self.table.get(&(state, action)).copied().unwrap_or(0.0)
    }

    pub fn table(&self) -> &HashMap<(PriceState, Action), f64> {
        &self.table
    }

    fn max_q(&self, state: PriceState) -> f64 {
        Action::ALL
            .iter()
            .map(|a| self.q_value(state, *a))
            .fold(f64::MIN, f64::max)
    }

    /// Q <- Q + α (reward + γ max_a Q(next, a) - Q)
    pub fn record_reward(
        &mut self,
        state: PriceState,
        action: Action,
        reward: f64,
        next_state: PriceState,
    ) -> f64 {
        let current = self.q_value(state, action);
        let target = reward + self.params.discount * self.max_q(next_state);
        let updated = current + self.params.learning_rate * (target - current);
        self.table.insert((state, action), updated);
        updated
    }

    /// Highest-valued action; ties go to `Neutral`
    pub fn best_action(&self, state: PriceState) -> Action {
        let mut best = Action::Neutral;
        let mut best_q = self.q_value(state, best);
        for action in Action::ALL {
            let q = self.q_value(state, action);
            if q > best_q {
                best = action;
                best_q = q;
            }
        }
        best
    }

    /// ε-greedy selection
    pub fn select_action<R: Rng + ?Sized>(&self, state: PriceState, rng: &mut R) -> Action {
        if rng.gen::<f64>() < self.params.exploration {
            Action::ALL[rng.gen_range(0..Action::ALL.len())]
        } else {
            self.best_action(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_reward_update() {
        let mut agent = QLearningAgent::new(QParams::default());
        let q = agent.record_reward(PriceState::Neutral, Action::Long, 1.0, PriceState::Neutral);
        assert!((q - 0.1).abs() < 1e-12);
        assert!((agent.q_value(PriceState::Neutral, Action::Long) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_bootstraps_from_next_state() {
        let mut agent = QLearningAgent::new(QParams::default());
        agent.record_reward(PriceState::Uptrend, Action::Long, 1.0, PriceState::Neutral);
        // max Q(Uptrend) = 0.1 -> 0 + 0.1 * (0 + 0.95 * 0.1)
        let q = agent.record_reward(PriceState::Neutral, Action::Short, 0.0, PriceState::Uptrend);
        assert!((q - 0.0095).abs() < 1e-12);
    }

    #[test]
    fn test_ties_prefer_neutral() {
        let agent = QLearningAgent::new(QParams::default());
        assert_eq!(agent.best_action(PriceState::Uptrend), Action::Neutral);
    }

    #[test]
    fn test_greedy_without_exploration() {
        let mut agent = QLearningAgent::new(QParams {
            exploration: 0.0,
            ..QParams::default()
        });
        agent.record_reward(PriceState::Uptrend, Action::Long, 2.0, PriceState::Uptrend);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            assert_eq!(agent.select_action(PriceState::Uptrend, &mut rng), Action::Long);
        }
    }

    #[test]
    fn test_full_exploration_covers_actions() {
        let agent = QLearningAgent::new(QParams {
            exploration: 1.0,
            ..QParams::default()
        });
        let mut rng = StdRng::seed_from_u64(9);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(agent.select_action(PriceState::Neutral, &mut rng));
        }
        assert_eq!(seen.len(), Action::ALL.len());
    }
}
