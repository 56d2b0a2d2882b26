//! Runner configuration
//!
//! Settings are layered: built-in defaults, then an optional config file
//! (TOML/YAML/JSON), then `MOTIF_*` environment variables with `__` as the
//! section separator, e.g. `MOTIF_RISK__ATR_MULTIPLIER=2.5`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::motifs::MotifType;

const ENV_PREFIX: &str = "MOTIF";
const DEFAULT_STATE_DIR: &str = ".motif-runner";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub bot: BotSettings,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from an optional file plus environment overrides
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the engines cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        let risk = &self.risk;
        if risk.atr_multiplier <= 0.0 || risk.trailing_atr_multiplier <= 0.0 {
            return Err(EngineError::Configuration(
                "ATR multipliers must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("max_position_risk", risk.max_position_risk),
            ("max_total_risk", risk.max_total_risk),
            ("max_notional_fraction", risk.max_notional_fraction),
            ("max_position_value_fraction", risk.max_position_value_fraction),
            ("partial_close_fraction", risk.partial_close_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(EngineError::Configuration(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if risk.initial_balance <= 0.0 {
            return Err(EngineError::Configuration(
                "initial_balance must be positive".to_string(),
            ));
        }
        if risk.min_risk_reward <= 0.0 || risk.default_risk_reward < risk.min_risk_reward {
            return Err(EngineError::Configuration(format!(
                "default_risk_reward ({}) must be >= min_risk_reward ({}) > 0",
                risk.default_risk_reward, risk.min_risk_reward
            )));
        }
        if self.strategy.initial_weights.values().all(|w| *w <= 0.0) {
            return Err(EngineError::Configuration(
                "at least one motif weight must be positive".to_string(),
            ));
        }
        if self.strategy.history_capacity < 2 {
            return Err(EngineError::Configuration(
                "history_capacity must hold at least two prices".to_string(),
            ));
        }
        if self.rotation.min_risk_reward <= 0.0 {
            return Err(EngineError::Configuration(
                "rotation.min_risk_reward must be positive".to_string(),
            ));
        }
        if self.rotation.top_n == 0 {
            return Err(EngineError::Configuration(
                "rotation.top_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

/// Which indicator implementation feeds market snapshots
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorBackend {
    /// In-crate math with Wilder-smoothed RSI and ATR
    #[default]
    Wilder,
    /// The `ta` crate
    Ta,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BotSettings {
    pub name: String,
    pub symbol: String,
    pub interval: String,
    pub candle_limit: usize,
    pub cycle_interval_secs: u64,
    pub trading_mode: TradingMode,
    /// Run the multi-symbol rotation bot alongside the single-symbol bot
    pub multi_symbol_enabled: bool,
    pub multi_cycle_interval_secs: u64,
    pub quote_asset: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            name: "motif-runner".to_string(),
            symbol: "BTCUSDT".to_string(),
            interval: "15m".to_string(),
            candle_limit: 200,
            cycle_interval_secs: 60,
            trading_mode: TradingMode::Paper,
            multi_symbol_enabled: false,
            multi_cycle_interval_secs: 300,
            quote_asset: "USDT".to_string(),
        }
    }
}

/// Risk limits and stop/target placement
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub initial_balance: f64,
    /// Fraction of balance risked per trade (stop distance x quantity)
    pub max_position_risk: f64,
    /// Cap on summed open risk as a fraction of balance
    pub max_total_risk: f64,
    /// Sizing cap on position notional as a fraction of balance
    pub max_notional_fraction: f64,
    /// Validation cap on position notional as a fraction of balance
    pub max_position_value_fraction: f64,
    pub min_risk_reward: f64,
    pub default_risk_reward: f64,
    pub atr_multiplier: f64,
    pub trailing_atr_multiplier: f64,
    /// Decimal places position sizes are floored to
    pub quantity_precision: u32,
    pub partial_take_profit_pct: f64,
    pub full_take_profit_pct: f64,
    pub partial_close_fraction: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            max_position_risk: 0.02,
            max_total_risk: 0.06,
            max_notional_fraction: 0.025,
            max_position_value_fraction: 0.10,
            min_risk_reward: 2.0,
            default_risk_reward: 2.5,
            atr_multiplier: 2.0,
            trailing_atr_multiplier: 1.2,
            quantity_precision: 2,
            partial_take_profit_pct: 0.005,
            full_take_profit_pct: 0.01,
            partial_close_fraction: 0.5,
        }
    }
}

/// Action classification and execution gating
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub long_threshold: f64,
    pub short_threshold: f64,
    pub weak_long_threshold: f64,
    pub weak_short_threshold: f64,
    pub min_confidence: f64,
    pub execution_min_confidence: f64,
    pub execution_long_signal: f64,
    pub execution_short_signal: f64,
    pub history_capacity: usize,
    pub log_retention: usize,
    pub initial_weights: BTreeMap<MotifType, f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            long_threshold: 0.58,
            short_threshold: 0.42,
            weak_long_threshold: 0.52,
            weak_short_threshold: 0.48,
            min_confidence: 0.4,
            execution_min_confidence: 0.60,
            execution_long_signal: 0.55,
            execution_short_signal: 0.45,
            history_capacity: 100,
            log_retention: 1000,
            initial_weights: MotifType::ALL.iter().map(|m| (*m, 0.25)).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LearningConfig {
    /// Fixed seed for reproducible runs; entropy when absent
    pub seed: Option<u64>,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub exploration_rate: f64,
    pub simulation_scenarios: usize,
    pub simulation_steps: usize,
    pub simulation_drift: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            seed: None,
            learning_rate: 0.1,
            discount_factor: 0.95,
            exploration_rate: 0.1,
            simulation_scenarios: 1000,
            simulation_steps: 100,
            simulation_drift: 0.0001,
        }
    }
}

/// Multi-symbol rotation and dynamic risk
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RotationConfig {
    pub universe: Vec<String>,
    pub top_n: usize,
    pub baseline_volatility: f64,
    pub base_position_fraction: f64,
    pub base_stop_loss_pct: f64,
    pub base_take_profit_pct: f64,
    pub max_stop_loss_pct: f64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub mutation_rate: f64,
    pub performance_boost_threshold: f64,
    pub weight_boost: f64,
    /// Risk/reward floor for the rotation book; dynamic levels range from 1.0 to 3.5
    pub min_risk_reward: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            universe: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            top_n: 3,
            baseline_volatility: 0.02,
            base_position_fraction: 0.05,
            base_stop_loss_pct: 0.03,
            base_take_profit_pct: 0.06,
            max_stop_loss_pct: 0.15,
            buy_threshold: 0.6,
            sell_threshold: 0.4,
            mutation_rate: 0.1,
            performance_boost_threshold: 0.7,
            weight_boost: 1.1,
            min_risk_reward: 0.9,
        }
    }
}

/// Exchange and data-source endpoints
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExchangeConfig {
    #[serde(default = "default_market_data_url")]
    pub market_data_url: String,
    /// Live order endpoint; paper fills only when absent
    #[serde(default)]
    pub execution_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Market-data cache TTL in seconds
    #[serde(default = "default_quote_cache_secs")]
    pub quote_cache_secs: u64,
    /// Simulated slippage for paper fills, in basis points
    #[serde(default = "default_paper_slippage_bps")]
    pub paper_slippage_bps: u32,
    #[serde(default = "default_fear_greed_url")]
    pub fear_greed_url: String,
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default)]
    pub indicators: IndicatorBackend,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            market_data_url: default_market_data_url(),
            execution_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            quote_cache_secs: default_quote_cache_secs(),
            paper_slippage_bps: default_paper_slippage_bps(),
            fear_greed_url: default_fear_greed_url(),
            coingecko_url: default_coingecko_url(),
            indicators: IndicatorBackend::default(),
        }
    }
}

fn default_market_data_url() -> String { "https://api.binance.com".to_string() }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_quote_cache_secs() -> u64 { 10 }
fn default_paper_slippage_bps() -> u32 { 5 }
fn default_fear_greed_url() -> String { "https://api.alternative.me/fng/".to_string() }
fn default_coingecko_url() -> String { "https://api.coingecko.com/api/v3".to_string() }

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    /// Directory for state snapshots and decision journals
    pub dir: Option<PathBuf>,
}

impl StateConfig {
    /// Configured directory, else `~/.motif-runner`
    pub fn resolve_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_STATE_DIR)
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "motif_runner=info,warn".to_string(),
            json: false,
        }
    }
}
