//! Motif Runner - crypto trading agent
//!
//! 1. Loads settings (file named by the first argument or `MOTIF_CONFIG`,
//!    then `MOTIF_<SECTION>__<KEY>` environment overrides)
//! 2. Builds market data, order, sentiment and trade-store collaborators
//! 3. Runs the single-symbol bot and, when enabled, the rotation bot
//! 4. Stops on Ctrl-C after in-flight cycles finish

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn};

use motif_runner::config::Settings;
use motif_runner::exchange::{
    CachedMarketData, Collaborators, DemoFallbackGateway, MarketDataSource, MemoryTradeStore,
    OrderGateway, PaperGateway, SentimentSource, TradeSink,
};
use motif_runner::indicators::provider_for;
use motif_runner::logging::init_tracing;
use motif_runner::runner::{BotRunner, RotationBot, SingleSymbolBot};
use motif_runner::strategy::{EnsembleStrategyEngine, StrategyEngine};
use motif_runner::{MarketIntelligenceClient, RestMarketData, RestOrderGateway, TradingMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MOTIF_CONFIG").ok());
    let settings = Settings::load(path.as_deref())?;
    init_tracing(&settings.logging)?;

    info!("Starting {}...", settings.bot.name);
    match settings.bot.trading_mode {
        TradingMode::Paper => info!("📝 Running in PAPER TRADING mode"),
        TradingMode::Live => warn!("💰 Running in LIVE TRADING mode - REAL MONEY AT RISK"),
    }

    let market_data: Arc<dyn MarketDataSource> = Arc::new(CachedMarketData::new(
        Arc::new(RestMarketData::new(
            &settings.exchange,
            provider_for(settings.exchange.indicators),
        )?),
        Duration::from_secs(settings.exchange.quote_cache_secs),
    ));
    let sentiment: Arc<dyn SentimentSource> =
        Arc::new(MarketIntelligenceClient::new(&settings.exchange)?);
    let trades: Arc<dyn TradeSink> = Arc::new(MemoryTradeStore::default());

    let collaborators = |orders: Arc<dyn OrderGateway>| Collaborators {
        market_data: market_data.clone(),
        orders,
        sentiment: Some(sentiment.clone()),
        trades: trades.clone(),
    };

    let state_dir = settings.state.resolve_dir();
    info!("State directory: {}", state_dir.display());
    let mut runner = BotRunner::new(motif_runner::StateManager::new(&state_dir));

    let live = settings.bot.trading_mode == TradingMode::Live;
    let engine = StrategyEngine::new(&settings, collaborators(order_gateway(&settings)?));
    runner.add_bot(
        Box::new(SingleSymbolBot::new(
            &settings.bot.name,
            engine,
            &settings.bot.quote_asset,
            live,
        )),
        Duration::from_secs(settings.bot.cycle_interval_secs),
    );

    if settings.bot.multi_symbol_enabled {
        let engine = EnsembleStrategyEngine::new(&settings, collaborators(order_gateway(&settings)?));
        runner.add_bot(
            Box::new(RotationBot::new(
                &format!("{}-rotation", settings.bot.name),
                engine,
            )),
            Duration::from_secs(settings.bot.multi_cycle_interval_secs),
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(runner.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for in-flight cycles");
    let _ = shutdown_tx.send(true);
    handle.await??;
    info!("Stopped");
    Ok(())
}

/// Paper fills, or the live endpoint with a paper fallback for bad keys
fn order_gateway(settings: &Settings) -> anyhow::Result<Arc<dyn OrderGateway>> {
    let exchange = &settings.exchange;
    let starting_quote = Decimal::from_f64(settings.risk.initial_balance)
        .ok_or_else(|| anyhow::anyhow!("initial_balance is not representable"))?;
    let paper = PaperGateway::new(
        &settings.bot.quote_asset,
        starting_quote,
        exchange.paper_slippage_bps,
    );

    if settings.bot.trading_mode == TradingMode::Paper {
        return Ok(Arc::new(paper));
    }
    match (&exchange.execution_url, &exchange.api_key) {
        (Some(url), Some(key)) => {
            let live = RestOrderGateway::new(url, key, exchange.request_timeout_secs)?;
            Ok(Arc::new(DemoFallbackGateway::new(Arc::new(live), paper)))
        }
        _ => {
            warn!("Live mode without execution_url/api_key; using paper fills");
            Ok(Arc::new(paper))
        }
    }
}
