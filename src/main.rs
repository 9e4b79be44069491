//! TRICYCLE — Triangular-Arbitrage Trading Engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the exchange client, market-data source, and background workers,
//! and runs the scan→gate→execute loop with graceful shutdown. A watchdog
//! trip exits non-zero so an external supervisor restarts the process.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use tricycle::config::{self, MarketDataKind};
use tricycle::engine::accountant::Accountant;
use tricycle::engine::executor::{ExecutionConfig, ExecutionEngine};
use tricycle::engine::scanner::{ScanConfig, Scanner};
use tricycle::engine::TradingFlag;
use tricycle::exchange::paper::PaperExchange;
use tricycle::exchange::{ExchangeClient, RetryPolicy};
use tricycle::marketdata::poll::PollSource;
use tricycle::marketdata::{self, MarketDataCache, MarketDataSource};
use tricycle::wallet::{self, WalletTracker};
use tricycle::watchdog::{StopSignal, Watchdog};

const BANNER: &str = r#"
 _____ ____  ___ ______   ______ _     _____
|_   _|  _ \|_ _/ ___\ \ / / ___| |   | ____|
  | | | |_) || | |    \ V / |   | |   |  _|
  | | |  _ < | | |___  | || |___| |___| |___
  |_| |_| \_\___\____| |_| \____|_____|_____|

  Triangular-Arbitrage Trading Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        mode = %cfg.exchange.mode,
        fiat = %cfg.exchange.fiat_currency,
        bridge = %cfg.exchange.bridge_currency,
        assets = cfg.trading.assets.len(),
        profit_threshold = %cfg.trading.profit_threshold,
        "TRICYCLE starting up"
    );

    // -- Shared state ------------------------------------------------------

    let cache = Arc::new(MarketDataCache::new(cfg.market_data.history_depth));
    let tracker = Arc::new(WalletTracker::new());
    let flag = Arc::new(TradingFlag::new());
    let stop = Arc::new(StopSignal::new());
    let retry = RetryPolicy::default();

    // -- Exchange client ---------------------------------------------------

    // Live transports plug in behind the same trait; the shipped binary
    // wires the paper venue.
    let client: Arc<dyn ExchangeClient> = match cfg.exchange.mode.as_str() {
        "paper" => Arc::new(PaperExchange::new(
            &cfg.exchange.fiat_currency,
            &cfg.exchange.bridge_currency,
        )),
        other => return Err(anyhow!("unknown exchange mode: {other}")),
    };

    // -- Market-data source ------------------------------------------------

    let source: Arc<dyn MarketDataSource> = match cfg.market_data.source {
        MarketDataKind::Poll => Arc::new(PollSource::new(
            client.clone(),
            cache.clone(),
            cfg.trading.assets.clone(),
            retry.clone(),
        )),
        MarketDataKind::Stream => {
            return Err(anyhow!(
                "stream market data needs an external feed transport; use source = \"poll\""
            ));
        }
    };

    // -- Initial wallet baseline ------------------------------------------

    let Some(initial_wallet) =
        wallet::fetch_wallet_blocking(client.as_ref(), &retry, &stop).await
    else {
        return Ok(());
    };
    info!(
        fiat = %initial_wallet.available(&cfg.exchange.fiat_currency),
        bridge = %initial_wallet.available(&cfg.exchange.bridge_currency),
        "initial wallet captured"
    );
    tracker.replace(initial_wallet.clone());

    // -- Engine ------------------------------------------------------------

    let engine = ExecutionEngine::new(
        client.clone(),
        source.clone(),
        cache.clone(),
        tracker.clone(),
        flag.clone(),
        retry.clone(),
        ExecutionConfig {
            fiat_currency: cfg.exchange.fiat_currency.clone(),
            bridge_currency: cfg.exchange.bridge_currency.clone(),
            profit_threshold: cfg.trading.profit_threshold,
            recheck_before_entry: cfg.trading.recheck_before_entry,
            settle_poll_interval: Duration::from_millis(cfg.trading.settle_poll_interval_ms),
            settle_poll_budget: cfg.trading.settle_poll_budget,
            balance_poll_attempts: cfg.trading.balance_poll_attempts,
        },
    );
    let accountant = Accountant::new(
        &cfg.exchange.fiat_currency,
        &cfg.exchange.bridge_currency,
        initial_wallet,
        cfg.audit.plausibility.clone(),
    );
    let scanner = Scanner::new(
        client.clone(),
        cache.clone(),
        tracker.clone(),
        engine,
        cfg.trading.sizing.clone(),
        accountant,
        Arc::new(tricycle::audit::LogAuditSink),
        retry.clone(),
        ScanConfig {
            assets: cfg.trading.assets.clone(),
            profit_threshold: cfg.trading.profit_threshold,
            momentum_baseline: cfg.trading.momentum_baseline,
            max_spread_ratio: cfg.trading.max_spread_ratio,
        },
    );

    // -- Background workers ------------------------------------------------

    let md_worker = tokio::spawn(marketdata::run_market_data_worker(
        source.clone(),
        Duration::from_millis(cfg.market_data.poll_interval_ms),
        stop.clone(),
    ));
    let wallet_worker = tokio::spawn(wallet::run_wallet_worker(
        client.clone(),
        tracker.clone(),
        flag.clone(),
        retry.clone(),
        Duration::from_secs(cfg.wallet.refresh_interval_secs),
        Duration::from_secs(cfg.wallet.busy_backoff_secs),
        stop.clone(),
    ));
    let watchdog = Watchdog::new(
        flag.clone(),
        Duration::from_secs(cfg.watchdog.ceiling_secs),
        Duration::from_secs(cfg.watchdog.poll_interval_secs),
        Duration::from_secs(cfg.watchdog.progress_log_secs),
    );

    // -- Main loop ---------------------------------------------------------

    let scan_interval = Duration::from_millis(cfg.market_data.scan_interval_ms);
    let mut interval = tokio::time::interval(scan_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let tripped = watchdog.run();
    tokio::pin!(tripped);

    info!(
        scan_interval_ms = cfg.market_data.scan_interval_ms,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let exit: Result<()> = loop {
        tokio::select! {
            _ = interval.tick() => {
                match scanner.scan_once().await {
                    Ok(report) => info!(
                        scanned = report.assets_scanned,
                        candidates = report.candidates,
                        executed = report.cycles_executed,
                        missed = report.cycles_missed,
                        "scan complete"
                    ),
                    Err(e) => error!(error = %e, "scan failed — continuing"),
                }
            }
            _ = &mut tripped => {
                break Err(anyhow!(
                    "watchdog ceiling exceeded; exiting for external restart"
                ));
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break Ok(());
            }
        }
    };

    stop.raise();
    let _ = md_worker.await;
    let _ = wallet_worker.await;

    match &exit {
        Ok(()) => info!("TRICYCLE shut down cleanly."),
        Err(e) => error!(error = %e, "TRICYCLE shutting down after fatal condition"),
    }
    exit
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tricycle=info"));

    let json_logging = std::env::var("TRICYCLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
