//! Scan loop: rank, gate, size, execute, reconcile.
//!
//! Each scan walks the configured assets against the latest cached book,
//! evaluates both cycle directions, and hands the best candidate that
//! clears the threshold and gates to the executor. After a committed
//! cycle the wallet is re-read, deltas are reconciled, and plausible
//! results go to the audit sink.

use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audit::AuditSink;
use crate::engine::accountant::Accountant;
use crate::engine::executor::{CycleOutcome, ExecutionEngine};
use crate::engine::sizing::{self, VolumeSizer};
use crate::engine::{profit, profit::MomentumBaseline};
use crate::exchange::{with_retry, ExchangeClient, RetryPolicy};
use crate::marketdata::MarketDataCache;
use crate::types::{OrderBookSnapshot, Topology, WalletSnapshot};
use crate::wallet::WalletTracker;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub assets: Vec<String>,
    /// Minimum evaluated cycle return to trigger execution.
    pub profit_threshold: Decimal,
    /// Momentum gate baseline; `None` disables the gate.
    pub momentum_baseline: Option<MomentumBaseline>,
    /// Entry-pair ask/bid ceiling; `None` disables the gate.
    pub max_spread_ratio: Option<Decimal>,
}

/// Per-scan counters, for the main loop's summary line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanReport {
    pub assets_scanned: usize,
    pub candidates: usize,
    pub cycles_executed: usize,
    pub cycles_missed: usize,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner {
    client: Arc<dyn ExchangeClient>,
    cache: Arc<MarketDataCache>,
    wallet: Arc<WalletTracker>,
    engine: ExecutionEngine,
    sizer: VolumeSizer,
    accountant: Accountant,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
    cfg: ScanConfig,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        cache: Arc<MarketDataCache>,
        wallet: Arc<WalletTracker>,
        engine: ExecutionEngine,
        sizer: VolumeSizer,
        accountant: Accountant,
        audit: Arc<dyn AuditSink>,
        retry: RetryPolicy,
        cfg: ScanConfig,
    ) -> Self {
        Self {
            client,
            cache,
            wallet,
            engine,
            sizer,
            accountant,
            audit,
            retry,
            cfg,
        }
    }

    /// One pass over all configured assets.
    pub async fn scan_once(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        let Some(snapshot) = self.cache.latest() else {
            debug!("no market data yet");
            return Ok(report);
        };
        let Some(bridge) = self.cache.bridge() else {
            debug!("no bridge rate yet");
            return Ok(report);
        };
        let baseline = self.baseline_snapshot();

        for asset in &self.cfg.assets {
            let Some(levels) = snapshot.asset(asset).copied() else {
                continue;
            };
            report.assets_scanned += 1;

            // Rank both cycle directions; an unpriceable direction is
            // skipped, not treated as a zero return.
            let mut best: Option<(&'static Topology, Decimal)> = None;
            for topology in Topology::ALL {
                match profit::evaluate(&levels, topology, bridge) {
                    Some(ret) => {
                        if best.map_or(true, |(_, b)| ret > b) {
                            best = Some((topology, ret));
                        }
                    }
                    None => {
                        warn!(
                            asset = %asset,
                            topology = %topology.id,
                            fiat_ask = %levels.fiat.ask_price,
                            bridge_ask = %levels.bridge.ask_price,
                            bridge_rate_ask = %bridge.ask_price,
                            "cycle return undefined for current quotes"
                        );
                    }
                }
            }
            let Some((topology, expected_return)) = best else {
                continue;
            };
            if expected_return < self.cfg.profit_threshold {
                continue;
            }
            report.candidates += 1;

            // Gates run only on candidates past the threshold.
            if let Some(kind) = self.cfg.momentum_baseline {
                let passed = baseline
                    .as_ref()
                    .and_then(|snap| snap.asset(asset))
                    .map(|base| profit::momentum_ok(base, &levels, topology))
                    .unwrap_or(false);
                if !passed {
                    debug!(asset = %asset, baseline = ?kind, "momentum gate rejected candidate");
                    report.cycles_missed += 1;
                    continue;
                }
            }
            if let Some(max_ratio) = self.cfg.max_spread_ratio {
                let entry = levels.market(topology.entry().market);
                if !profit::spread_ok(entry, max_ratio) {
                    debug!(asset = %asset, "spread gate rejected candidate");
                    report.cycles_missed += 1;
                    continue;
                }
            }

            // Size the commitment.
            let Some(optimal) = sizing::optimal_volume(&levels, topology, bridge) else {
                continue;
            };
            let Some(volume) = self.sizer.order_volume(optimal) else {
                debug!(asset = %asset, optimal = %optimal, "candidate sized below minimum");
                report.cycles_missed += 1;
                continue;
            };
            let Some(asset_volume) = sizing::to_asset_volume(&levels, topology, volume) else {
                continue;
            };

            info!(
                asset = %asset,
                topology = %topology.id,
                expected_return = %expected_return,
                volume = %volume,
                "candidate cleared all gates; executing"
            );

            let before = self.wallet.latest();
            match self
                .engine
                .execute(asset, topology, expected_return, volume, asset_volume)
                .await
            {
                Ok(outcome) => {
                    self.finish_cycle(outcome, before, &mut report).await;
                }
                Err(e) => {
                    error!(asset = %asset, error = %e, "cycle execution failed");
                    report.cycles_missed += 1;
                }
            }
        }

        Ok(report)
    }

    fn baseline_snapshot(&self) -> Option<OrderBookSnapshot> {
        match self.cfg.momentum_baseline? {
            MomentumBaseline::Oldest => self.cache.oldest(),
            MomentumBaseline::Previous => self.cache.previous(),
        }
    }

    /// Post-cycle bookkeeping: refresh the wallet, reconcile deltas, and
    /// audit plausible committed cycles.
    async fn finish_cycle(
        &self,
        outcome: CycleOutcome,
        before: Option<WalletSnapshot>,
        report: &mut ScanReport,
    ) {
        match &outcome {
            CycleOutcome::Missed(reason) => {
                info!(reason = ?reason, "cycle missed");
                report.cycles_missed += 1;
                return;
            }
            CycleOutcome::Aborted { reason, record } => {
                error!(
                    asset = %record.asset,
                    reason = ?reason,
                    "cycle aborted; manual review needed"
                );
                report.cycles_missed += 1;
            }
            CycleOutcome::Completed(_) | CycleOutcome::UnwoundClean(_) => {
                report.cycles_executed += 1;
            }
        }

        // Capital moved: re-read the wallet regardless of how the cycle
        // ended, and republish it as the new idle baseline.
        let after = match with_retry(&self.retry, || self.client.fetch_wallet()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "post-cycle wallet read failed; skipping reconciliation");
                return;
            }
        };
        self.wallet.replace(after.clone());

        let (mut record, audited) = match outcome {
            CycleOutcome::Completed(r) | CycleOutcome::UnwoundClean(r) => (r, true),
            CycleOutcome::Aborted { record, .. } => (record, false),
            CycleOutcome::Missed(_) => return,
        };

        let Some(before) = before else {
            warn!("no pre-cycle wallet snapshot; skipping reconciliation");
            return;
        };
        let bridge_bid = self.cache.bridge().map(|b| b.bid_price).unwrap_or_default();
        let summary = self
            .accountant
            .reconcile(&before, &after, bridge_bid, &mut record);

        if audited && self.accountant.plausible(&summary) {
            if let Err(e) = self.audit.record_cycle(&record).await {
                error!(error = %e, sink = self.audit.name(), "audit sink rejected record");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::accountant::PlausibilityBand;
    use crate::engine::executor::ExecutionConfig;
    use crate::engine::TradingFlag;
    use crate::exchange::paper::PaperExchange;
    use crate::marketdata::poll::PollSource;
    use crate::marketdata::MarketDataSource;
    use crate::types::{OrderBookLevel, PairLevels};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    fn profitable_levels() -> PairLevels {
        // Fiat entry: buy at 100 KRW, sell at 0.0000021 BTC, bridge bid
        // 50,000,000 → pre-fee return 1.05.
        PairLevels {
            fiat: OrderBookLevel {
                ask_price: dec!(100),
                bid_price: dec!(99.9),
                ask_size: dec!(500000),
                bid_size: dec!(500000),
            },
            bridge: OrderBookLevel {
                ask_price: dec!(0.0000022),
                bid_price: dec!(0.0000021),
                ask_size: dec!(500000),
                bid_size: dec!(500000),
            },
        }
    }

    fn bridge_rate() -> OrderBookLevel {
        OrderBookLevel {
            ask_price: dec!(50100000),
            bid_price: dec!(50000000),
            ask_size: dec!(1),
            bid_size: dec!(1),
        }
    }

    async fn scanner_for(venue: Arc<PaperExchange>, cfg: ScanConfig) -> Scanner {
        let cache = Arc::new(MarketDataCache::new(4));
        let source = Arc::new(PollSource::new(
            venue.clone(),
            cache.clone(),
            cfg.assets.clone(),
            RetryPolicy::default(),
        ));
        source.refresh().await.unwrap();

        let wallet = Arc::new(WalletTracker::new());
        wallet.replace(venue.fetch_wallet().await.unwrap());
        let initial = venue.fetch_wallet().await.unwrap();

        let engine = ExecutionEngine::new(
            venue.clone(),
            source,
            cache.clone(),
            wallet.clone(),
            Arc::new(TradingFlag::new()),
            RetryPolicy::default(),
            ExecutionConfig {
                profit_threshold: cfg.profit_threshold,
                settle_poll_interval: Duration::from_millis(2),
                settle_poll_budget: 3,
                balance_poll_attempts: 3,
                ..ExecutionConfig::default()
            },
        );
        Scanner::new(
            venue,
            cache,
            wallet,
            engine,
            VolumeSizer {
                safety_fraction: dec!(0.8),
                minimum: dec!(0.001),
                maximum: dec!(0.5),
            },
            Accountant::new(
                "KRW",
                "BTC",
                initial,
                PlausibilityBand {
                    minimum: dec!(-10000000),
                    maximum: dec!(10000000),
                },
            ),
            Arc::new(crate::audit::LogAuditSink),
            RetryPolicy::default(),
            cfg,
        )
    }

    fn base_config() -> ScanConfig {
        ScanConfig {
            assets: vec!["XRP".to_string()],
            profit_threshold: dec!(1.0),
            momentum_baseline: None,
            max_spread_ratio: None,
        }
    }

    #[tokio::test]
    async fn test_scan_executes_profitable_candidate() {
        let venue = Arc::new(PaperExchange::new("KRW", "BTC"));
        venue.set_book("XRP", profitable_levels());
        venue.set_bridge(bridge_rate());
        venue.set_balance("KRW", dec!(100000000));
        venue.set_balance("BTC", dec!(10));

        let scanner = scanner_for(venue, base_config()).await;
        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.assets_scanned, 1);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.cycles_executed, 1);
    }

    #[tokio::test]
    async fn test_scan_skips_below_threshold() {
        let venue = Arc::new(PaperExchange::new("KRW", "BTC"));
        let mut levels = profitable_levels();
        // Push the exit bid down so neither direction clears 1.0.
        levels.bridge.bid_price = dec!(0.0000018);
        levels.bridge.ask_price = dec!(0.0000030);
        venue.set_book("XRP", levels);
        venue.set_bridge(bridge_rate());

        let scanner = scanner_for(venue.clone(), base_config()).await;
        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.candidates, 0);
        assert!(venue.placed_order_ids().is_empty());
    }

    #[tokio::test]
    async fn test_scan_skips_zero_priced_direction_and_continues() {
        let venue = Arc::new(PaperExchange::new("KRW", "BTC"));
        let mut levels = profitable_levels();
        // Bridge-entry divides by this ask; zero makes it undefined while
        // fiat entry stays executable.
        levels.bridge.ask_price = Decimal::ZERO;
        venue.set_book("XRP", levels);
        venue.set_bridge(bridge_rate());
        venue.set_balance("KRW", dec!(100000000));
        venue.set_balance("BTC", dec!(10));

        let scanner = scanner_for(venue, base_config()).await;
        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.cycles_executed, 1);
    }

    #[tokio::test]
    async fn test_momentum_gate_blocks_without_rising_baseline() {
        let venue = Arc::new(PaperExchange::new("KRW", "BTC"));
        venue.set_book("XRP", profitable_levels());
        venue.set_bridge(bridge_rate());

        let cfg = ScanConfig {
            momentum_baseline: Some(MomentumBaseline::Previous),
            ..base_config()
        };
        let scanner = scanner_for(venue.clone(), cfg).await;
        // Only one snapshot exists, so the Previous baseline is absent and
        // the gate must reject.
        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.cycles_executed, 0);
        assert!(venue.placed_order_ids().is_empty());
    }

    #[tokio::test]
    async fn test_spread_gate_blocks_wide_entry() {
        let venue = Arc::new(PaperExchange::new("KRW", "BTC"));
        let mut levels = profitable_levels();
        // Entry ask unchanged (the cycle still clears the threshold) but
        // the bid collapses, blowing the ask/bid ratio past the ceiling.
        levels.fiat.bid_price = dec!(90);
        venue.set_book("XRP", levels);
        venue.set_bridge(bridge_rate());

        let cfg = ScanConfig {
            max_spread_ratio: Some(dec!(1.02)),
            ..base_config()
        };
        let scanner = scanner_for(venue.clone(), cfg).await;
        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.cycles_executed, 0);
        assert!(venue.placed_order_ids().is_empty());
    }
}
