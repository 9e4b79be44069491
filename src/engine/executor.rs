//! Three-leg cycle executor.
//!
//! Runs one triangular cycle as a small saga: acquire the asset (entry),
//! dispose of it in the other market (exit), then square up the bridge
//! position in the fiat market. Each leg settles through cancel-and-read,
//! so the engine always acts on venue-confirmed fills, never on hope.
//! The exit leg re-decides continue-vs-unwind on every retry; the
//! square-up leg trades the measured wallet delta, not nominal volumes.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::engine::{pricing, profit, TradingFlag};
use crate::exchange::{with_retry, ExchangeClient, ExchangeError, RejectReason, RetryPolicy};
use crate::marketdata::{MarketDataCache, MarketDataSource};
use crate::types::{
    CycleExecutionRecord, Market, Order, OrderBookLevel, OrderKind, OrderRequest, OrderState,
    PairLevels, Side, Topology,
};
use crate::wallet::WalletTracker;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a candidate cycle was not entered. No capital was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// Another cycle holds the trading flag.
    Busy,
    /// No usable market view at decision time.
    StaleBook,
    /// The pre-entry re-evaluation no longer cleared the threshold.
    ReturnDecayed,
    /// The venue refused the entry order.
    EntryRejected,
    /// The entry order rested unfilled and was cancelled with zero executed.
    NoFill,
}

/// Why a committed cycle could not be driven to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Inventory acquired on entry could be neither sold on nor unwound.
    ExitStranded,
    /// The square-up order was rejected; bridge exposure remains open.
    SquareUpRejected,
}

/// Terminal result of one cycle attempt.
#[derive(Debug)]
pub enum CycleOutcome {
    /// All three legs settled.
    Completed(CycleExecutionRecord),
    /// Entry inventory was fully resold into the entry market; the cycle
    /// carries no bridge exposure and skips the square-up leg.
    UnwoundClean(CycleExecutionRecord),
    Missed(MissReason),
    Aborted {
        reason: AbortReason,
        record: CycleExecutionRecord,
    },
}

impl CycleOutcome {
    pub fn record(&self) -> Option<&CycleExecutionRecord> {
        match self {
            CycleOutcome::Completed(r) | CycleOutcome::UnwoundClean(r) => Some(r),
            CycleOutcome::Aborted { record, .. } => Some(record),
            CycleOutcome::Missed(_) => None,
        }
    }
}

enum ExitResult {
    Proceed { executed: Decimal },
    CleanUnwind,
    Abort,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub fiat_currency: String,
    pub bridge_currency: String,
    /// Minimum evaluated return to keep a cycle at the pre-entry re-check.
    pub profit_threshold: Decimal,
    pub recheck_before_entry: bool,
    /// Delay between settlement polls.
    pub settle_poll_interval: Duration,
    /// Settlement polls per cancel-and-read round.
    pub settle_poll_budget: u32,
    /// Attempts to read the acquired balance before giving up.
    pub balance_poll_attempts: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fiat_currency: "KRW".to_string(),
            bridge_currency: "BTC".to_string(),
            profit_threshold: rust_decimal_macros::dec!(1.0),
            recheck_before_entry: true,
            settle_poll_interval: Duration::from_millis(100),
            settle_poll_budget: 10,
            balance_poll_attempts: 10,
        }
    }
}

pub struct ExecutionEngine {
    client: Arc<dyn ExchangeClient>,
    source: Arc<dyn MarketDataSource>,
    cache: Arc<MarketDataCache>,
    wallet: Arc<WalletTracker>,
    flag: Arc<TradingFlag>,
    retry: RetryPolicy,
    cfg: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        source: Arc<dyn MarketDataSource>,
        cache: Arc<MarketDataCache>,
        wallet: Arc<WalletTracker>,
        flag: Arc<TradingFlag>,
        retry: RetryPolicy,
        cfg: ExecutionConfig,
    ) -> Self {
        Self {
            client,
            source,
            cache,
            wallet,
            flag,
            retry,
            cfg,
        }
    }

    /// Run one cycle for `asset` under the trading flag. `sized_volume` is
    /// the bridge-denominated commitment, `asset_volume` the same amount in
    /// base-asset units at the entry price.
    pub async fn execute(
        &self,
        asset: &str,
        topology: &'static Topology,
        expected_return: Decimal,
        sized_volume: Decimal,
        asset_volume: Decimal,
    ) -> anyhow::Result<CycleOutcome> {
        let Some(_guard) = self.flag.try_engage() else {
            debug!(asset, "trading flag busy, skipping candidate");
            return Ok(CycleOutcome::Missed(MissReason::Busy));
        };
        info!(
            asset,
            topology = %topology.id,
            expected_return = %expected_return,
            sized_volume = %sized_volume,
            "cycle engaged"
        );
        let outcome = self
            .run_cycle(asset, topology, expected_return, sized_volume, asset_volume)
            .await?;
        Ok(outcome)
    }

    async fn run_cycle(
        &self,
        asset: &str,
        topology: &'static Topology,
        expected_return: Decimal,
        sized_volume: Decimal,
        asset_volume: Decimal,
    ) -> Result<CycleOutcome, ExchangeError> {
        let mut record =
            CycleExecutionRecord::new(asset, topology.id, expected_return, sized_volume);

        // -- Pre-entry re-evaluation against a fresh book -----------------
        if self.cfg.recheck_before_entry {
            if let Err(e) = self.source.refresh().await {
                warn!(error = %e, asset, "pre-entry refresh failed");
                return Ok(CycleOutcome::Missed(MissReason::StaleBook));
            }
            let Some((levels, bridge)) = self.current_view(asset) else {
                return Ok(CycleOutcome::Missed(MissReason::StaleBook));
            };
            match profit::evaluate(&levels, topology, bridge) {
                Some(ret) if ret >= self.cfg.profit_threshold => {
                    debug!(asset, re_evaluated = %ret, "pre-entry check passed");
                }
                other => {
                    info!(asset, re_evaluated = ?other, "return decayed before entry");
                    return Ok(CycleOutcome::Missed(MissReason::ReturnDecayed));
                }
            }
        }

        // -- Leg 1: acquire ------------------------------------------------
        let entry = topology.entry();
        let Some((levels, _)) = self.current_view(asset) else {
            return Ok(CycleOutcome::Missed(MissReason::StaleBook));
        };
        let entry_price = self.normalize_price(
            entry.market,
            levels.market(entry.market).price(entry.price_source),
        );
        let request = OrderRequest {
            market: entry.market,
            asset: asset.to_string(),
            side: entry.side,
            volume: asset_volume,
            price: entry_price,
            kind: OrderKind::Limit,
        };
        let Some(order_id) = self.place_or_recover(&request).await? else {
            info!(asset, "entry placement rejected; nothing committed");
            return Ok(CycleOutcome::Missed(MissReason::EntryRejected));
        };
        let order = self.settle(&order_id).await?;
        record.push_leg(1, &order);
        if order.executed_volume.is_zero() {
            info!(asset, price = %entry_price, "entry missed entirely; no capital committed");
            return Ok(CycleOutcome::Missed(MissReason::NoFill));
        }
        debug!(
            executed = %order.executed_volume,
            remaining = %order.remaining_volume,
            "entry leg settled"
        );

        // -- Leg 2: dispose ------------------------------------------------
        match self
            .run_exit_leg(asset, topology, entry_price, &mut record)
            .await?
        {
            ExitResult::CleanUnwind => {
                info!(asset, "inventory fully resold; no bridge exposure to square up");
                return Ok(CycleOutcome::UnwoundClean(record.finish()));
            }
            ExitResult::Abort => {
                return Ok(CycleOutcome::Aborted {
                    reason: AbortReason::ExitStranded,
                    record: record.finish(),
                });
            }
            ExitResult::Proceed { executed } => {
                debug!(asset, executed = %executed, "exit leg settled");
            }
        }

        // -- Leg 3: square up ----------------------------------------------
        if !self.run_square_up(topology, &mut record).await? {
            return Ok(CycleOutcome::Aborted {
                reason: AbortReason::SquareUpRejected,
                record: record.finish(),
            });
        }
        Ok(CycleOutcome::Completed(record.finish()))
    }

    // -- Leg 2 -------------------------------------------------------------

    /// Work the acquired inventory until it is either sold through the exit
    /// market or resold into the entry market. Every retry re-decides which
    /// branch is worth more at current prices.
    async fn run_exit_leg(
        &self,
        asset: &str,
        topology: &'static Topology,
        entry_price: Decimal,
        record: &mut CycleExecutionRecord,
    ) -> Result<ExitResult, ExchangeError> {
        let entry = topology.entry();
        let exit = topology.exit();

        let volume = self.acquired_balance(asset).await?;
        if volume.is_zero() {
            warn!(asset, "entry fill reported but no balance became available");
            return Ok(ExitResult::Abort);
        }

        let Some((levels, _)) = self.current_view(asset) else {
            warn!(asset, "no market view for the exit leg");
            return Ok(ExitResult::Abort);
        };
        let exit_price = self.normalize_price(
            exit.market,
            levels.market(exit.market).price(exit.price_source),
        );
        let request = OrderRequest {
            market: exit.market,
            asset: asset.to_string(),
            side: exit.side,
            volume,
            price: exit_price,
            kind: OrderKind::Limit,
        };
        let Some(mut order_id) = self.place_or_recover(&request).await? else {
            warn!(asset, "exit placement rejected with inventory on hand");
            return Ok(ExitResult::Abort);
        };
        let mut order = self.settle(&order_id).await?;
        record.push_leg(2, &order);
        let mut executed = order.executed_volume;
        // Unwind candidate price starts from the entry market's current bid
        // and is damped toward fresh bids on every failed attempt.
        let mut resell_price = levels.market(entry.market).bid_price;

        loop {
            if order.state == OrderState::Done || order.remaining_volume.is_zero() {
                break;
            }

            if let Err(e) = self.source.refresh().await {
                warn!(error = %e, "market refresh failed mid-cycle");
            }
            let Some((levels, bridge)) = self.current_view(asset) else {
                tokio::time::sleep(self.cfg.settle_poll_interval).await;
                continue;
            };
            let continue_return =
                profit::evaluate(&levels, topology, bridge).unwrap_or(Decimal::ZERO);
            let unwind_return = profit::resell_return(entry_price, resell_price, entry.market);
            let remaining = order.remaining_volume;

            if continue_return >= unwind_return {
                // Still worth finishing: chase the exit market with the
                // remainder at the refreshed price.
                let price = self.normalize_price(
                    exit.market,
                    levels.market(exit.market).price(exit.price_source),
                );
                let request = OrderRequest {
                    market: exit.market,
                    asset: asset.to_string(),
                    side: exit.side,
                    volume: remaining,
                    price,
                    kind: OrderKind::Limit,
                };
                let Some(id) = self.place_or_recover(&request).await? else {
                    break;
                };
                debug!(price = %price, volume = %remaining, "re-pricing exit remainder");
                order_id = id;
                order = self.settle(&order_id).await?;
                record.push_leg(2, &order);
                executed += order.executed_volume;
            } else {
                // Unwinding beats continuing: resell the remainder into the
                // entry market.
                let price = self.normalize_price(entry.market, resell_price);
                let request = OrderRequest {
                    market: entry.market,
                    asset: asset.to_string(),
                    side: Side::Ask,
                    volume: remaining,
                    price,
                    kind: OrderKind::Limit,
                };
                let Some(id) = self.place_or_recover(&request).await? else {
                    if executed > Decimal::ZERO {
                        break;
                    }
                    warn!(asset, "unwind placement rejected with nothing executed");
                    return Ok(ExitResult::Abort);
                };
                info!(
                    price = %price,
                    volume = %remaining,
                    continue_return = %continue_return,
                    unwind_return = %unwind_return,
                    "unwinding unfilled inventory into the entry market"
                );
                order_id = id;
                order = self.await_settlement(&order_id).await?;
                if order.state == OrderState::Done {
                    record.push_leg(2, &order);
                    if executed > Decimal::ZERO {
                        break;
                    }
                    return Ok(ExitResult::CleanUnwind);
                }
                resell_price = pricing::damped_resell_price(
                    resell_price,
                    levels.market(entry.market).bid_price,
                );
                if entry.market == Market::Fiat {
                    resell_price = pricing::round_to_fiat_tick(resell_price);
                }
                order = self.settle(&order_id).await?;
                record.push_leg(2, &order);
                // A cancel racing a full unwind fill still ends the cycle
                // clean when nothing ever sold through the exit market.
                if order.remaining_volume.is_zero() && executed.is_zero() {
                    return Ok(ExitResult::CleanUnwind);
                }
            }
        }

        if executed.is_zero() {
            warn!(asset, "exit leg ended with nothing executed");
            return Ok(ExitResult::Abort);
        }
        Ok(ExitResult::Proceed { executed })
    }

    // -- Leg 3 -------------------------------------------------------------

    /// Restore the bridge position in the fiat market. The traded volume is
    /// the measured wallet delta against the pre-cycle snapshot, so partial
    /// fills and dust land on the right side of the books.
    async fn run_square_up(
        &self,
        topology: &'static Topology,
        record: &mut CycleExecutionRecord,
    ) -> Result<bool, ExchangeError> {
        let leg = topology.square_up();
        let baseline = self
            .wallet
            .latest()
            .map(|w| w.available(&self.cfg.bridge_currency))
            .unwrap_or(Decimal::ZERO);
        let current = with_retry(&self.retry, || self.client.fetch_wallet()).await?;
        let mut volume = (current.available(&self.cfg.bridge_currency) - baseline).abs();
        if volume.is_zero() {
            warn!("no measurable bridge exposure to square up");
            return Ok(true);
        }

        loop {
            let Some(bridge) = self.cache.bridge() else {
                if let Err(e) = self.source.refresh().await {
                    warn!(error = %e, "market refresh failed during square-up");
                }
                tokio::time::sleep(self.cfg.settle_poll_interval).await;
                continue;
            };
            let price = pricing::round_to_fiat_tick(bridge.price(leg.price_source));
            let request = OrderRequest {
                market: Market::Fiat,
                asset: self.cfg.bridge_currency.clone(),
                side: leg.side,
                volume,
                price,
                kind: OrderKind::Limit,
            };
            let Some(id) = self.place_or_recover(&request).await? else {
                error!(
                    volume = %volume,
                    "square-up placement rejected; bridge exposure left open"
                );
                return Ok(false);
            };
            info!(side = %leg.side, price = %price, volume = %volume, "square-up order placed");
            let order = self.settle(&id).await?;
            record.push_leg(3, &order);
            if order.remaining_volume.is_zero() {
                return Ok(true);
            }
            // Chase the remainder at the refreshed bridge rate.
            if let Err(e) = self.source.refresh().await {
                warn!(error = %e, "market refresh failed during square-up");
            }
            volume = order.remaining_volume;
        }
    }

    // -- Shared plumbing ----------------------------------------------------

    fn current_view(&self, asset: &str) -> Option<(PairLevels, OrderBookLevel)> {
        let snapshot = self.cache.latest()?;
        let levels = *snapshot.asset(asset)?;
        let bridge = self.cache.bridge()?;
        Some((levels, bridge))
    }

    fn normalize_price(&self, market: Market, price: Decimal) -> Decimal {
        match market {
            Market::Fiat => pricing::round_to_fiat_tick(price),
            Market::Bridge => price,
        }
    }

    /// Place an order; on an insufficient-funds rejection, cancel every
    /// open order once to free locked funds and retry. `None` means the
    /// venue rejected the order for a semantic reason.
    async fn place_or_recover(
        &self,
        request: &OrderRequest,
    ) -> Result<Option<String>, ExchangeError> {
        match with_retry(&self.retry, || self.client.place_order(request)).await {
            Ok(id) => Ok(Some(id)),
            Err(ExchangeError::Rejected(RejectReason::InsufficientFunds)) => {
                warn!(
                    asset = %request.asset,
                    "placement rejected for insufficient funds; freeing locked orders"
                );
                self.cancel_all_open(None).await?;
                match with_retry(&self.retry, || self.client.place_order(request)).await {
                    Ok(id) => Ok(Some(id)),
                    Err(ExchangeError::Rejected(reason)) => {
                        warn!(asset = %request.asset, %reason, "placement rejected again");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(ExchangeError::Rejected(reason)) => {
                warn!(asset = %request.asset, %reason, "placement rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_all_open(&self, market: Option<Market>) -> Result<(), ExchangeError> {
        let open = with_retry(&self.retry, || self.client.list_open_orders(market)).await?;
        for order in open {
            self.settle(&order.id).await?;
        }
        Ok(())
    }

    /// Cancel-and-read until the order is terminal. Cancellation of an
    /// already-settled order (`order_not_found`) is success-equivalent;
    /// a cancel racing a fill is resolved by reissuing.
    async fn settle(&self, order_id: &str) -> Result<Order, ExchangeError> {
        loop {
            match with_retry(&self.retry, || self.client.cancel_order(order_id)).await {
                Ok(_) | Err(ExchangeError::OrderNotFound) => {}
                Err(e) => return Err(e),
            }
            let order = self.await_settlement(order_id).await?;
            if order.state.is_terminal() {
                return Ok(order);
            }
        }
    }

    /// Poll an order toward a terminal state within the settle budget. The
    /// last observed order is returned even if still open, so callers can
    /// decide what to do with the remainder.
    async fn await_settlement(&self, order_id: &str) -> Result<Order, ExchangeError> {
        let mut budget = self.cfg.settle_poll_budget;
        loop {
            let order = match with_retry(&self.retry, || self.client.fetch_order(order_id)).await
            {
                Ok(order) => order,
                Err(ExchangeError::OrderNotFound) if budget > 0 => {
                    // Placement and read raced; give the venue a beat.
                    budget -= 1;
                    tokio::time::sleep(self.cfg.settle_poll_interval).await;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if order.state.is_terminal() || budget == 0 {
                return Ok(order);
            }
            budget -= 1;
            tokio::time::sleep(self.cfg.settle_poll_interval).await;
        }
    }

    /// Read the spendable balance acquired on entry. A locked balance with
    /// nothing available means a stale order is still holding the funds:
    /// cancel open orders and re-read without consuming an attempt.
    async fn acquired_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let mut attempts = 0u32;
        while attempts < self.cfg.balance_poll_attempts {
            attempts += 1;
            let wallet = with_retry(&self.retry, || self.client.fetch_wallet()).await?;
            let balance = wallet.balance(asset);
            if !balance.available.is_zero() {
                return Ok(balance.available);
            }
            if !balance.locked.is_zero() {
                warn!(asset, locked = %balance.locked, "balance locked behind stale orders");
                self.cancel_all_open(None).await?;
                attempts -= 1;
            }
            tokio::time::sleep(self.cfg.settle_poll_interval).await;
        }
        Ok(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
