//! In-memory paper venue.
//!
//! Backs the binary's paper mode and the integration tests. Books and the
//! bridge rate are set directly; order fills follow a script so tests can
//! drive partial fills, misses, and rejections deterministically. Wallet
//! balances move on every fill, so the engine's measured-delta square-up
//! sees realistic numbers.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{ExchangeClient, ExchangeError, RejectReason};
use crate::types::{
    Balance, Market, Order, OrderBookLevel, OrderBookSnapshot, OrderRequest, OrderState,
    PairLevels, Side, WalletSnapshot,
};

/// How the paper venue settles the next placed order.
#[derive(Debug, Clone, Copy)]
pub enum FillScript {
    /// Fill the full requested volume immediately.
    Fill,
    /// Fill the given fraction (0–1) and leave the rest resting.
    PartialFill(Decimal),
    /// Leave the order resting with nothing executed.
    NoFill,
    /// Refuse the placement.
    Reject(RejectReason),
}

#[derive(Default)]
struct Inner {
    books: HashMap<String, PairLevels>,
    bridge: OrderBookLevel,
    balances: HashMap<String, Balance>,
    orders: HashMap<String, Order>,
    placed: Vec<String>,
    script: VecDeque<FillScript>,
    wallet_overrides: VecDeque<WalletSnapshot>,
    cancel_not_found_budget: u32,
}

pub struct PaperExchange {
    fiat_currency: String,
    bridge_currency: String,
    /// Artificial placement latency, for tests that need overlap windows.
    latency: Duration,
    inner: Mutex<Inner>,
}

impl PaperExchange {
    pub fn new(fiat_currency: &str, bridge_currency: &str) -> Self {
        Self {
            fiat_currency: fiat_currency.to_string(),
            bridge_currency: bridge_currency.to_string(),
            latency: Duration::ZERO,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // -- test/setup surface -------------------------------------------------

    pub fn set_book(&self, asset: &str, levels: PairLevels) {
        self.lock().books.insert(asset.to_string(), levels);
    }

    pub fn set_bridge(&self, level: OrderBookLevel) {
        self.lock().bridge = level;
    }

    pub fn set_balance(&self, currency: &str, available: Decimal) {
        self.lock().balances.insert(
            currency.to_string(),
            Balance {
                available,
                locked: Decimal::ZERO,
            },
        );
    }

    /// Queue settlement behavior for upcoming placements. Placements beyond
    /// the queue fill in full.
    pub fn push_fills(&self, fills: &[FillScript]) {
        self.lock().script.extend(fills.iter().copied());
    }

    /// Queue wallet snapshots returned verbatim by upcoming `fetch_wallet`
    /// calls, ahead of the venue's own accounting.
    pub fn push_wallet(&self, snapshot: WalletSnapshot) {
        self.lock().wallet_overrides.push_back(snapshot);
    }

    /// Make the next `n` cancel calls answer `order_not_found`.
    pub fn fail_cancels_with_not_found(&self, n: u32) {
        self.lock().cancel_not_found_budget = n;
    }

    pub fn placed_order_ids(&self) -> Vec<String> {
        self.lock().placed.clone()
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.lock().orders.get(order_id).cloned()
    }

    pub fn available(&self, currency: &str) -> Decimal {
        self.lock()
            .balances
            .get(currency)
            .map(|b| b.available)
            .unwrap_or_default()
    }

    // -- bookkeeping --------------------------------------------------------

    fn quote_currency(&self, market: Market) -> &str {
        match market {
            Market::Fiat => &self.fiat_currency,
            Market::Bridge => &self.bridge_currency,
        }
    }

    fn apply_fill(&self, inner: &mut Inner, request: &OrderRequest, volume: Decimal) {
        if volume.is_zero() {
            return;
        }
        let notional = request.price * volume;
        let quote = self.quote_currency(request.market).to_string();
        let (debit, debit_amount, credit, credit_amount) = match request.side {
            Side::Bid => (quote, notional, request.asset.clone(), volume),
            Side::Ask => (request.asset.clone(), volume, quote, notional),
        };
        inner.balances.entry(debit).or_default().available -= debit_amount;
        inner.balances.entry(credit).or_default().available += credit_amount;
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn fetch_order_book(
        &self,
        assets: &[String],
    ) -> Result<OrderBookSnapshot, ExchangeError> {
        let inner = self.lock();
        let mut levels = HashMap::new();
        for asset in assets {
            if let Some(pair) = inner.books.get(asset) {
                levels.insert(asset.clone(), *pair);
            }
        }
        Ok(OrderBookSnapshot {
            captured_at: Utc::now(),
            levels,
        })
    }

    async fn fetch_bridge_rate(&self) -> Result<OrderBookLevel, ExchangeError> {
        Ok(self.lock().bridge)
    }

    async fn fetch_wallet(&self) -> Result<WalletSnapshot, ExchangeError> {
        let mut inner = self.lock();
        if let Some(snapshot) = inner.wallet_overrides.pop_front() {
            return Ok(snapshot);
        }
        Ok(WalletSnapshot {
            captured_at: Utc::now(),
            balances: inner.balances.clone(),
        })
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String, ExchangeError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut inner = self.lock();
        let script = inner.script.pop_front().unwrap_or(FillScript::Fill);

        let executed = match script {
            FillScript::Reject(reason) => return Err(ExchangeError::Rejected(reason)),
            FillScript::Fill => request.volume,
            FillScript::PartialFill(fraction) => request.volume * fraction,
            FillScript::NoFill => Decimal::ZERO,
        };
        let remaining = request.volume - executed;
        let state = if remaining.is_zero() {
            OrderState::Done
        } else if executed.is_zero() {
            OrderState::Open
        } else {
            OrderState::PartiallyFilled
        };

        self.apply_fill(&mut inner, request, executed);

        let id = Uuid::new_v4().to_string();
        inner.orders.insert(
            id.clone(),
            Order {
                id: id.clone(),
                market: request.market,
                asset: request.asset.clone(),
                side: request.side,
                requested_volume: request.volume,
                requested_price: request.price,
                executed_volume: executed,
                remaining_volume: remaining,
                state,
            },
        );
        inner.placed.push(id.clone());
        Ok(id)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Order, ExchangeError> {
        self.lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or(ExchangeError::OrderNotFound)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<Order, ExchangeError> {
        let mut inner = self.lock();
        if inner.cancel_not_found_budget > 0 {
            inner.cancel_not_found_budget -= 1;
            return Err(ExchangeError::OrderNotFound);
        }
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or(ExchangeError::OrderNotFound)?;
        if !order.state.is_terminal() {
            order.state = OrderState::Cancelled;
        }
        Ok(order.clone())
    }

    async fn list_open_orders(
        &self,
        market: Option<Market>,
    ) -> Result<Vec<Order>, ExchangeError> {
        Ok(self
            .lock()
            .orders
            .values()
            .filter(|o| !o.state.is_terminal())
            .filter(|o| market.map_or(true, |m| o.market == m))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
