//! Market-data cache and source seam.
//!
//! The engine never talks to a feed directly: a `MarketDataSource`
//! implementation pulls snapshots into the shared `MarketDataCache`, and
//! everything downstream reads immutable snapshots out of it. Two sources
//! ship: REST polling ([`poll`]) and a push feed ([`stream`]).

pub mod poll;
pub mod stream;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::warn;

use crate::types::{OrderBookLevel, OrderBookSnapshot};
use crate::watchdog::StopSignal;

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// A feed that can pull the next market-data refresh into the cache.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch (or drain) the next update and publish it to the cache.
    async fn refresh(&self) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Snapshot cache
// ---------------------------------------------------------------------------

/// Bounded history of order-book snapshots plus the latest bridge rate.
///
/// Snapshots are immutable once published; readers clone the `Arc`-free
/// values out under a short read lock. History is ordered oldest → newest
/// and evicts from the front once `depth` is reached.
pub struct MarketDataCache {
    depth: usize,
    history: RwLock<VecDeque<OrderBookSnapshot>>,
    bridge: RwLock<Option<OrderBookLevel>>,
}

impl MarketDataCache {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            history: RwLock::new(VecDeque::new()),
            bridge: RwLock::new(None),
        }
    }

    fn read_history(&self) -> RwLockReadGuard<'_, VecDeque<OrderBookSnapshot>> {
        match self.history.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_history(&self) -> RwLockWriteGuard<'_, VecDeque<OrderBookSnapshot>> {
        match self.history.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish a new snapshot, evicting the oldest past the depth bound.
    pub fn push(&self, snapshot: OrderBookSnapshot) {
        let mut history = self.write_history();
        if history.len() == self.depth {
            history.pop_front();
        }
        history.push_back(snapshot);
    }

    pub fn set_bridge(&self, level: OrderBookLevel) {
        let mut bridge = match self.bridge.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *bridge = Some(level);
    }

    pub fn bridge(&self) -> Option<OrderBookLevel> {
        match self.bridge.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn latest(&self) -> Option<OrderBookSnapshot> {
        self.read_history().back().cloned()
    }

    pub fn oldest(&self) -> Option<OrderBookSnapshot> {
        self.read_history().front().cloned()
    }

    /// The snapshot immediately before the newest; `None` until two
    /// snapshots exist.
    pub fn previous(&self) -> Option<OrderBookSnapshot> {
        let history = self.read_history();
        if history.len() < 2 {
            return None;
        }
        history.get(history.len() - 2).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_history().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_history().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Refresh worker
// ---------------------------------------------------------------------------

/// Long-lived refresh loop: pull from the source at a fixed cadence until
/// stopped. Individual refresh failures are logged and skipped; the loop
/// itself never gives up.
pub async fn run_market_data_worker(
    source: Arc<dyn MarketDataSource>,
    interval: Duration,
    stop: Arc<StopSignal>,
) {
    loop {
        tokio::select! {
            _ = stop.wait() => break,
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = source.refresh().await {
                    warn!(source = source.name(), error = %e, "market data refresh failed");
                }
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
    use crate::types::PairLevels;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn snapshot(tag: Decimal) -> OrderBookSnapshot {
        let mut levels = HashMap::new();
        levels.insert(
            "XRP".to_string(),
            PairLevels {
                fiat: OrderBookLevel {
                    ask_price: tag,
                    bid_price: tag,
                    ask_size: dec!(1),
                    bid_size: dec!(1),
                },
                bridge: OrderBookLevel::default(),
            },
        );
        OrderBookSnapshot {
            captured_at: Utc::now(),
            levels,
        }
    }

    fn tag_of(s: &OrderBookSnapshot) -> Decimal {
        s.asset("XRP").map(|p| p.fiat.ask_price).unwrap_or_default()
    }

    #[test]
    fn test_history_orders_oldest_to_newest() {
        let cache = MarketDataCache::new(3);
        assert!(cache.is_empty());
        assert!(cache.previous().is_none());

        cache.push(snapshot(dec!(1)));
        assert_eq!(tag_of(&cache.latest().unwrap()), dec!(1));
        assert_eq!(tag_of(&cache.oldest().unwrap()), dec!(1));
        assert!(cache.previous().is_none());

        cache.push(snapshot(dec!(2)));
        cache.push(snapshot(dec!(3)));
        assert_eq!(cache.len(), 3);
        assert_eq!(tag_of(&cache.latest().unwrap()), dec!(3));
        assert_eq!(tag_of(&cache.previous().unwrap()), dec!(2));
        assert_eq!(tag_of(&cache.oldest().unwrap()), dec!(1));
    }

    #[test]
    fn test_depth_bound_evicts_oldest() {
        let cache = MarketDataCache::new(2);
        cache.push(snapshot(dec!(1)));
        cache.push(snapshot(dec!(2)));
        cache.push(snapshot(dec!(3)));
        assert_eq!(cache.len(), 2);
        assert_eq!(tag_of(&cache.oldest().unwrap()), dec!(2));
        assert_eq!(tag_of(&cache.latest().unwrap()), dec!(3));
    }

    #[test]
    fn test_bridge_rate_replacement() {
        let cache = MarketDataCache::new(2);
        assert!(cache.bridge().is_none());
        cache.set_bridge(OrderBookLevel {
            ask_price: dec!(2),
            bid_price: dec!(1),
            ask_size: dec!(1),
            bid_size: dec!(1),
        });
        cache.set_bridge(OrderBookLevel {
            ask_price: dec!(4),
            bid_price: dec!(3),
            ask_size: dec!(1),
            bid_size: dec!(1),
        });
        assert_eq!(cache.bridge().unwrap().bid_price, dec!(3));
    }
}
