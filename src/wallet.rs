//! Wallet snapshot tracking.
//!
//! `WalletTracker` holds the last wallet snapshot taken while the engine
//! was idle; the executor's square-up leg measures its bridge exposure
//! against it. The refresh worker stands down while the trading flag is
//! engaged so a mid-cycle refresh can never shift that baseline.

use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::TradingFlag;
use crate::exchange::{with_retry, ExchangeClient, RetryPolicy};
use crate::types::WalletSnapshot;
use crate::watchdog::StopSignal;

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct WalletTracker {
    snapshot: RwLock<Option<WalletSnapshot>>,
}

impl WalletTracker {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
        }
    }

    pub fn replace(&self, snapshot: WalletSnapshot) {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(snapshot);
    }

    pub fn latest(&self) -> Option<WalletSnapshot> {
        let guard = match self.snapshot.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }
}

impl Default for WalletTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Fetch the wallet, retrying at a fixed cadence until it succeeds or the
/// stop signal is raised. Used at startup where running without a wallet
/// baseline is not an option.
pub async fn fetch_wallet_blocking(
    client: &dyn ExchangeClient,
    retry: &RetryPolicy,
    stop: &StopSignal,
) -> Option<WalletSnapshot> {
    loop {
        if stop.is_raised() {
            return None;
        }
        match with_retry(retry, || client.fetch_wallet()).await {
            Ok(snapshot) => return Some(snapshot),
            Err(e) => {
                warn!(error = %e, "wallet fetch failed, retrying");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Periodic wallet refresh. Skips the fetch entirely while a cycle is
/// running; the executor refreshes the tracker itself once the cycle
/// settles.
pub async fn run_wallet_worker(
    client: Arc<dyn ExchangeClient>,
    tracker: Arc<WalletTracker>,
    flag: Arc<TradingFlag>,
    retry: RetryPolicy,
    refresh_interval: Duration,
    busy_backoff: Duration,
    stop: Arc<StopSignal>,
) {
    loop {
        let delay = if flag.is_engaged() {
            busy_backoff
        } else {
            match with_retry(&retry, || client.fetch_wallet()).await {
                Ok(snapshot) => {
                    // The flag may have been engaged while we fetched; a
                    // snapshot taken mid-cycle must not become the baseline.
                    if flag.is_engaged() {
                        debug!("discarding wallet snapshot taken during a cycle");
                    } else {
                        tracker.replace(snapshot);
                    }
                }
                Err(e) => warn!(error = %e, "periodic wallet refresh failed"),
            }
            refresh_interval
        };
        tokio::select! {
            _ = stop.wait() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeError;
    use crate::types::{
        Market, Order, OrderBookLevel, OrderBookSnapshot, OrderRequest,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts wallet fetches; everything else is unreachable in these tests.
    struct CountingClient {
        fetches: AtomicU32,
    }

    #[async_trait]
    impl ExchangeClient for CountingClient {
        async fn fetch_order_book(
            &self,
            _assets: &[String],
        ) -> Result<OrderBookSnapshot, ExchangeError> {
            unreachable!()
        }
        async fn fetch_bridge_rate(&self) -> Result<OrderBookLevel, ExchangeError> {
            unreachable!()
        }
        async fn fetch_wallet(&self) -> Result<WalletSnapshot, ExchangeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(WalletSnapshot {
                captured_at: Utc::now(),
                balances: HashMap::new(),
            })
        }
        async fn place_order(&self, _request: &OrderRequest) -> Result<String, ExchangeError> {
            unreachable!()
        }
        async fn fetch_order(&self, _order_id: &str) -> Result<Order, ExchangeError> {
            unreachable!()
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<Order, ExchangeError> {
            unreachable!()
        }
        async fn list_open_orders(
            &self,
            _market: Option<Market>,
        ) -> Result<Vec<Order>, ExchangeError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_worker_stands_down_while_engaged() {
        let client = Arc::new(CountingClient {
            fetches: AtomicU32::new(0),
        });
        let tracker = Arc::new(WalletTracker::new());
        let flag = Arc::new(TradingFlag::new());
        let stop = Arc::new(StopSignal::new());

        let guard = flag.try_engage().unwrap();
        let worker = tokio::spawn(run_wallet_worker(
            client.clone(),
            tracker.clone(),
            flag.clone(),
            RetryPolicy::default(),
            Duration::from_millis(5),
            Duration::from_millis(5),
            stop.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.fetches.load(Ordering::SeqCst), 0);
        assert!(tracker.latest().is_none());

        drop(guard);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.fetches.load(Ordering::SeqCst) > 0);
        assert!(tracker.latest().is_some());

        stop.raise();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_blocking_fetch_stops_on_signal() {
        let client = CountingClient {
            fetches: AtomicU32::new(0),
        };
        let stop = StopSignal::new();
        stop.raise();
        let got = fetch_wallet_blocking(&client, &RetryPolicy::default(), &stop).await;
        assert!(got.is_none());
    }
}
