//! REST-polling market-data source.
//!
//! Each refresh fetches one top-of-book snapshot for the scanned assets
//! plus the fiat-quoted bridge rate through the exchange client, under the
//! bounded retry policy.

use async_trait::async_trait;
use std::sync::Arc;

use super::{MarketDataCache, MarketDataSource};
use crate::exchange::{with_retry, ExchangeClient, RetryPolicy};

pub struct PollSource {
    client: Arc<dyn ExchangeClient>,
    cache: Arc<MarketDataCache>,
    assets: Vec<String>,
    retry: RetryPolicy,
}

impl PollSource {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        cache: Arc<MarketDataCache>,
        assets: Vec<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            cache,
            assets,
            retry,
        }
    }
}

#[async_trait]
impl MarketDataSource for PollSource {
    async fn refresh(&self) -> anyhow::Result<()> {
        let snapshot = with_retry(&self.retry, || self.client.fetch_order_book(&self.assets))
            .await?;
        let bridge = with_retry(&self.retry, || self.client.fetch_bridge_rate()).await?;
        // Publish the book first so a reader pairing latest() with bridge()
        // never sees a bridge rate newer than the book it prices.
        self.cache.push(snapshot);
        self.cache.set_bridge(bridge);
        Ok(())
    }

    fn name(&self) -> &str {
        "rest-poll"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperExchange;
    use crate::types::{OrderBookLevel, PairLevels};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_refresh_publishes_book_and_bridge() {
        let venue = Arc::new(PaperExchange::new("KRW", "BTC"));
        venue.set_book(
            "XRP",
            PairLevels {
                fiat: OrderBookLevel {
                    ask_price: dec!(101),
                    bid_price: dec!(100),
                    ask_size: dec!(10),
                    bid_size: dec!(10),
                },
                bridge: OrderBookLevel::default(),
            },
        );
        venue.set_bridge(OrderBookLevel {
            ask_price: dec!(50100000),
            bid_price: dec!(50000000),
            ask_size: dec!(1),
            bid_size: dec!(1),
        });

        let cache = Arc::new(MarketDataCache::new(4));
        let source = PollSource::new(
            venue,
            cache.clone(),
            vec!["XRP".to_string()],
            RetryPolicy::default(),
        );

        source.refresh().await.unwrap();
        source.refresh().await.unwrap();

        assert_eq!(cache.len(), 2);
        let latest = cache.latest().unwrap();
        assert_eq!(latest.asset("XRP").unwrap().fiat.ask_price, dec!(101));
        assert_eq!(cache.bridge().unwrap().bid_price, dec!(50000000));
    }
}
