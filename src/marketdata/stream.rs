//! Push-feed market-data source.
//!
//! Consumes already-decoded events from an upstream transport (the wire
//! protocol lives outside this crate). A refresh awaits the next event,
//! then drains whatever else is immediately ready, so the cache always
//! holds the freshest view the transport has produced.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{MarketDataCache, MarketDataSource};
use crate::types::{OrderBookLevel, OrderBookSnapshot};

/// One decoded message from the feed.
#[derive(Debug, Clone)]
pub enum MarketDataEvent {
    Snapshot(OrderBookSnapshot),
    BridgeRate(OrderBookLevel),
}

pub struct StreamSource {
    events: Mutex<BoxStream<'static, MarketDataEvent>>,
    cache: Arc<MarketDataCache>,
}

impl StreamSource {
    pub fn new(
        events: impl Stream<Item = MarketDataEvent> + Send + 'static,
        cache: Arc<MarketDataCache>,
    ) -> Self {
        Self {
            events: Mutex::new(events.boxed()),
            cache,
        }
    }

    fn apply(&self, event: MarketDataEvent) {
        match event {
            MarketDataEvent::Snapshot(snapshot) => self.cache.push(snapshot),
            MarketDataEvent::BridgeRate(level) => self.cache.set_bridge(level),
        }
    }
}

#[async_trait]
impl MarketDataSource for StreamSource {
    async fn refresh(&self) -> anyhow::Result<()> {
        let mut events = self.events.lock().await;
        match events.next().await {
            Some(event) => self.apply(event),
            None => anyhow::bail!("market data stream closed"),
        }
        // Drain anything already buffered without blocking.
        while let Some(Some(event)) = events.next().now_or_never() {
            self.apply(event);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stream"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
