//! Shared types for the trading engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that exchange, market-data,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Markets and sides
// ---------------------------------------------------------------------------

/// Which quote currency a pair trades against.
///
/// Every listed asset trades in two markets on the venue: one quoted in the
/// fiat currency (e.g. KRW) and one quoted in the bridge asset (e.g. BTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Fiat,
    Bridge,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Fiat => write!(f, "fiat"),
            Market::Bridge => write!(f, "bridge"),
        }
    }
}

/// Order side. `Bid` buys the base asset, `Ask` sells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Which side of the book a leg prices off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Ask,
    Bid,
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// Top-of-book quote for one pair: best ask/bid price and the size resting
/// at each.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub ask_price: Decimal,
    pub bid_price: Decimal,
    pub ask_size: Decimal,
    pub bid_size: Decimal,
}

impl OrderBookLevel {
    pub fn price(&self, source: PriceSource) -> Decimal {
        match source {
            PriceSource::Ask => self.ask_price,
            PriceSource::Bid => self.bid_price,
        }
    }

    /// Both sides quoted with non-zero prices.
    pub fn is_complete(&self) -> bool {
        !self.ask_price.is_zero() && !self.bid_price.is_zero()
    }
}

/// Top-of-book for one asset across its two markets.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairLevels {
    /// The asset's fiat-quoted pair (e.g. KRW-XRP).
    pub fiat: OrderBookLevel,
    /// The asset's bridge-quoted pair (e.g. BTC-XRP).
    pub bridge: OrderBookLevel,
}

impl PairLevels {
    pub fn market(&self, market: Market) -> &OrderBookLevel {
        match market {
            Market::Fiat => &self.fiat,
            Market::Bridge => &self.bridge,
        }
    }
}

/// A point-in-time view of top-of-book across all scanned assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub captured_at: DateTime<Utc>,
    pub levels: HashMap<String, PairLevels>,
}

impl OrderBookSnapshot {
    pub fn new(levels: HashMap<String, PairLevels>) -> Self {
        Self {
            captured_at: Utc::now(),
            levels,
        }
    }

    pub fn asset(&self, asset: &str) -> Option<&PairLevels> {
        self.levels.get(asset)
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Balance of one currency: spendable funds plus funds locked behind
/// resting orders.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub locked: Decimal,
}

/// Point-in-time wallet state across all currencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub captured_at: DateTime<Utc>,
    pub balances: HashMap<String, Balance>,
}

impl WalletSnapshot {
    pub fn new(balances: HashMap<String, Balance>) -> Self {
        Self {
            captured_at: Utc::now(),
            balances,
        }
    }

    /// Balance for a currency; absent currencies read as zero.
    pub fn balance(&self, currency: &str) -> Balance {
        self.balances.get(currency).copied().unwrap_or_default()
    }

    pub fn available(&self, currency: &str) -> Decimal {
        self.balance(currency).available
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Lifecycle state of an order on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Open,
    PartiallyFilled,
    Done,
    Cancelled,
}

impl OrderState {
    /// Terminal states accept no further fills.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Done | OrderState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Limit,
}

/// A new-order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: Market,
    /// Base asset code (e.g. "XRP", or the bridge asset code for the
    /// square-up leg).
    pub asset: String,
    pub side: Side,
    /// Volume in base-asset units.
    pub volume: Decimal,
    pub price: Decimal,
    pub kind: OrderKind,
}

/// An order as reported by the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub market: Market,
    pub asset: String,
    pub side: Side,
    pub requested_volume: Decimal,
    pub requested_price: Decimal,
    pub executed_volume: Decimal,
    pub remaining_volume: Decimal,
    pub state: OrderState,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.remaining_volume.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Cycle topologies
// ---------------------------------------------------------------------------

/// One leg of a cycle: which market it trades in, which side it takes,
/// and which side of the book it prices off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub market: Market,
    pub side: Side,
    pub price_source: PriceSource,
}

/// Identifier for the two triangular cycle directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyId {
    /// Enter through the bridge market, exit through the fiat market,
    /// square up by buying back the bridge asset.
    BridgeEntry,
    /// Enter through the fiat market, exit through the bridge market,
    /// square up by selling the acquired bridge asset.
    FiatEntry,
}

impl TopologyId {
    /// Stable numeric tag used in logs and audit records.
    pub fn number(&self) -> u8 {
        match self {
            TopologyId::BridgeEntry => 1,
            TopologyId::FiatEntry => 2,
        }
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyId::BridgeEntry => write!(f, "bridge-entry"),
            TopologyId::FiatEntry => write!(f, "fiat-entry"),
        }
    }
}

/// A three-leg cycle: entry (acquire the asset), exit (dispose of it in the
/// other market), square-up (restore the bridge-asset position in the fiat
/// market).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub id: TopologyId,
    pub legs: [Leg; 3],
}

impl Topology {
    pub const BRIDGE_ENTRY: Topology = Topology {
        id: TopologyId::BridgeEntry,
        legs: [
            Leg {
                market: Market::Bridge,
                side: Side::Bid,
                price_source: PriceSource::Ask,
            },
            Leg {
                market: Market::Fiat,
                side: Side::Ask,
                price_source: PriceSource::Bid,
            },
            Leg {
                market: Market::Fiat,
                side: Side::Bid,
                price_source: PriceSource::Ask,
            },
        ],
    };

    pub const FIAT_ENTRY: Topology = Topology {
        id: TopologyId::FiatEntry,
        legs: [
            Leg {
                market: Market::Fiat,
                side: Side::Bid,
                price_source: PriceSource::Ask,
            },
            Leg {
                market: Market::Bridge,
                side: Side::Ask,
                price_source: PriceSource::Bid,
            },
            Leg {
                market: Market::Fiat,
                side: Side::Ask,
                price_source: PriceSource::Bid,
            },
        ],
    };

    /// Both cycle directions, evaluated and ranked per asset.
    pub const ALL: [&'static Topology; 2] = [&Self::BRIDGE_ENTRY, &Self::FIAT_ENTRY];

    pub fn entry(&self) -> &Leg {
        &self.legs[0]
    }

    pub fn exit(&self) -> &Leg {
        &self.legs[1]
    }

    pub fn square_up(&self) -> &Leg {
        &self.legs[2]
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// Outcome of one settled order within a cycle, keyed by leg index (1–3).
/// A leg that needed several placements contributes several outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegOutcome {
    pub leg: u8,
    pub market: Market,
    pub side: Side,
    pub price: Decimal,
    pub requested_volume: Decimal,
    pub executed_volume: Decimal,
    pub state: OrderState,
}

/// Full record of one executed (or attempted) cycle, handed to the audit
/// sink after reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleExecutionRecord {
    pub asset: String,
    pub topology: TopologyId,
    /// The evaluated cycle return that triggered execution.
    pub expected_return: Decimal,
    /// Committed volume in bridge-asset units.
    pub sized_volume: Decimal,
    pub legs: Vec<LegOutcome>,
    /// Measured fiat-balance change over the cycle. Zero until reconciled.
    pub realized_fiat_delta: Decimal,
    /// Measured bridge-balance change over the cycle. Zero until reconciled.
    pub realized_bridge_delta: Decimal,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CycleExecutionRecord {
    pub fn new(
        asset: &str,
        topology: TopologyId,
        expected_return: Decimal,
        sized_volume: Decimal,
    ) -> Self {
        Self {
            asset: asset.to_string(),
            topology,
            expected_return,
            sized_volume,
            legs: Vec::new(),
            realized_fiat_delta: Decimal::ZERO,
            realized_bridge_delta: Decimal::ZERO,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn push_leg(&mut self, leg: u8, order: &Order) {
        self.legs.push(LegOutcome {
            leg,
            market: order.market,
            side: order.side,
            price: order.requested_price,
            requested_volume: order.requested_volume,
            executed_volume: order.executed_volume,
            state: order.state,
        });
    }

    pub fn finish(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    /// Total volume executed on a given leg across all its placements.
    pub fn executed_on_leg(&self, leg: u8) -> Decimal {
        self.legs
            .iter()
            .filter(|l| l.leg == leg)
            .map(|l| l.executed_volume)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(ask: Decimal, bid: Decimal) -> OrderBookLevel {
        OrderBookLevel {
            ask_price: ask,
            bid_price: bid,
            ask_size: dec!(1),
            bid_size: dec!(1),
        }
    }

    #[test]
    fn test_bridge_entry_leg_tables() {
        let t = Topology::BRIDGE_ENTRY;
        assert_eq!(t.entry().market, Market::Bridge);
        assert_eq!(t.entry().side, Side::Bid);
        assert_eq!(t.entry().price_source, PriceSource::Ask);
        assert_eq!(t.exit().market, Market::Fiat);
        assert_eq!(t.exit().side, Side::Ask);
        assert_eq!(t.exit().price_source, PriceSource::Bid);
        assert_eq!(t.square_up().market, Market::Fiat);
        assert_eq!(t.square_up().side, Side::Bid);
        assert_eq!(t.square_up().price_source, PriceSource::Ask);
    }

    #[test]
    fn test_fiat_entry_leg_tables() {
        let t = Topology::FIAT_ENTRY;
        assert_eq!(t.entry().market, Market::Fiat);
        assert_eq!(t.entry().side, Side::Bid);
        assert_eq!(t.entry().price_source, PriceSource::Ask);
        assert_eq!(t.exit().market, Market::Bridge);
        assert_eq!(t.exit().side, Side::Ask);
        assert_eq!(t.exit().price_source, PriceSource::Bid);
        assert_eq!(t.square_up().market, Market::Fiat);
        assert_eq!(t.square_up().side, Side::Ask);
        assert_eq!(t.square_up().price_source, PriceSource::Bid);
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderState::Done.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
        assert!(!OrderState::Open.is_terminal());
        assert!(!OrderState::PartiallyFilled.is_terminal());
    }

    #[test]
    fn test_pair_levels_lookup() {
        let pair = PairLevels {
            fiat: level(dec!(101), dec!(100)),
            bridge: level(dec!(0.002), dec!(0.0019)),
        };
        assert_eq!(pair.market(Market::Fiat).ask_price, dec!(101));
        assert_eq!(
            pair.market(Market::Bridge).price(PriceSource::Bid),
            dec!(0.0019)
        );
    }

    #[test]
    fn test_wallet_missing_currency_reads_zero() {
        let wallet = WalletSnapshot::new(HashMap::new());
        assert_eq!(wallet.available("KRW"), Decimal::ZERO);
        assert_eq!(wallet.balance("BTC").locked, Decimal::ZERO);
    }

    #[test]
    fn test_record_leg_accumulation() {
        let mut rec =
            CycleExecutionRecord::new("XRP", TopologyId::FiatEntry, dec!(1.01), dec!(0.5));
        let order = Order {
            id: "a".into(),
            market: Market::Bridge,
            asset: "XRP".into(),
            side: Side::Ask,
            requested_volume: dec!(100),
            requested_price: dec!(0.002),
            executed_volume: dec!(40),
            remaining_volume: dec!(60),
            state: OrderState::Cancelled,
        };
        rec.push_leg(2, &order);
        let order2 = Order {
            executed_volume: dec!(60),
            remaining_volume: dec!(0),
            state: OrderState::Done,
            ..order
        };
        rec.push_leg(2, &order2);
        assert_eq!(rec.executed_on_leg(2), dec!(100));
        assert_eq!(rec.executed_on_leg(1), Decimal::ZERO);
    }
}
