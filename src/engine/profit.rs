//! Cycle return evaluation and entry gates.
//!
//! A cycle return is the multiplicative round-trip factor on the committed
//! bridge-asset position: start with 1 unit of value, buy the asset on the
//! entry leg, sell it on the exit leg, and translate back through the
//! bridge rate. Returns above 1.0 (after fees) are profitable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::types::{Market, OrderBookLevel, PairLevels, Topology, TopologyId};

/// Combined taker-fee factor applied to every evaluated cycle return:
/// the precomputed product of the per-leg fee multipliers across all
/// three legs of a cycle.
pub const COMBINED_FEE_FACTOR: Decimal = dec!(0.996502749375);

/// Per-side fee rate in the fiat-quoted markets.
const FIAT_FEE_RATE: Decimal = dec!(0.0005);
/// Per-side fee rate in the bridge-quoted markets.
const BRIDGE_FEE_RATE: Decimal = dec!(0.0025);

/// Evaluate the fee-adjusted return of one cycle for one asset.
///
/// `None` means the inputs cannot price the cycle (a zero on a divisor
/// path); callers skip the asset rather than treat it as unprofitable.
pub fn evaluate(
    levels: &PairLevels,
    topology: &Topology,
    bridge: OrderBookLevel,
) -> Option<Decimal> {
    let entry_leg = topology.entry();
    let exit_leg = topology.exit();
    let entry = levels.market(entry_leg.market).price(entry_leg.price_source);
    let exit = levels.market(exit_leg.market).price(exit_leg.price_source);

    let raw = match topology.id {
        TopologyId::BridgeEntry => {
            if entry.is_zero() || bridge.ask_price.is_zero() {
                return None;
            }
            (Decimal::ONE / entry) * exit / bridge.ask_price
        }
        TopologyId::FiatEntry => {
            if entry.is_zero() {
                return None;
            }
            (Decimal::ONE / entry) * exit * bridge.bid_price
        }
    };
    Some(raw * COMBINED_FEE_FACTOR)
}

/// Fee-adjusted return of reselling entry-leg inventory back into the
/// entry market, per unit bought at `entry_price` and resold at
/// `resell_price`. Used by the exit leg's continue-vs-unwind decision.
pub fn resell_return(entry_price: Decimal, resell_price: Decimal, entry_market: Market) -> Decimal {
    if entry_price.is_zero() {
        return Decimal::ZERO;
    }
    let fee = match entry_market {
        Market::Fiat => FIAT_FEE_RATE,
        Market::Bridge => BRIDGE_FEE_RATE,
    };
    (resell_price * (Decimal::ONE - fee)) / (entry_price * (Decimal::ONE + fee))
}

// ---------------------------------------------------------------------------
// Entry gates
// ---------------------------------------------------------------------------

/// Which historical snapshot the momentum gate compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumBaseline {
    /// Oldest snapshot in the history window.
    Oldest,
    /// The snapshot immediately before the newest.
    Previous,
}

/// Momentum gate: the exit-leg price must be strictly higher now than in
/// the baseline snapshot. An equal or falling price fails the gate.
pub fn momentum_ok(baseline: &PairLevels, current: &PairLevels, topology: &Topology) -> bool {
    let leg = topology.exit();
    current.market(leg.market).price(leg.price_source)
        > baseline.market(leg.market).price(leg.price_source)
}

/// Spread gate on the entry pair: ask/bid must not exceed `max_ratio`.
/// A one-sided book fails the gate.
pub fn spread_ok(entry: &OrderBookLevel, max_ratio: Decimal) -> bool {
    if entry.bid_price.is_zero() {
        return false;
    }
    entry.ask_price / entry.bid_price <= max_ratio
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
