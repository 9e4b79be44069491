//! Cycle volume sizing.
//!
//! Commitment is denominated in bridge-asset units and capped by the
//! thinner of the entry and exit top-of-book notionals, then scaled by a
//! safety fraction and clamped to the configured floor and ceiling.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::{OrderBookLevel, PairLevels, Topology, TopologyId};

/// Depth-capped optimal commitment for one cycle, in bridge-asset units.
///
/// `None` when the bridge rate cannot translate the fiat-side depth.
pub fn optimal_volume(
    levels: &PairLevels,
    topology: &Topology,
    bridge: OrderBookLevel,
) -> Option<Decimal> {
    match topology.id {
        TopologyId::BridgeEntry => {
            if bridge.ask_price.is_zero() {
                return None;
            }
            let entry_depth = levels.bridge.ask_price * levels.bridge.ask_size;
            let exit_depth = levels.fiat.bid_price * levels.fiat.bid_size / bridge.ask_price;
            Some(entry_depth.min(exit_depth))
        }
        TopologyId::FiatEntry => {
            let entry_depth = levels.fiat.ask_size * levels.bridge.bid_price;
            let exit_depth = levels.bridge.bid_size * levels.bridge.bid_price;
            Some(entry_depth.min(exit_depth))
        }
    }
}

/// Convert a bridge-denominated commitment into base-asset units at the
/// entry-relevant bridge-pair price.
pub fn to_asset_volume(
    levels: &PairLevels,
    topology: &Topology,
    bridge_volume: Decimal,
) -> Option<Decimal> {
    let price = match topology.id {
        TopologyId::BridgeEntry => levels.bridge.ask_price,
        TopologyId::FiatEntry => levels.bridge.bid_price,
    };
    if price.is_zero() {
        None
    } else {
        Some(bridge_volume / price)
    }
}

/// Safety-scaled, clamped order sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeSizer {
    /// Fraction of the optimal volume actually committed (typically 0.7–0.8).
    pub safety_fraction: Decimal,
    /// Floor in bridge-asset units; anything smaller is not worth a cycle.
    pub minimum: Decimal,
    /// Ceiling in bridge-asset units.
    pub maximum: Decimal,
}

impl VolumeSizer {
    /// Scale and clamp an optimal volume. `None` rejects the cycle as too
    /// small to execute.
    pub fn order_volume(&self, optimal: Decimal) -> Option<Decimal> {
        let scaled = optimal * self.safety_fraction;
        if scaled < self.minimum {
            None
        } else if scaled >= self.maximum {
            Some(self.maximum)
        } else {
            Some(scaled)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sizer() -> VolumeSizer {
        VolumeSizer {
            safety_fraction: dec!(0.8),
            minimum: dec!(0.1),
            maximum: dec!(0.6),
        }
    }

    fn level(ask_p: Decimal, bid_p: Decimal, ask_s: Decimal, bid_s: Decimal) -> OrderBookLevel {
        OrderBookLevel {
            ask_price: ask_p,
            bid_price: bid_p,
            ask_size: ask_s,
            bid_size: bid_s,
        }
    }

    #[test]
    fn test_safety_then_ceiling_clamp() {
        // Optimal 1.0 at safety 0.8 exceeds the 0.6 ceiling and is clamped.
        assert_eq!(sizer().order_volume(dec!(1.0)), Some(dec!(0.6)));
        // Mid-range passes through scaled.
        assert_eq!(sizer().order_volume(dec!(0.5)), Some(dec!(0.4)));
        // Below the floor after scaling is a rejection.
        assert_eq!(sizer().order_volume(dec!(0.1)), None);
    }

    #[test]
    fn test_bridge_entry_takes_thinner_side() {
        // Entry depth: 0.000002 * 300000 = 0.6 BTC.
        // Exit depth: 100 * 400000 / 50,000,000 = 0.8 BTC.
        let levels = PairLevels {
            fiat: level(dec!(101), dec!(100), dec!(1), dec!(400000)),
            bridge: level(dec!(0.000002), dec!(0.0000019), dec!(300000), dec!(1)),
        };
        let bridge = level(dec!(50000000), dec!(49000000), dec!(1), dec!(1));
        assert_eq!(
            optimal_volume(&levels, &Topology::BRIDGE_ENTRY, bridge),
            Some(dec!(0.6))
        );
        // Zero bridge ask cannot translate the exit depth.
        let zero = level(dec!(0), dec!(49000000), dec!(1), dec!(1));
        assert_eq!(optimal_volume(&levels, &Topology::BRIDGE_ENTRY, zero), None);
    }

    #[test]
    fn test_fiat_entry_takes_thinner_side() {
        // Entry depth: 200000 asset units * 0.0000019 = 0.38 BTC.
        // Exit depth: 500000 * 0.0000019 = 0.95 BTC.
        let levels = PairLevels {
            fiat: level(dec!(101), dec!(100), dec!(200000), dec!(1)),
            bridge: level(dec!(0.000002), dec!(0.0000019), dec!(1), dec!(500000)),
        };
        let bridge = level(dec!(50000000), dec!(49000000), dec!(1), dec!(1));
        assert_eq!(
            optimal_volume(&levels, &Topology::FIAT_ENTRY, bridge),
            Some(dec!(0.38))
        );
    }

    #[test]
    fn test_asset_unit_conversion_uses_entry_relevant_price() {
        let levels = PairLevels {
            fiat: level(dec!(101), dec!(100), dec!(1), dec!(1)),
            bridge: level(dec!(0.000002), dec!(0.0000016), dec!(1), dec!(1)),
        };
        assert_eq!(
            to_asset_volume(&levels, &Topology::BRIDGE_ENTRY, dec!(0.5)),
            Some(dec!(250000))
        );
        assert_eq!(
            to_asset_volume(&levels, &Topology::FIAT_ENTRY, dec!(0.4)),
            Some(dec!(250000))
        );
        let degenerate = PairLevels {
            fiat: levels.fiat,
            bridge: level(dec!(0), dec!(0), dec!(1), dec!(1)),
        };
        assert_eq!(
            to_asset_volume(&degenerate, &Topology::BRIDGE_ENTRY, dec!(0.5)),
            None
        );
    }
}
