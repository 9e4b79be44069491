//! Accountant — realized-delta reconciliation and lifetime P&L.
//!
//! Profit is what the wallet says it is: each cycle is reconciled from
//! before/after wallet snapshots, never from nominal order volumes.
//! Deltas wildly outside the plausibility band indicate an accounting
//! error (a foreign deposit, a missed fill, a venue glitch) and are kept
//! out of the audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::types::{CycleExecutionRecord, WalletSnapshot};

// ---------------------------------------------------------------------------
// Cycle summary
// ---------------------------------------------------------------------------

/// Reconciled result of one cycle plus running totals since startup.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    /// Fiat-balance change over this cycle.
    pub fiat_delta: Decimal,
    /// Bridge-balance change over this cycle.
    pub bridge_delta: Decimal,
    /// The bridge delta valued in fiat at the current bridge bid.
    pub bridge_delta_fiat: Decimal,
    /// Fiat-balance change since startup.
    pub lifetime_fiat: Decimal,
    /// Bridge-balance change since startup, valued in fiat.
    pub lifetime_bridge_fiat: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Realized deltas (in fiat terms) outside this band are treated as
/// accounting errors rather than trading results.
#[derive(Debug, Clone, Deserialize)]
pub struct PlausibilityBand {
    pub minimum: Decimal,
    pub maximum: Decimal,
}

impl PlausibilityBand {
    fn contains(&self, value: Decimal) -> bool {
        self.minimum < value && value < self.maximum
    }
}

// ---------------------------------------------------------------------------
// Accountant
// ---------------------------------------------------------------------------

pub struct Accountant {
    fiat_currency: String,
    bridge_currency: String,
    /// Wallet captured at startup; anchors lifetime totals.
    initial: WalletSnapshot,
    band: PlausibilityBand,
}

impl Accountant {
    pub fn new(
        fiat_currency: &str,
        bridge_currency: &str,
        initial: WalletSnapshot,
        band: PlausibilityBand,
    ) -> Self {
        Self {
            fiat_currency: fiat_currency.to_string(),
            bridge_currency: bridge_currency.to_string(),
            initial,
            band,
        }
    }

    /// Reconcile one cycle from wallet snapshots and stamp the measured
    /// deltas into the execution record.
    pub fn reconcile(
        &self,
        before: &WalletSnapshot,
        after: &WalletSnapshot,
        bridge_bid: Decimal,
        record: &mut CycleExecutionRecord,
    ) -> CycleSummary {
        let fiat_delta =
            after.available(&self.fiat_currency) - before.available(&self.fiat_currency);
        let bridge_delta =
            after.available(&self.bridge_currency) - before.available(&self.bridge_currency);
        record.realized_fiat_delta = fiat_delta;
        record.realized_bridge_delta = bridge_delta;

        let lifetime_fiat =
            after.available(&self.fiat_currency) - self.initial.available(&self.fiat_currency);
        let lifetime_bridge = after.available(&self.bridge_currency)
            - self.initial.available(&self.bridge_currency);

        let summary = CycleSummary {
            fiat_delta,
            bridge_delta,
            bridge_delta_fiat: bridge_delta * bridge_bid,
            lifetime_fiat,
            lifetime_bridge_fiat: lifetime_bridge * bridge_bid,
            timestamp: Utc::now(),
        };

        info!(
            asset = %record.asset,
            topology = record.topology.number(),
            fiat_delta = %summary.fiat_delta,
            bridge_delta = %summary.bridge_delta,
            bridge_delta_fiat = %summary.bridge_delta_fiat,
            lifetime_fiat = %summary.lifetime_fiat,
            lifetime_bridge_fiat = %summary.lifetime_bridge_fiat,
            "cycle reconciled"
        );

        summary
    }

    /// Whether the reconciled deltas look like a trading result.
    pub fn plausible(&self, summary: &CycleSummary) -> bool {
        let ok = self.band.contains(summary.fiat_delta)
            && self.band.contains(summary.bridge_delta_fiat);
        if !ok {
            warn!(
                fiat_delta = %summary.fiat_delta,
                bridge_delta_fiat = %summary.bridge_delta_fiat,
                band_min = %self.band.minimum,
                band_max = %self.band.maximum,
                "reconciled deltas outside the plausibility band"
            );
        }
        ok
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
