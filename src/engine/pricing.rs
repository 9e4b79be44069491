//! Fiat-market price normalization.
//!
//! The fiat quote currency trades on a banded tick grid: the allowed price
//! increment grows with the price. Every fiat-market order price is rounded
//! DOWN onto the grid before submission; bridge-market prices are submitted
//! as quoted.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tick size for a given fiat price.
pub fn fiat_tick(price: Decimal) -> Decimal {
    if price < dec!(10) {
        dec!(0.01)
    } else if price < dec!(100) {
        dec!(0.1)
    } else if price < dec!(1000) {
        dec!(1)
    } else if price < dec!(10000) {
        dec!(5)
    } else if price < dec!(100000) {
        dec!(10)
    } else if price < dec!(500000) {
        dec!(50)
    } else if price < dec!(1000000) {
        dec!(100)
    } else if price < dec!(2000000) {
        dec!(500)
    } else {
        dec!(1000)
    }
}

/// Round a fiat price down onto the tick grid. Idempotent: a price already
/// on the grid comes back unchanged.
pub fn round_to_fiat_tick(price: Decimal) -> Decimal {
    let tick = fiat_tick(price);
    price - price % tick
}

/// Walk an unwind price a quarter of the way toward the current bid:
/// `(3·previous + bid) / 4`. Repeated application converges on the bid
/// without chasing transient spikes.
pub fn damped_resell_price(previous: Decimal, current_bid: Decimal) -> Decimal {
    (dec!(3) * previous + current_bid) / dec!(4)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(fiat_tick(dec!(9.99)), dec!(0.01));
        assert_eq!(fiat_tick(dec!(10)), dec!(0.1));
        assert_eq!(fiat_tick(dec!(999)), dec!(1));
        assert_eq!(fiat_tick(dec!(1000)), dec!(5));
        assert_eq!(fiat_tick(dec!(99999)), dec!(10));
        assert_eq!(fiat_tick(dec!(100000)), dec!(50));
        assert_eq!(fiat_tick(dec!(2000000)), dec!(1000));
    }

    #[test]
    fn test_rounds_down_within_band() {
        // 12,345 lies in the [10,000, 100,000) band with a 10-unit tick.
        assert_eq!(round_to_fiat_tick(dec!(12345)), dec!(12340));
        assert_eq!(round_to_fiat_tick(dec!(1234)), dec!(1230));
        assert_eq!(round_to_fiat_tick(dec!(99.95)), dec!(99.9));
        assert_eq!(round_to_fiat_tick(dec!(3.456)), dec!(3.45));
        assert_eq!(round_to_fiat_tick(dec!(777777)), dec!(777700));
    }

    #[test]
    fn test_rounding_is_idempotent() {
        for raw in [
            dec!(0.07),
            dec!(9.99),
            dec!(12345),
            dec!(55.55),
            dec!(1234567),
            dec!(499999),
            dec!(650000),
        ] {
            let once = round_to_fiat_tick(raw);
            assert_eq!(round_to_fiat_tick(once), once, "not idempotent for {raw}");
            assert!(once <= raw);
        }
    }

    #[test]
    fn test_grid_prices_unchanged() {
        assert_eq!(round_to_fiat_tick(dec!(12340)), dec!(12340));
        assert_eq!(round_to_fiat_tick(dec!(100)), dec!(100));
        assert_eq!(round_to_fiat_tick(dec!(0.05)), dec!(0.05));
    }

    #[test]
    fn test_damped_resell_blend() {
        // Quarter-way toward the bid each step.
        assert_eq!(damped_resell_price(dec!(100), dec!(80)), dec!(95));
        assert_eq!(damped_resell_price(dec!(95), dec!(80)), dec!(91.25));
        // Converges on the bid.
        let mut p = dec!(100);
        for _ in 0..60 {
            p = damped_resell_price(p, dec!(80));
        }
        assert!((p - dec!(80)).abs() < dec!(0.001));
    }
}
