//! Price normalization onto the instrument's tradable tick grid
//!
//! Longs round down, shorts round up, so a normalized stop or target is never
//! more optimistic than the raw computed level.

use crate::types::{InstrumentSnapshot, Side};

/// Quotients this close to an integer tick count are treated as on-grid.
pub(crate) const GRID_EPSILON: f64 = 1e-6;

/// Round `value` to `digits` decimal places.
pub fn round_to_digits(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Snap `price` to the tick grid of `instrument`, direction-aware.
///
/// Falls back to digit rounding alone when the tick size is unusable.
pub fn normalize(price: f64, side: Side, instrument: &InstrumentSnapshot) -> f64 {
    normalize_to(price, side, instrument.tick_size, instrument.digits)
}

/// [`normalize`] against explicit grid parameters.
pub fn normalize_to(price: f64, side: Side, tick_size: f64, digits: u32) -> f64 {
    if !(tick_size > 0.0) || !price.is_finite() {
        return round_to_digits(price, digits);
    }

    let ratio = price / tick_size;
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() < GRID_EPSILON {
        nearest
    } else {
        match side {
            Side::Long => ratio.floor(),
            Side::Short => ratio.ceil(),
        }
    };

    round_to_digits(steps * tick_size, digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eurusd() -> InstrumentSnapshot {
        InstrumentSnapshot {
            symbol: "EURUSD".to_string(),
            tick_size: 0.00001,
            pip_size: 0.0001,
            digits: 5,
            bid: 1.1,
            ask: 1.1,
            pip_value: 10.0,
        }
    }

    #[test]
    fn long_floors_and_short_ceils() {
        let inst = eurusd();
        assert_eq!(normalize(1.123456, Side::Long, &inst), 1.12345);
        assert_eq!(normalize(1.123456, Side::Short, &inst), 1.12346);
    }

    #[test]
    fn on_grid_prices_survive_float_noise() {
        let inst = eurusd();
        // computed levels carry float noise off the exact grid point
        let raw = 1.1000 - 50.0 * 0.0001;
        assert_eq!(normalize(raw, Side::Long, &inst), 1.095);
        assert_eq!(normalize(raw, Side::Short, &inst), 1.095);
        assert_eq!(normalize(1.0950, Side::Long, &inst), 1.095);
    }

    #[test]
    fn coarse_tick_grid() {
        // index-style instrument quoted to 2 digits with 0.25 ticks
        assert_eq!(normalize_to(4501.13, Side::Long, 0.25, 2), 4501.0);
        assert_eq!(normalize_to(4501.13, Side::Short, 0.25, 2), 4501.25);
    }

    #[test]
    fn unusable_tick_size_only_rounds_digits() {
        assert_eq!(normalize_to(1.234567, Side::Long, 0.0, 3), 1.235);
    }

    proptest! {
        #[test]
        fn long_never_above_and_short_never_below(
            price in 0.5f64..5000.0,
            digits in 2u32..=5,
        ) {
            let tick = 10f64.powi(-(digits as i32));
            let long = normalize_to(price, Side::Long, tick, digits);
            let short = normalize_to(price, Side::Short, tick, digits);
            // snapping may move a near-grid price by up to GRID_EPSILON ticks
            let slack = tick * GRID_EPSILON + 1e-9;

            prop_assert!(long <= price + slack);
            prop_assert!(short >= price - slack);
            prop_assert!(short - long <= tick + slack);

            for snapped in [long, short] {
                let steps = snapped / tick;
                prop_assert!((steps - steps.round()).abs() < 1e-6);
            }
        }
    }
}
