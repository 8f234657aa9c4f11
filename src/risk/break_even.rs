//! Break-even migration
//!
//! Once a position has run `break_even_trigger_pips` in its favor, its stop
//! moves to entry plus `break_even_margin_pips`. The target is derived from
//! the fixed entry and margin, so re-evaluating it every tick can only ever
//! confirm the same level.

use crate::config::RiskParameters;
use crate::price::{normalize, round_to_digits};
use crate::types::{InstrumentSnapshot, Position};

/// Favorable excursion rounded to quote precision
pub fn excursion(position: &Position, instrument: &InstrumentSnapshot) -> f64 {
    round_to_digits(position.favorable_excursion(instrument), instrument.digits)
}

/// Whether the break-even trigger distance has been reached
pub fn is_armed(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> bool {
    let trigger = round_to_digits(
        instrument.pips(params.break_even_trigger_pips),
        instrument.digits,
    );
    excursion(position, instrument) >= trigger
}

/// Entry shifted by the break-even margin, on the tick grid
pub fn break_even_level(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> f64 {
    let raw = position.entry_price
        + position.side.sign() * instrument.pips(params.break_even_margin_pips);
    normalize(raw, position.side, instrument)
}

/// New stop to apply, if break-even is armed and the level beats the current stop
pub fn proposed_stop(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> Option<f64> {
    if !is_armed(position, instrument, params) {
        return None;
    }

    let new_stop = break_even_level(position, instrument, params);
    let improves = position.stop_loss.map_or(true, |current| {
        position
            .side
            .is_beyond(new_stop, current, instrument.half_tick())
    });

    improves.then_some(new_stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn eurusd(bid: f64, ask: f64) -> InstrumentSnapshot {
        InstrumentSnapshot {
            symbol: "EURUSD".to_string(),
            tick_size: 0.00001,
            pip_size: 0.0001,
            digits: 5,
            bid,
            ask,
            pip_value: 10.0,
        }
    }

    fn params() -> RiskParameters {
        RiskParameters {
            break_even_trigger_pips: 3.0,
            break_even_margin_pips: 1.0,
            ..Default::default()
        }
    }

    fn long(stop: Option<f64>) -> Position {
        Position {
            id: 1,
            side: Side::Long,
            entry_price: 1.1000,
            stop_loss: stop,
            take_profit: None,
            net_profit: 0.0,
            volume: 1.0,
        }
    }

    #[test]
    fn not_armed_below_trigger() {
        assert_eq!(
            proposed_stop(&long(Some(1.0950)), &eurusd(1.10029, 1.10031), &params()),
            None
        );
    }

    #[test]
    fn armed_exactly_at_trigger() {
        assert!(is_armed(&long(None), &eurusd(1.1003, 1.1004), &params()));
    }

    #[test]
    fn moves_stop_to_entry_plus_margin() {
        assert_eq!(
            proposed_stop(&long(Some(1.0950)), &eurusd(1.1004, 1.1005), &params()),
            Some(1.1001)
        );
    }

    #[test]
    fn applies_when_no_stop_is_set() {
        assert_eq!(
            proposed_stop(&long(None), &eurusd(1.1004, 1.1005), &params()),
            Some(1.1001)
        );
    }

    #[test]
    fn holds_once_at_break_even() {
        for bid in [1.1003, 1.1004, 1.1005] {
            assert_eq!(
                proposed_stop(&long(Some(1.1001)), &eurusd(bid, bid + 0.0001), &params()),
                None
            );
        }
    }

    #[test]
    fn never_downgrades_a_tighter_stop() {
        assert_eq!(
            proposed_stop(&long(Some(1.1003)), &eurusd(1.1010, 1.1011), &params()),
            None
        );
    }

    #[test]
    fn short_uses_ask_and_moves_stop_below_entry() {
        let short = Position {
            side: Side::Short,
            stop_loss: Some(1.1050),
            ..long(None)
        };
        assert_eq!(
            proposed_stop(&short, &eurusd(1.0995, 1.0996), &params()),
            Some(1.0999)
        );
        // bid is far enough but ask is not
        assert_eq!(proposed_stop(&short, &eurusd(1.0996, 1.0998), &params()), None);
    }
}
