//! Trailing-stop ratchet
//!
//! Chained after break-even: once price is past the break-even reference
//! (entry ± trigger), the stop follows it at `trailing_stop_pips`. A candidate
//! is applied only when it tightens the current stop and sits beyond the
//! reference itself, so the trailing stop is never looser than the
//! break-even floor.

use crate::config::RiskParameters;
use crate::price::normalize;
use crate::types::{InstrumentSnapshot, Position};

/// Break-even reference level the trailing stop is chained after
pub fn reference_level(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> f64 {
    let raw = position.entry_price
        + position.side.sign() * instrument.pips(params.break_even_trigger_pips);
    normalize(raw, position.side, instrument)
}

/// Stop `trailing_stop_pips` behind the current exit price
pub fn candidate_stop(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> f64 {
    let price = position.side.exit_price(instrument);
    let raw = price - position.side.sign() * instrument.pips(params.trailing_stop_pips);
    normalize(raw, position.side, instrument)
}

/// New trailing stop to apply, if any
pub fn proposed_stop(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> Option<f64> {
    let side = position.side;
    let epsilon = instrument.half_tick();
    let reference = reference_level(position, instrument, params);

    if !side.is_beyond(side.exit_price(instrument), reference, epsilon) {
        return None;
    }

    let candidate = candidate_stop(position, instrument, params);
    let tightens = position
        .stop_loss
        .map_or(true, |current| side.is_beyond(candidate, current, epsilon));
    let clears_reference = side.is_beyond(candidate, reference, 0.0);

    (tightens && clears_reference).then_some(candidate)
}
