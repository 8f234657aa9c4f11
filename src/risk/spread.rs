//! Spread gate: current spread in pips against the configured ceiling

use std::fmt;

use crate::price::normalize;
use crate::types::{InstrumentSnapshot, Side};

/// Classification of the current spread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpreadReading {
    Acceptable(f64),
    Excessive(f64),
    /// Pip size or quotes unusable
    Unknown,
}

impl SpreadReading {
    pub fn pips(&self) -> Option<f64> {
        match self {
            SpreadReading::Acceptable(p) | SpreadReading::Excessive(p) => Some(*p),
            SpreadReading::Unknown => None,
        }
    }

    pub fn is_acceptable(&self) -> bool {
        matches!(self, SpreadReading::Acceptable(_))
    }
}

impl fmt::Display for SpreadReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadReading::Acceptable(p) => write!(f, "{:.2}", p),
            SpreadReading::Excessive(p) => write!(f, "{:.2}!", p),
            SpreadReading::Unknown => write!(f, "?"),
        }
    }
}

/// Spread in pips, snapped to the tick grid with long-side rounding
pub fn spread_pips(instrument: &InstrumentSnapshot) -> Option<f64> {
    if !instrument.is_usable() {
        return None;
    }
    let raw = (instrument.ask - instrument.bid) / instrument.pip_size;
    raw.is_finite().then(|| normalize(raw, Side::Long, instrument))
}

pub fn classify(instrument: &InstrumentSnapshot, max_spread_pips: f64) -> SpreadReading {
    match spread_pips(instrument) {
        Some(pips) if pips > max_spread_pips => SpreadReading::Excessive(pips),
        Some(pips) => SpreadReading::Acceptable(pips),
        None => SpreadReading::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: f64, ask: f64) -> InstrumentSnapshot {
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

    #[test]
    fn spread_in_pips() {
        let pips = spread_pips(&quote(1.10000, 1.10004)).unwrap();
        assert!((pips - 0.4).abs() < 1e-9);
    }

    #[test]
    fn classification_against_ceiling() {
        assert!(classify(&quote(1.10000, 1.10004), 0.4).is_acceptable());
        assert_eq!(
            classify(&quote(1.10000, 1.10007), 0.4).pips().map(|p| (p * 10.0).round()),
            Some(7.0)
        );
        assert!(matches!(
            classify(&quote(1.10000, 1.10007), 0.4),
            SpreadReading::Excessive(_)
        ));
    }

    #[test]
    fn zero_pip_size_is_unknown() {
        let mut inst = quote(1.1, 1.1001);
        inst.pip_size = 0.0;
        assert_eq!(classify(&inst, 0.4), SpreadReading::Unknown);
        assert_eq!(SpreadReading::Unknown.to_string(), "?");
    }

    #[test]
    fn excessive_is_flagged_in_display() {
        assert_eq!(SpreadReading::Excessive(0.7).to_string(), "0.70!");
        assert_eq!(SpreadReading::Acceptable(0.2).to_string(), "0.20");
    }
}
