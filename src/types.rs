//! Core types used throughout PipGuard
//!
//! Defines the instrument snapshot, positions, account state and the
//! side-aware price helpers every risk component leans on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-assigned position identity
pub type PositionId = i64;

/// Trading side of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "buy", alias = "Long", alias = "BUY")]
    Long,
    #[serde(alias = "sell", alias = "Short", alias = "SELL")]
    Short,
}

impl Default for Side {
    fn default() -> Self {
        Side::Long
    }
}

impl Side {
    /// +1 for longs, -1 for shorts. Multiplies a favorable offset.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Price at which this side exits: bid for longs, ask for shorts
    pub fn exit_price(&self, instrument: &InstrumentSnapshot) -> f64 {
        match self {
            Side::Long => instrument.bid,
            Side::Short => instrument.ask,
        }
    }

    /// Price at which this side enters: ask for longs, bid for shorts
    pub fn entry_price(&self, instrument: &InstrumentSnapshot) -> f64 {
        match self {
            Side::Long => instrument.ask,
            Side::Short => instrument.bid,
        }
    }

    /// `true` when `candidate` sits more than `epsilon` on the profitable side of `reference`
    /// (above it for longs, below it for shorts).
    pub fn is_beyond(&self, candidate: f64, reference: f64, epsilon: f64) -> bool {
        match self {
            Side::Long => candidate > reference + epsilon,
            Side::Short => candidate < reference - epsilon,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Point-in-time view of the managed instrument.
///
/// Read fresh from the host every tick; nothing downstream keeps one across ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    /// Symbol name (e.g., "EURUSD")
    pub symbol: String,
    /// Smallest price increment the venue accepts
    pub tick_size: f64,
    /// Standard pip increment, unit of every configured distance
    pub pip_size: f64,
    /// Decimal precision of quoted prices
    pub digits: u32,
    /// Best bid
    pub bid: f64,
    /// Best ask
    pub ask: f64,
    /// Account-currency value of one pip for one lot
    pub pip_value: f64,
}

impl InstrumentSnapshot {
    /// Half a tick, the hysteresis band for stop adjustments
    pub fn half_tick(&self) -> f64 {
        self.tick_size / 2.0
    }

    /// Convert a pip distance to a price distance
    pub fn pips(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }

    /// Whether the snapshot can be used for tick/pip arithmetic at all
    pub fn is_usable(&self) -> bool {
        self.tick_size > 0.0
            && self.pip_size > 0.0
            && self.bid.is_finite()
            && self.ask.is_finite()
    }
}

/// An open position as reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Net unrealized profit in account currency
    pub net_profit: f64,
    /// Volume in lots
    pub volume: f64,
}

impl Position {
    /// Favorable excursion from entry at the current exit price
    pub fn favorable_excursion(&self, instrument: &InstrumentSnapshot) -> f64 {
        match self.side {
            Side::Long => instrument.bid - self.entry_price,
            Side::Short => self.entry_price - instrument.ask,
        }
    }
}

/// Account figures the drawdown breaker and sizing read
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: f64,
    pub equity: f64,
    /// Sum of net profit over closed history
    pub realized_pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn side_picks_exit_and_entry_quotes() {
        let inst = eurusd(1.1000, 1.1002);
        assert_eq!(Side::Long.exit_price(&inst), 1.1000);
        assert_eq!(Side::Short.exit_price(&inst), 1.1002);
        assert_eq!(Side::Long.entry_price(&inst), 1.1002);
        assert_eq!(Side::Short.entry_price(&inst), 1.1000);
    }

    #[test]
    fn is_beyond_respects_side_and_epsilon() {
        assert!(Side::Long.is_beyond(1.1002, 1.1000, 0.00005));
        assert!(!Side::Long.is_beyond(1.10004, 1.1000, 0.00005));
        assert!(Side::Short.is_beyond(1.0998, 1.1000, 0.00005));
        assert!(!Side::Short.is_beyond(1.1001, 1.1000, 0.00005));
    }

    #[test]
    fn side_accepts_broker_labels() {
        let side: Side = serde_json::from_str("\"buy\"").unwrap();
        assert_eq!(side, Side::Long);
        let side: Side = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(side, Side::Short);
        assert_eq!(serde_json::to_string(&Side::Short).unwrap(), "\"short\"");
    }

    #[test]
    fn excursion_uses_bid_for_longs_and_ask_for_shorts() {
        let inst = eurusd(1.1004, 1.1006);
        let long = Position {
            id: 1,
            side: Side::Long,
            entry_price: 1.1000,
            stop_loss: None,
            take_profit: None,
            net_profit: 0.0,
            volume: 1.0,
        };
        let short = Position {
            side: Side::Short,
            entry_price: 1.1010,
            ..long.clone()
        };
        assert!((long.favorable_excursion(&inst) - 0.0004).abs() < 1e-12);
        assert!((short.favorable_excursion(&inst) - 0.0004).abs() < 1e-12);
    }
}
