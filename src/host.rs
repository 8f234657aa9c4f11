//! Host seams: market/broker access and the session clock
//!
//! The engine never talks to a broker directly. Everything it reads or
//! changes goes through [`TradingHost`], and every time-of-day decision goes
//! through [`SessionClock`], so both can be replaced by synthetic hosts.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::types::{AccountState, InstrumentSnapshot, Position, PositionId};

/// Failure of an order-modification or close command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("broker rejected request for position {id}: {reason}")]
    Rejected { id: PositionId, reason: String },
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("unknown position {0}")]
    UnknownPosition(PositionId),
}

/// Market data, account and order commands for the managed instrument
#[cfg_attr(test, mockall::automock)]
pub trait TradingHost {
    /// Current instrument snapshot (quotes, tick/pip sizes, digits)
    fn instrument(&self) -> InstrumentSnapshot;

    /// Open positions on the managed instrument
    fn positions(&self) -> Vec<Position>;

    /// Account balance, equity and realized history
    fn account(&self) -> AccountState;

    fn modify_stop_loss(&mut self, id: PositionId, price: Option<f64>) -> Result<(), BrokerError>;

    fn modify_take_profit(&mut self, id: PositionId, price: Option<f64>)
        -> Result<(), BrokerError>;

    fn close_position(&mut self, id: PositionId) -> Result<(), BrokerError>;
}

/// Server clock and market-hours calendar
pub trait SessionClock {
    /// Current server time (UTC)
    fn now(&self) -> DateTime<Utc>;

    /// Time until the instrument's session closes, `None` when market-hours data is missing
    fn time_till_close(&self) -> Option<Duration>;

    /// Time since the instrument's session opened, `None` when unknown
    fn time_since_open(&self) -> Option<Duration>;
}

/// Clock pinned to a fixed instant, for tests and offline tooling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub till_close: Option<Duration>,
    pub since_open: Option<Duration>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            till_close: None,
            since_open: None,
        }
    }
}

impl SessionClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn time_till_close(&self) -> Option<Duration> {
        self.till_close
    }

    fn time_since_open(&self) -> Option<Duration> {
        self.since_open
    }
}
