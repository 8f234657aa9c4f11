//! Global drawdown breaker
//!
//! One-way latch on cumulative realized loss. Once tripped it stays tripped
//! for the lifetime of the engine; when the book is flat afterwards the
//! engine halts exactly once.

use std::fmt;

/// Breaker state after an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Armed,
    Tripped,
    /// Tripped and flat; returned once
    Halt,
    /// Already halted, nothing left to do
    Halted,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Armed => write!(f, "armed"),
            BreakerState::Tripped => write!(f, "tripped"),
            BreakerState::Halt => write!(f, "halt"),
            BreakerState::Halted => write!(f, "halted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DrawdownBreaker {
    max_loss: f64,
    tripped: bool,
    halted: bool,
    last_pnl: f64,
}

const CENT_EPSILON: f64 = 1e-6;

/// Floor to whole cents, ignoring float noise just below a cent boundary
pub fn floor_cents(value: f64) -> f64 {
    (value * 100.0 + CENT_EPSILON).floor() / 100.0
}

impl DrawdownBreaker {
    /// `max_loss` of 0 disables the breaker
    pub fn new(max_loss: f64) -> Self {
        Self {
            max_loss,
            tripped: false,
            halted: false,
            last_pnl: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_loss > 0.0
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Realized P/L seen on the last update, floored to cents
    pub fn last_pnl(&self) -> f64 {
        self.last_pnl
    }

    pub fn max_loss(&self) -> f64 {
        self.max_loss
    }

    /// Feed the cumulative realized P/L and the number of open positions
    pub fn update(&mut self, realized_pnl: f64, open_positions: usize) -> BreakerState {
        if self.halted {
            return BreakerState::Halted;
        }

        self.last_pnl = floor_cents(realized_pnl);
        if !self.tripped && self.is_enabled() && self.last_pnl <= -self.max_loss {
            self.tripped = true;
        }

        if !self.tripped {
            return BreakerState::Armed;
        }
        if open_positions == 0 {
            self.halted = true;
            BreakerState::Halt
        } else {
            BreakerState::Tripped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_ceiling() {
        let mut breaker = DrawdownBreaker::new(200.0);
        assert_eq!(breaker.update(-199.99, 1), BreakerState::Armed);
        assert_eq!(breaker.update(-200.0, 1), BreakerState::Tripped);
        assert!(breaker.is_tripped());
    }

    #[test]
    fn floors_to_cents_before_comparing() {
        // -199.991 floors to -200.00
        let mut breaker = DrawdownBreaker::new(200.0);
        assert_eq!(breaker.update(-199.991, 2), BreakerState::Tripped);
        assert_eq!(breaker.last_pnl(), -200.0);
    }

    #[test]
    fn cent_noise_does_not_cost_a_cent() {
        assert_eq!(floor_cents(-180.000_000_000_2), -180.0);
        assert_eq!(floor_cents(12.349), 12.34);
    }

    #[test]
    fn latch_is_one_way() {
        let mut breaker = DrawdownBreaker::new(100.0);
        breaker.update(-150.0, 1);
        assert_eq!(breaker.update(50.0, 1), BreakerState::Tripped);
    }

    #[test]
    fn halts_exactly_once_when_flat() {
        let mut breaker = DrawdownBreaker::new(100.0);
        assert_eq!(breaker.update(-120.0, 2), BreakerState::Tripped);
        assert_eq!(breaker.update(-130.0, 0), BreakerState::Halt);
        assert_eq!(breaker.update(-130.0, 0), BreakerState::Halted);
        assert_eq!(breaker.update(-130.0, 0), BreakerState::Halted);
        assert!(breaker.is_halted());
    }

    #[test]
    fn zero_ceiling_disables() {
        let mut breaker = DrawdownBreaker::new(0.0);
        assert!(!breaker.is_enabled());
        assert_eq!(breaker.update(-1_000_000.0, 0), BreakerState::Armed);
    }
}
