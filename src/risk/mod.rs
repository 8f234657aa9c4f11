//! Risk management
//!
//! Per-tick components, leaves first:
//! - Spread gate (advisory)
//! - Position ledger (processed-once set)
//! - SL/TP convergence for newly seen positions
//! - Break-even migration
//! - Trailing stop
//! - Session boundary closer
//! - Drawdown breaker
//!
//! [`RiskEngine`] runs them in that order against a [`crate::host::TradingHost`].

pub mod break_even;
pub mod convergence;
pub mod drawdown;
pub mod engine;
pub mod ledger;
pub mod session;
pub mod sizing;
pub mod spread;
pub mod trailing;

pub use convergence::{ConvergenceDecision, ConvergencePlan, ExpectedLevels};
pub use drawdown::{BreakerState, DrawdownBreaker};
pub use engine::{EngineSettings, EntryBlock, EntryPermit, RiskEngine, TickReport};
pub use ledger::PositionLedger;
pub use session::{Boundary, SessionBlock, SessionCloser};
pub use sizing::SizingError;
pub use spread::SpreadReading;
