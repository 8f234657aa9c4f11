//! PipGuard Library
//!
//! Per-tick risk management for an automated FX trading agent: initial
//! SL/TP assignment, break-even, trailing stops, spread gating, session
//! boundary closes and a drawdown breaker, plus a paper host to replay quotes.

pub mod config;
pub mod host;
pub mod logging;
pub mod paper;
pub mod price;
pub mod risk;
pub mod status;
pub mod types;
