//! SL/TP convergence: one-time initial stop-loss / take-profit assignment
//!
//! For a position seen for the first time, compute where its stop and target
//! should sit from the entry price, then either close it outright (price is
//! already through the stop) or send only the levels that are off by more
//! than a tick. A stop that is already tighter than the initial level is
//! left alone.

use tracing::{info, warn};

use crate::config::RiskParameters;
use crate::host::{BrokerError, TradingHost};
use crate::price::{normalize, GRID_EPSILON};
use crate::types::{InstrumentSnapshot, Position, Side};

/// Stop and target implied by the entry price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// What convergence intends to do with a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergencePlan {
    /// Price already reached the expected stop
    Close,
    /// Levels to send; `None` means that level is already in place
    Modify {
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    InSync,
}

/// Result of executing a plan against the host
#[derive(Debug, Clone, PartialEq)]
pub enum ConvergenceDecision {
    Closed,
    CloseFailed(BrokerError),
    Updated {
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    InSync,
    /// A modification was rejected; the position stays unverified.
    /// `stop_loss` / `take_profit` hold whichever level the host did accept.
    Failed {
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        error: BrokerError,
    },
}

impl ConvergenceDecision {
    /// Whether the position now counts as verified for this lifetime
    pub fn marks_processed(&self) -> bool {
        !matches!(self, ConvergenceDecision::Failed { .. })
    }
}

pub fn expected_levels(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> ExpectedLevels {
    let sign = position.side.sign();
    let entry = position.entry_price;
    let stop_loss = entry - sign * instrument.pips(params.stop_loss_pips);
    let take_profit = entry + sign * instrument.pips(params.take_profit_pips);

    ExpectedLevels {
        stop_loss: normalize(stop_loss, position.side, instrument),
        take_profit: normalize(take_profit, position.side, instrument),
    }
}

/// Whether the market is already at or through `stop_loss`
pub fn is_breached(side: Side, instrument: &InstrumentSnapshot, stop_loss: f64) -> bool {
    match side {
        Side::Long => instrument.bid <= stop_loss,
        Side::Short => instrument.ask >= stop_loss,
    }
}

fn needs_update(current: Option<f64>, expected: f64, tolerance: f64) -> bool {
    current.map_or(true, |c| (c - expected).abs() > tolerance * (1.0 + GRID_EPSILON))
}

pub fn plan(
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> ConvergencePlan {
    let expected = expected_levels(position, instrument, params);

    if is_breached(position.side, instrument, expected.stop_loss) {
        return ConvergencePlan::Close;
    }

    let tolerance = instrument.tick_size;
    let side = position.side;
    let tighter = position.stop_loss.map_or(false, |current| {
        side.is_beyond(current, expected.stop_loss, instrument.half_tick())
    });
    let stop_loss = (!tighter
        && needs_update(position.stop_loss, expected.stop_loss, tolerance))
    .then_some(expected.stop_loss);
    let take_profit = needs_update(position.take_profit, expected.take_profit, tolerance)
        .then_some(expected.take_profit);

    if stop_loss.is_none() && take_profit.is_none() {
        ConvergencePlan::InSync
    } else {
        ConvergencePlan::Modify {
            stop_loss,
            take_profit,
        }
    }
}

/// Plan and execute convergence for one unverified position.
///
/// Broker failures are logged and not retried here.
pub fn converge<H: TradingHost + ?Sized>(
    host: &mut H,
    position: &Position,
    instrument: &InstrumentSnapshot,
    params: &RiskParameters,
) -> ConvergenceDecision {
    match plan(position, instrument, params) {
        ConvergencePlan::Close => {
            let exit = position.side.exit_price(instrument);
            match host.close_position(position.id) {
                Ok(()) => {
                    warn!(
                        position = position.id,
                        side = %position.side,
                        entry = position.entry_price,
                        exit,
                        "Stop already breached before registration, position closed"
                    );
                    ConvergenceDecision::Closed
                }
                Err(e) => {
                    warn!(position = position.id, error = %e, "Immediate close failed");
                    ConvergenceDecision::CloseFailed(e)
                }
            }
        }
        ConvergencePlan::Modify {
            stop_loss,
            take_profit,
        } => {
            let mut failure = None;
            let mut accepted_sl = None;
            let mut accepted_tp = None;

            if let Some(sl) = stop_loss {
                match host.modify_stop_loss(position.id, Some(sl)) {
                    Ok(()) => accepted_sl = Some(sl),
                    Err(e) => {
                        warn!(position = position.id, error = %e, "Initial stop-loss rejected");
                        failure = Some(e);
                    }
                }
            }
            if let Some(tp) = take_profit {
                match host.modify_take_profit(position.id, Some(tp)) {
                    Ok(()) => accepted_tp = Some(tp),
                    Err(e) => {
                        warn!(position = position.id, error = %e, "Initial take-profit rejected");
                        failure = failure.or(Some(e));
                    }
                }
            }

            match failure {
                Some(error) => ConvergenceDecision::Failed {
                    stop_loss: accepted_sl,
                    take_profit: accepted_tp,
                    error,
                },
                None => {
                    info!(
                        position = position.id,
                        old_sl = ?position.stop_loss,
                        new_sl = ?stop_loss,
                        old_tp = ?position.take_profit,
                        new_tp = ?take_profit,
                        "Adjusted initial SL/TP"
                    );
                    ConvergenceDecision::Updated {
                        stop_loss,
                        take_profit,
                    }
                }
            }
        }
        ConvergencePlan::InSync => ConvergenceDecision::InSync,
    }
}
