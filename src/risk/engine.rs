//! Risk engine: per-tick orchestration
//!
//! Tick order: spread gate, session closer, SL/TP convergence for unverified
//! positions, break-even, trailing stop, drawdown breaker. Positions are read
//! once per tick and the local copy is kept current as modifications succeed,
//! so later steps see the stops earlier steps just placed.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::config::{
    AppConfig, InvalidConfigPolicy, ParameterError, RiskParameters, SessionConfig, SizingConfig,
};
use crate::host::{SessionClock, TradingHost};
use crate::logging::DedupLog;
use crate::types::{AccountState, InstrumentSnapshot, Position, PositionId};

use super::break_even;
use super::convergence::{self, ConvergenceDecision};
use super::drawdown::{BreakerState, DrawdownBreaker};
use super::ledger::PositionLedger;
use super::session::{Boundary, SessionBlock, SessionCloser};
use super::sizing::{self, SizingError};
use super::spread::{self, SpreadReading};
use super::trailing;

// Dedup log sources
const SRC_SPREAD: &str = "spread";
const SRC_SESSION: &str = "session";
const SRC_CONFIG: &str = "config";
const SRC_DRAWDOWN: &str = "drawdown";
const SRC_BROKER: &str = "broker";
const SRC_ENGINE: &str = "engine";

/// Everything the engine needs from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub risk: RiskParameters,
    pub sizing: SizingConfig,
    pub session: SessionConfig,
    pub policy: InvalidConfigPolicy,
    pub log_cooldown: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            risk: RiskParameters::default(),
            sizing: SizingConfig::default(),
            session: SessionConfig::default(),
            policy: InvalidConfigPolicy::default(),
            log_cooldown: Duration::seconds(60),
        }
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            risk: config.risk.clone(),
            sizing: config.sizing.clone(),
            session: config.session.clone(),
            policy: config.engine.invalid_config_policy,
            log_cooldown: Duration::seconds(config.engine.log_cooldown_secs as i64),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub spread: SpreadReading,
    /// Boundary that forced a close this tick
    pub force_close: Option<Boundary>,
    /// Positions closed by the engine this tick
    pub closed: Vec<PositionId>,
    pub stop_loss_updates: usize,
    pub take_profit_updates: usize,
    pub broker_errors: usize,
    pub breaker: BreakerState,
}

impl Default for TickReport {
    fn default() -> Self {
        Self {
            spread: SpreadReading::Unknown,
            force_close: None,
            closed: Vec::new(),
            stop_loss_updates: 0,
            take_profit_updates: 0,
            broker_errors: 0,
            breaker: BreakerState::Armed,
        }
    }
}

impl TickReport {
    pub fn modifications(&self) -> usize {
        self.stop_loss_updates + self.take_profit_updates
    }

    /// The one tick on which the breaker asks the host to stop
    pub fn is_halt(&self) -> bool {
        self.breaker == BreakerState::Halt
    }
}

/// Reason a new entry is refused
#[derive(Debug, Clone, PartialEq)]
pub enum EntryBlock {
    Halted,
    DrawdownTripped,
    InvalidConfig(ParameterError),
    Session(SessionBlock),
    SpreadExcessive(f64),
    MaxOpenPositions(usize),
}

impl fmt::Display for EntryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryBlock::Halted => write!(f, "engine halted"),
            EntryBlock::DrawdownTripped => write!(f, "drawdown breaker tripped"),
            EntryBlock::InvalidConfig(e) => write!(f, "invalid configuration: {}", e),
            EntryBlock::Session(b) => write!(f, "{}", b),
            EntryBlock::SpreadExcessive(p) => write!(f, "spread too wide ({:.2} pips)", p),
            EntryBlock::MaxOpenPositions(n) => write!(f, "{} positions already open", n),
        }
    }
}

/// Advisory answer to "may a new position be opened now?"
#[derive(Debug, Clone, PartialEq)]
pub enum EntryPermit {
    Allowed,
    Blocked(EntryBlock),
}

impl EntryPermit {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EntryPermit::Allowed)
    }
}

pub struct RiskEngine {
    settings: EngineSettings,
    ledger: PositionLedger,
    closer: SessionCloser,
    breaker: DrawdownBreaker,
    dedup: DedupLog,
    config_errors: Vec<ParameterError>,
    last_spread: SpreadReading,
    last_account: AccountState,
}

/// Copy levels the host accepted into the tick's local position view
fn apply_accepted(
    positions: &mut [Position],
    id: PositionId,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    report: &mut TickReport,
) {
    let Some(p) = positions.iter_mut().find(|p| p.id == id) else {
        return;
    };
    if stop_loss.is_some() {
        p.stop_loss = stop_loss;
        report.stop_loss_updates += 1;
    }
    if take_profit.is_some() {
        p.take_profit = take_profit;
        report.take_profit_updates += 1;
    }
}

impl RiskEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let config_errors: Vec<ParameterError> = [
            settings.risk.validate(),
            settings.sizing.validate(),
            settings.session.validate(),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect();

        for e in &config_errors {
            error!(error = %e, policy = ?settings.policy, "Invalid risk parameters");
        }

        Self {
            ledger: PositionLedger::new(),
            closer: SessionCloser::new(settings.session.clone()),
            breaker: DrawdownBreaker::new(settings.risk.max_cumulative_loss),
            dedup: DedupLog::new(settings.log_cooldown),
            config_errors,
            last_spread: SpreadReading::Unknown,
            last_account: AccountState::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn closer(&self) -> &SessionCloser {
        &self.closer
    }

    pub fn last_spread(&self) -> SpreadReading {
        self.last_spread
    }

    pub fn last_account(&self) -> AccountState {
        self.last_account
    }

    pub fn open_count(&self) -> usize {
        self.ledger.open_count()
    }

    pub fn is_halted(&self) -> bool {
        self.breaker.is_halted()
    }

    pub fn is_tripped(&self) -> bool {
        self.breaker.is_tripped()
    }

    /// Most recent parameter validation failure, shown on every status line
    pub fn validation_error(&self) -> Option<&ParameterError> {
        self.config_errors.last()
    }

    /// Warnings dropped by the cooldown so far
    pub fn suppressed_logs(&self) -> u64 {
        self.dedup.suppressed()
    }

    fn adjustments_enabled(&self) -> bool {
        self.config_errors.is_empty() || self.settings.policy == InvalidConfigPolicy::WarnOnly
    }

    /// Host notification that a position no longer exists
    pub fn on_position_closed(&mut self, id: PositionId) {
        if self.ledger.on_closed(id) {
            debug!(position = id, "Position closed, removed from ledger");
        }
    }

    pub fn on_tick<H, C>(&mut self, host: &mut H, clock: &C) -> TickReport
    where
        H: TradingHost + ?Sized,
        C: SessionClock + ?Sized,
    {
        let mut report = TickReport::default();
        if self.breaker.is_halted() {
            report.breaker = BreakerState::Halted;
            return report;
        }

        let now = clock.now();
        let instrument = host.instrument();
        let mut positions = host.positions();
        self.last_account = host.account();

        // Spread gate (advisory)
        report.spread = spread::classify(&instrument, self.settings.risk.max_spread_pips);
        self.last_spread = report.spread;
        match report.spread {
            SpreadReading::Excessive(pips) => self.dedup.warn(
                now,
                SRC_SPREAD,
                "excessive",
                format!(
                    "Spread {:.2} pips above limit {:.2}",
                    pips, self.settings.risk.max_spread_pips
                ),
            ),
            SpreadReading::Unknown => self.dedup.warn(
                now,
                SRC_SPREAD,
                "unknown",
                format!("Spread unavailable for {}", instrument.symbol),
            ),
            SpreadReading::Acceptable(_) => {}
        }

        // Session boundary closer
        let force_close = self.closer.force_close_due(clock);
        if force_close.is_none() {
            // next window gets its first warning immediately
            self.dedup.reset(SRC_SESSION, "force_close");
        }

        if let Some(boundary) = force_close {
            report.force_close = Some(boundary);
            self.close_all(host, &mut positions, boundary, now, &mut report);
        } else if !self.adjustments_enabled() {
            if let Some(e) = self.config_errors.last() {
                self.dedup.warn(
                    now,
                    SRC_CONFIG,
                    "suppressed",
                    format!("Risk adjustments suppressed: {}", e),
                );
            }
        } else if !instrument.is_usable() {
            self.dedup.warn(
                now,
                SRC_ENGINE,
                "unusable_instrument",
                format!(
                    "Instrument {} has no usable tick/pip size or quotes",
                    instrument.symbol
                ),
            );
        } else {
            self.converge_unverified(host, &instrument, &mut positions, now, &mut report);
            self.migrate_break_even(host, &instrument, &mut positions, now, &mut report);
            self.trail_stops(host, &instrument, &mut positions, now, &mut report);
        }

        self.ledger.observe(&positions);

        // Drawdown breaker
        report.breaker = self
            .breaker
            .update(self.last_account.realized_pnl, positions.len());
        match report.breaker {
            BreakerState::Tripped => self.dedup.warn(
                now,
                SRC_DRAWDOWN,
                "tripped",
                format!(
                    "Drawdown breaker tripped: realized {:.2} <= -{:.2}, waiting for {} position(s) to close",
                    self.breaker.last_pnl(),
                    self.breaker.max_loss(),
                    positions.len()
                ),
            ),
            BreakerState::Halt => error!(
                realized = self.breaker.last_pnl(),
                max_loss = self.breaker.max_loss(),
                "Drawdown ceiling reached and book is flat, halting"
            ),
            BreakerState::Armed | BreakerState::Halted => {}
        }

        report
    }

    fn close_all<H: TradingHost + ?Sized>(
        &mut self,
        host: &mut H,
        positions: &mut Vec<Position>,
        boundary: Boundary,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        if positions.is_empty() {
            return;
        }
        self.dedup.warn(
            now,
            SRC_SESSION,
            "force_close",
            format!(
                "Closing {} position(s) ahead of {}",
                positions.len(),
                boundary
            ),
        );

        for position in positions.iter() {
            match host.close_position(position.id) {
                Ok(()) => {
                    info!(
                        position = position.id,
                        side = %position.side,
                        net_profit = position.net_profit,
                        %boundary,
                        "Closed position at session boundary"
                    );
                    report.closed.push(position.id);
                }
                Err(e) => {
                    report.broker_errors += 1;
                    self.dedup.error(
                        now,
                        SRC_BROKER,
                        "session_close_failed",
                        format!("Failed to close position {}: {}", position.id, e),
                    );
                }
            }
        }
        positions.retain(|p| !report.closed.contains(&p.id));
    }

    fn converge_unverified<H: TradingHost + ?Sized>(
        &mut self,
        host: &mut H,
        instrument: &InstrumentSnapshot,
        positions: &mut Vec<Position>,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let pending: Vec<Position> = self.ledger.unverified(positions).cloned().collect();

        for position in pending {
            let decision =
                convergence::converge(host, &position, instrument, &self.settings.risk);
            if decision.marks_processed() {
                self.ledger.mark_processed(position.id);
            }

            match decision {
                ConvergenceDecision::Closed => {
                    report.closed.push(position.id);
                    positions.retain(|p| p.id != position.id);
                }
                ConvergenceDecision::Updated {
                    stop_loss,
                    take_profit,
                } => apply_accepted(positions, position.id, stop_loss, take_profit, report),
                ConvergenceDecision::Failed {
                    stop_loss,
                    take_profit,
                    error,
                } => {
                    apply_accepted(positions, position.id, stop_loss, take_profit, report);
                    report.broker_errors += 1;
                    self.dedup.warn(
                        now,
                        SRC_BROKER,
                        "convergence_failed",
                        format!(
                            "Initial SL/TP for position {} not fully applied: {}",
                            position.id, error
                        ),
                    );
                }
                ConvergenceDecision::CloseFailed(e) => {
                    report.broker_errors += 1;
                    self.dedup.warn(
                        now,
                        SRC_BROKER,
                        "immediate_close_failed",
                        format!("Immediate close of position {} failed: {}", position.id, e),
                    );
                }
                ConvergenceDecision::InSync => {}
            }
        }
    }

    fn migrate_break_even<H: TradingHost + ?Sized>(
        &mut self,
        host: &mut H,
        instrument: &InstrumentSnapshot,
        positions: &mut [Position],
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        for position in positions.iter_mut() {
            let Some(new_stop) = break_even::proposed_stop(position, instrument, &self.settings.risk)
            else {
                continue;
            };
            match host.modify_stop_loss(position.id, Some(new_stop)) {
                Ok(()) => {
                    info!(
                        position = position.id,
                        old_sl = ?position.stop_loss,
                        new_sl = new_stop,
                        "Moved stop to break-even"
                    );
                    position.stop_loss = Some(new_stop);
                    report.stop_loss_updates += 1;
                }
                Err(e) => {
                    report.broker_errors += 1;
                    self.dedup.warn(
                        now,
                        SRC_BROKER,
                        "break_even_failed",
                        format!("Break-even for position {} rejected: {}", position.id, e),
                    );
                }
            }
        }
    }

    fn trail_stops<H: TradingHost + ?Sized>(
        &mut self,
        host: &mut H,
        instrument: &InstrumentSnapshot,
        positions: &mut [Position],
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        for position in positions.iter_mut() {
            let Some(new_stop) = trailing::proposed_stop(position, instrument, &self.settings.risk)
            else {
                continue;
            };
            match host.modify_stop_loss(position.id, Some(new_stop)) {
                Ok(()) => {
                    info!(
                        position = position.id,
                        old_sl = ?position.stop_loss,
                        new_sl = new_stop,
                        "Trailing stop advanced"
                    );
                    position.stop_loss = Some(new_stop);
                    report.stop_loss_updates += 1;
                }
                Err(e) => {
                    report.broker_errors += 1;
                    self.dedup.warn(
                        now,
                        SRC_BROKER,
                        "trailing_failed",
                        format!("Trailing stop for position {} rejected: {}", position.id, e),
                    );
                }
            }
        }
    }

    /// Whether a new position may be opened, based on the last tick
    pub fn entry_permit<C: SessionClock + ?Sized>(&self, clock: &C) -> EntryPermit {
        if self.breaker.is_halted() {
            return EntryPermit::Blocked(EntryBlock::Halted);
        }
        if self.breaker.is_tripped() {
            return EntryPermit::Blocked(EntryBlock::DrawdownTripped);
        }
        if let Some(e) = self.config_errors.last() {
            return EntryPermit::Blocked(EntryBlock::InvalidConfig(e.clone()));
        }
        if let Some(block) = self.closer.entry_block(clock) {
            return EntryPermit::Blocked(EntryBlock::Session(block));
        }
        if let SpreadReading::Excessive(pips) = self.last_spread {
            return EntryPermit::Blocked(EntryBlock::SpreadExcessive(pips));
        }
        let open = self.ledger.open_count();
        if open >= self.settings.sizing.max_open_positions {
            return EntryPermit::Blocked(EntryBlock::MaxOpenPositions(open));
        }
        EntryPermit::Allowed
    }

    /// Volume for the next entry given the current balance
    pub fn suggested_lots(&self, balance: f64, pip_value: f64) -> Result<f64, SizingError> {
        sizing::lots_for(
            &self.settings.sizing,
            balance,
            self.settings.risk.stop_loss_pips,
            pip_value,
        )
    }

    /// Operator command: close every position currently in profit
    pub fn close_profitable<H: TradingHost + ?Sized>(&mut self, host: &mut H) -> Vec<PositionId> {
        let mut closed = Vec::new();
        for position in host.positions().into_iter().filter(|p| p.net_profit > 0.0) {
            match host.close_position(position.id) {
                Ok(()) => {
                    info!(
                        position = position.id,
                        net_profit = position.net_profit,
                        "Closed profitable position"
                    );
                    closed.push(position.id);
                }
                Err(e) => {
                    warn!(position = position.id, error = %e, "Failed to close profitable position");
                }
            }
        }
        closed
    }
}
