//! Paper host: in-memory broker and session clock for replaying a quote tape
//!
//! Positions fill at the touch, stops and targets fill at their level when the
//! exit quote crosses them, and every close is queued so the replay loop can
//! forward it to [`crate::risk::RiskEngine::on_position_closed`] between ticks.

pub mod replay;
pub mod report;
pub mod tape;

use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

use crate::config::ReplayConfig;
use crate::host::{BrokerError, FixedClock, SessionClock, TradingHost};
use crate::types::{AccountState, InstrumentSnapshot, Position, PositionId, Side};

pub use report::{RunSummary, TradeRecord};
pub use tape::QuoteRecord;

/// Why a paper position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Closed by a command through [`TradingHost::close_position`]
    Command,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::Command => write!(f, "command"),
        }
    }
}

/// Static instrument and calendar settings of a paper account
#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub symbol: String,
    pub tick_size: f64,
    pub pip_size: f64,
    pub digits: u32,
    pub pip_value: f64,
    pub initial_balance: f64,
    /// Daily session open hour (UTC); equal open and close hours mean no session calendar
    pub market_open_hour: u32,
    pub market_close_hour: u32,
}

impl PaperConfig {
    pub fn from_replay(symbol: &str, replay: &ReplayConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            tick_size: replay.tick_size,
            pip_size: replay.pip_size,
            digits: replay.digits,
            pip_value: replay.pip_value,
            initial_balance: replay.initial_balance,
            market_open_hour: replay.market_open_hour,
            market_close_hour: replay.market_close_hour,
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            tick_size: 0.00001,
            pip_size: 0.0001,
            digits: 5,
            pip_value: 10.0,
            initial_balance: 10_000.0,
            market_open_hour: 0,
            market_close_hour: 21,
        }
    }
}

/// Account-currency profit of `position` if it exited at `exit`
fn profit_of(config: &PaperConfig, position: &Position, exit: f64) -> f64 {
    let pips = position.side.sign() * (exit - position.entry_price) / config.pip_size;
    pips * config.pip_value * position.volume
}

#[derive(Debug, Clone)]
struct PaperPosition {
    position: Position,
    opened_at: DateTime<Utc>,
}

pub struct PaperHost {
    config: PaperConfig,
    now: DateTime<Utc>,
    bid: f64,
    ask: f64,
    next_id: PositionId,
    open: Vec<PaperPosition>,
    balance: f64,
    realized_pnl: f64,
    trades: Vec<TradeRecord>,
    closed_events: VecDeque<PositionId>,
}

impl PaperHost {
    pub fn new(config: PaperConfig) -> Self {
        Self {
            now: DateTime::<Utc>::default(),
            bid: f64::NAN,
            ask: f64::NAN,
            next_id: 1,
            open: Vec::new(),
            balance: config.initial_balance,
            realized_pnl: 0.0,
            trades: Vec::new(),
            closed_events: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &PaperConfig {
        &self.config
    }

    /// Advance to `quote`, re-mark open positions and fill crossed stops/targets
    pub fn apply_quote(&mut self, quote: &QuoteRecord) {
        self.now = quote.ts;
        self.bid = quote.bid;
        self.ask = quote.ask;

        let mut fills = Vec::new();
        for paper in &self.open {
            let p = &paper.position;
            let exit = p.side.exit_price(&self.instrument());
            let stop_hit = p.stop_loss.is_some_and(|sl| match p.side {
                Side::Long => exit <= sl,
                Side::Short => exit >= sl,
            });
            let target_hit = p.take_profit.is_some_and(|tp| match p.side {
                Side::Long => exit >= tp,
                Side::Short => exit <= tp,
            });
            // a stop takes precedence when a gap crosses both
            if stop_hit {
                fills.push((p.id, p.stop_loss.unwrap_or(exit), ExitReason::StopLoss));
            } else if target_hit {
                fills.push((p.id, p.take_profit.unwrap_or(exit), ExitReason::TakeProfit));
            }
        }
        for (id, price, reason) in fills {
            self.settle(id, price, reason);
        }

        let (bid, ask) = (self.bid, self.ask);
        for paper in &mut self.open {
            let exit = match paper.position.side {
                Side::Long => bid,
                Side::Short => ask,
            };
            paper.position.net_profit = profit_of(&self.config, &paper.position, exit);
        }
    }

    /// Open a position at the current touch
    pub fn open_position(&mut self, side: Side, volume: f64) -> PositionId {
        let id = self.next_id;
        self.next_id += 1;
        let instrument = self.instrument();
        let mut position = Position {
            id,
            side,
            entry_price: side.entry_price(&instrument),
            stop_loss: None,
            take_profit: None,
            net_profit: 0.0,
            volume,
        };
        position.net_profit = profit_of(&self.config, &position, side.exit_price(&instrument));

        info!(position = id, %side, volume, entry = position.entry_price, "[PAPER] Opened position");
        self.open.push(PaperPosition {
            position,
            opened_at: self.now,
        });
        id
    }

    fn settle(&mut self, id: PositionId, exit_price: f64, reason: ExitReason) -> bool {
        let Some(index) = self.open.iter().position(|p| p.position.id == id) else {
            return false;
        };
        let paper = self.open.remove(index);
        let pnl = profit_of(&self.config, &paper.position, exit_price);
        self.balance += pnl;
        self.realized_pnl += pnl;

        info!(
            position = id,
            side = %paper.position.side,
            entry = paper.position.entry_price,
            exit = exit_price,
            pnl,
            %reason,
            "[PAPER] Closed position"
        );
        self.trades.push(TradeRecord {
            position_id: id,
            side: paper.position.side,
            volume: paper.position.volume,
            entry_price: paper.position.entry_price,
            exit_price,
            opened_at: paper.opened_at,
            closed_at: self.now,
            pnl,
            reason: reason.to_string(),
        });
        self.closed_events.push_back(id);
        true
    }

    /// Closures since the last drain, oldest first
    pub fn drain_closed(&mut self) -> Vec<PositionId> {
        self.closed_events.drain(..).collect()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Session bounds containing `now`, if the market is open
    fn session_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let open_hour = self.config.market_open_hour as i64;
        let close_hour = self.config.market_close_hour as i64;
        if open_hour == close_hour {
            return None;
        }

        let since_midnight = Duration::seconds(self.now.num_seconds_from_midnight() as i64);
        let midnight = self.now - since_midnight;
        let mut start = midnight + Duration::hours(open_hour);
        if start > self.now {
            start -= Duration::days(1);
        }
        let end = start + Duration::hours((close_hour - open_hour).rem_euclid(24));
        (self.now < end).then_some((start, end))
    }

    /// Clock frozen at the current quote, for use while the host is mutably borrowed
    pub fn clock(&self) -> FixedClock {
        FixedClock {
            now: self.now,
            till_close: self.time_till_close(),
            since_open: self.time_since_open(),
        }
    }
}

impl TradingHost for PaperHost {
    fn instrument(&self) -> InstrumentSnapshot {
        InstrumentSnapshot {
            symbol: self.config.symbol.clone(),
            tick_size: self.config.tick_size,
            pip_size: self.config.pip_size,
            digits: self.config.digits,
            bid: self.bid,
            ask: self.ask,
            pip_value: self.config.pip_value,
        }
    }

    fn positions(&self) -> Vec<Position> {
        self.open.iter().map(|p| p.position.clone()).collect()
    }

    fn account(&self) -> AccountState {
        let unrealized: f64 = self.open.iter().map(|p| p.position.net_profit).sum();
        AccountState {
            balance: self.balance,
            equity: self.balance + unrealized,
            realized_pnl: self.realized_pnl,
        }
    }

    fn modify_stop_loss(&mut self, id: PositionId, price: Option<f64>) -> Result<(), BrokerError> {
        let (bid, ask) = (self.bid, self.ask);
        let paper = self
            .open
            .iter_mut()
            .find(|p| p.position.id == id)
            .ok_or(BrokerError::UnknownPosition(id))?;

        if let Some(sl) = price {
            let wrong_side = match paper.position.side {
                Side::Long => sl >= bid,
                Side::Short => sl <= ask,
            };
            if wrong_side {
                return Err(BrokerError::Rejected {
                    id,
                    reason: format!("stop {} is through the market ({}/{})", sl, bid, ask),
                });
            }
        }
        debug!(position = id, old = ?paper.position.stop_loss, new = ?price, "[PAPER] Stop modified");
        paper.position.stop_loss = price;
        Ok(())
    }

    fn modify_take_profit(
        &mut self,
        id: PositionId,
        price: Option<f64>,
    ) -> Result<(), BrokerError> {
        let paper = self
            .open
            .iter_mut()
            .find(|p| p.position.id == id)
            .ok_or(BrokerError::UnknownPosition(id))?;
        debug!(position = id, old = ?paper.position.take_profit, new = ?price, "[PAPER] Target modified");
        paper.position.take_profit = price;
        Ok(())
    }

    fn close_position(&mut self, id: PositionId) -> Result<(), BrokerError> {
        let side = self
            .open
            .iter()
            .find(|p| p.position.id == id)
            .map(|p| p.position.side)
            .ok_or(BrokerError::UnknownPosition(id))?;
        let exit = side.exit_price(&self.instrument());
        self.settle(id, exit, ExitReason::Command);
        Ok(())
    }
}

impl SessionClock for PaperHost {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn time_till_close(&self) -> Option<Duration> {
        self.session_bounds().map(|(_, end)| end - self.now)
    }

    fn time_since_open(&self) -> Option<Duration> {
        self.session_bounds().map(|(start, _)| self.now - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quote(h: u32, m: u32, bid: f64) -> QuoteRecord {
        QuoteRecord {
            ts: Utc.with_ymd_and_hms(2024, 3, 13, h, m, 0).unwrap(),
            bid,
            ask: bid + 0.00002,
            open: None,
        }
    }

    #[test]
    fn long_stop_fill_realizes_loss() {
        let mut host = PaperHost::new(PaperConfig::default());
        host.apply_quote(&quote(10, 0, 1.1000));
        let id = host.open_position(Side::Long, 1.0);
        host.modify_stop_loss(id, Some(1.0991)).unwrap();

        host.apply_quote(&quote(10, 1, 1.0990));
        assert_eq!(host.drain_closed(), vec![id]);
        assert!(host.drain_closed().is_empty());

        let trade = &host.trades()[0];
        assert_eq!(trade.reason, "stop_loss");
        // entry at ask 1.10002, exit at 1.0991: 9.2 pips at 10/pip
        assert!((trade.pnl + 92.0).abs() < 1e-6);
        assert!((host.account().realized_pnl + 92.0).abs() < 1e-6);
    }

    #[test]
    fn short_target_fill() {
        let mut host = PaperHost::new(PaperConfig::default());
        host.apply_quote(&quote(10, 0, 1.1000));
        let id = host.open_position(Side::Short, 0.5);
        host.modify_take_profit(id, Some(1.0980)).unwrap();
        host.apply_quote(&quote(10, 5, 1.0978));
        assert_eq!(host.trades()[0].reason, "take_profit");
        assert!(host.trades()[0].pnl > 0.0);
        assert_eq!(host.open_count(), 0);
    }

    #[test]
    fn stop_through_market_is_rejected() {
        let mut host = PaperHost::new(PaperConfig::default());
        host.apply_quote(&quote(10, 0, 1.1000));
        let id = host.open_position(Side::Long, 1.0);
        assert!(matches!(
            host.modify_stop_loss(id, Some(1.1001)),
            Err(BrokerError::Rejected { .. })
        ));
        assert_eq!(
            host.modify_take_profit(99, Some(1.2)),
            Err(BrokerError::UnknownPosition(99))
        );
    }

    #[test]
    fn close_command_queues_event() {
        let mut host = PaperHost::new(PaperConfig::default());
        host.apply_quote(&quote(10, 0, 1.1000));
        let id = host.open_position(Side::Long, 1.0);
        host.close_position(id).unwrap();
        assert_eq!(host.close_position(id), Err(BrokerError::UnknownPosition(id)));
        assert_eq!(host.drain_closed(), vec![id]);
        assert_eq!(host.trades()[0].reason, "command");
    }

    #[test]
    fn session_countdown_follows_calendar() {
        let mut host = PaperHost::new(PaperConfig::default());
        host.apply_quote(&quote(20, 30, 1.1));
        assert_eq!(host.time_till_close(), Some(Duration::minutes(30)));
        assert_eq!(host.time_since_open(), Some(Duration::minutes(20 * 60 + 30)));

        host.apply_quote(&quote(22, 0, 1.1));
        assert_eq!(host.time_till_close(), None);
    }

    #[test]
    fn overnight_session_wraps_midnight() {
        let mut host = PaperHost::new(PaperConfig {
            market_open_hour: 22,
            market_close_hour: 21,
            ..Default::default()
        });
        host.apply_quote(&quote(1, 0, 1.1));
        assert_eq!(host.time_since_open(), Some(Duration::hours(3)));
        assert_eq!(host.time_till_close(), Some(Duration::hours(20)));
    }
}
