//! Operator status line

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::host::SessionClock;
use crate::risk::{Boundary, RiskEngine, SpreadReading};

/// Snapshot of engine state rendered as a single line
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub time: DateTime<Utc>,
    pub boundary: Boundary,
    pub countdown: Duration,
    pub balance: f64,
    pub spread: SpreadReading,
    pub stop_loss_pips: f64,
    pub take_profit_pips: f64,
    pub break_even_trigger_pips: f64,
    pub break_even_margin_pips: f64,
    pub trailing_stop_pips: f64,
    pub open_positions: usize,
    pub halted: bool,
    pub error: Option<String>,
}

impl StatusLine {
    pub fn capture<C: SessionClock + ?Sized>(engine: &RiskEngine, clock: &C) -> Self {
        let (boundary, countdown) = engine.closer().next_boundary(clock);
        let risk = &engine.settings().risk;
        Self {
            time: clock.now(),
            boundary,
            countdown,
            balance: engine.last_account().balance,
            spread: engine.last_spread(),
            stop_loss_pips: risk.stop_loss_pips,
            take_profit_pips: risk.take_profit_pips,
            break_even_trigger_pips: risk.break_even_trigger_pips,
            break_even_margin_pips: risk.break_even_margin_pips,
            trailing_stop_pips: risk.trailing_stop_pips,
            open_positions: engine.open_count(),
            halted: engine.is_halted(),
            error: engine.validation_error().map(|e| e.to_string()),
        }
    }
}

fn hms(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} in {} | bal {:.2} | spread {} | SL {} TP {} BE {}/{} TS {} | open {}",
            self.time.format("%Y-%m-%d %H:%M:%S"),
            self.boundary,
            hms(self.countdown),
            self.balance,
            self.spread,
            self.stop_loss_pips,
            self.take_profit_pips,
            self.break_even_trigger_pips,
            self.break_even_margin_pips,
            self.trailing_stop_pips,
            self.open_positions,
        )?;
        if self.halted {
            write!(f, " | HALTED")?;
        }
        if let Some(e) = &self.error {
            write!(f, " | ERR {}", e)?;
        }
        Ok(())
    }
}
