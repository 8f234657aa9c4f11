//! Session boundary closer
//!
//! Two boundaries are watched: the manual rollover hour from configuration
//! and the automatic session-close countdown from the [`SessionClock`]. Inside
//! the force-close window before either one, every open position is closed to
//! avoid financing charges. A wider entry-block window and an opening delay
//! are exposed for whoever opens positions.
//!
//! Simulated clocks do not always report a faithful close countdown; a
//! missing countdown simply disables the automatic boundary.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use std::fmt;

use crate::config::SessionConfig;
use crate::host::SessionClock;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Which boundary triggered a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Manual rollover hour
    Rollover,
    /// Instrument session close
    SessionClose,
    /// Friday close, widened by `close_before_weekend_hours`
    Weekend,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Rollover => write!(f, "rollover"),
            Boundary::SessionClose => write!(f, "session close"),
            Boundary::Weekend => write!(f, "weekend close"),
        }
    }
}

/// Reason new entries are discouraged by the session calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBlock {
    BeforeBoundary(Boundary),
    OpeningDelay,
}

impl fmt::Display for SessionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionBlock::BeforeBoundary(b) => write!(f, "too close to {}", b),
            SessionBlock::OpeningDelay => write!(f, "session opening delay"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionCloser {
    config: SessionConfig,
}

impl SessionCloser {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Time until the next manual rollover; zero exactly at the rollover instant
    pub fn time_to_rollover(&self, now: DateTime<Utc>) -> Duration {
        let now_secs = now.num_seconds_from_midnight() as i64;
        let rollover_secs = self.config.rollover_hour as i64 * 3600;
        Duration::seconds((rollover_secs - now_secs).rem_euclid(SECS_PER_DAY))
    }

    /// Boundary whose `window` currently contains the clock, if any
    fn boundary_within<C: SessionClock + ?Sized>(
        &self,
        clock: &C,
        window: Duration,
    ) -> Option<Boundary> {
        let now = clock.now();
        if self.time_to_rollover(now) <= window {
            return Some(Boundary::Rollover);
        }

        let till_close = clock.time_till_close().filter(|d| *d > Duration::zero())?;
        if till_close <= window {
            return Some(Boundary::SessionClose);
        }

        let weekend = Duration::hours(self.config.close_before_weekend_hours);
        if now.weekday() == Weekday::Fri && weekend > Duration::zero() && till_close <= weekend {
            return Some(Boundary::Weekend);
        }
        None
    }

    /// Boundary that requires closing every position now
    pub fn force_close_due<C: SessionClock + ?Sized>(&self, clock: &C) -> Option<Boundary> {
        self.boundary_within(
            clock,
            Duration::minutes(self.config.force_close_window_minutes),
        )
    }

    /// Whether the calendar discourages opening a new position now
    pub fn entry_block<C: SessionClock + ?Sized>(&self, clock: &C) -> Option<SessionBlock> {
        if let Some(boundary) = self.boundary_within(
            clock,
            Duration::minutes(self.config.entry_block_window_minutes),
        ) {
            return Some(SessionBlock::BeforeBoundary(boundary));
        }

        let delay = Duration::minutes(self.config.opening_delay_minutes);
        match clock.time_since_open() {
            Some(since_open) if delay > Duration::zero() && since_open < delay => {
                Some(SessionBlock::OpeningDelay)
            }
            _ => None,
        }
    }

    /// Countdown to whichever boundary comes first
    pub fn next_boundary<C: SessionClock + ?Sized>(&self, clock: &C) -> (Boundary, Duration) {
        let rollover = self.time_to_rollover(clock.now());
        match clock.time_till_close() {
            Some(close) if close > Duration::zero() && close < rollover => {
                (Boundary::SessionClose, close)
            }
            _ => (Boundary::Rollover, rollover),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FixedClock;
    use chrono::TimeZone;

    // 2024-03-13 is a Wednesday, 2024-03-15 a Friday
    fn wed(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, h, m, 0).unwrap()
    }

    fn fri(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, m, 0).unwrap()
    }

    fn closer(rollover_hour: u32) -> SessionCloser {
        SessionCloser::new(SessionConfig {
            rollover_hour,
            ..Default::default()
        })
    }

    #[test]
    fn force_close_inside_five_minutes_before_rollover() {
        let closer = closer(20);
        assert_eq!(closer.force_close_due(&FixedClock::at(wed(19, 54))), None);
        assert_eq!(
            closer.force_close_due(&FixedClock::at(wed(19, 55))),
            Some(Boundary::Rollover)
        );
        assert_eq!(
            closer.force_close_due(&FixedClock::at(wed(20, 0))),
            Some(Boundary::Rollover)
        );
        assert_eq!(closer.force_close_due(&FixedClock::at(wed(20, 1))), None);
    }

    #[test]
    fn midnight_rollover_wraps() {
        let closer = closer(0);
        assert_eq!(
            closer.force_close_due(&FixedClock::at(wed(23, 57))),
            Some(Boundary::Rollover)
        );
        assert_eq!(closer.time_to_rollover(wed(23, 57)), Duration::minutes(3));
    }

    #[test]
    fn automatic_close_countdown() {
        let closer = closer(20);
        let mut clock = FixedClock::at(wed(10, 0));
        clock.till_close = Some(Duration::minutes(4));
        assert_eq!(closer.force_close_due(&clock), Some(Boundary::SessionClose));

        clock.till_close = Some(Duration::zero());
        assert_eq!(closer.force_close_due(&clock), None);

        clock.till_close = None;
        assert_eq!(closer.force_close_due(&clock), None);
    }

    #[test]
    fn friday_window_widens_to_weekend_hours() {
        let closer = closer(20);
        let mut clock = FixedClock::at(fri(10, 0));
        clock.till_close = Some(Duration::minutes(50));
        assert_eq!(closer.force_close_due(&clock), Some(Boundary::Weekend));

        clock.now = wed(10, 0);
        assert_eq!(closer.force_close_due(&clock), None);
    }

    #[test]
    fn entries_blocked_half_an_hour_before_rollover() {
        let closer = closer(20);
        assert_eq!(
            closer.entry_block(&FixedClock::at(wed(19, 40))),
            Some(SessionBlock::BeforeBoundary(Boundary::Rollover))
        );
        assert_eq!(closer.entry_block(&FixedClock::at(wed(19, 20))), None);
    }

    #[test]
    fn opening_delay_blocks_entries() {
        let closer = SessionCloser::new(SessionConfig {
            opening_delay_minutes: 15,
            ..Default::default()
        });
        let mut clock = FixedClock::at(wed(8, 5));
        clock.since_open = Some(Duration::minutes(5));
        assert_eq!(closer.entry_block(&clock), Some(SessionBlock::OpeningDelay));
        clock.since_open = Some(Duration::minutes(20));
        assert_eq!(closer.entry_block(&clock), None);
    }

    #[test]
    fn next_boundary_picks_the_nearest() {
        let closer = closer(20);
        let mut clock = FixedClock::at(wed(18, 0));
        assert_eq!(
            closer.next_boundary(&clock),
            (Boundary::Rollover, Duration::hours(2))
        );
        clock.till_close = Some(Duration::minutes(30));
        assert_eq!(
            closer.next_boundary(&clock),
            (Boundary::SessionClose, Duration::minutes(30))
        );
    }
}
