//! Logging setup and duplicate-warning suppression
//!
//! Per-tick checks tend to repeat the same warning on every quote (wide
//! spread, breaker tripped, rollover window). [`DedupLog`] keys each message
//! by an explicit `(source, template)` pair and drops repeats inside a
//! cooldown, while the variable payload is still printed on the first one.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Output format of the global subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

type DedupKey = (&'static str, &'static str);

/// Cooldown-based suppression of repeated log lines
#[derive(Debug, Clone)]
pub struct DedupLog {
    cooldown: Duration,
    last_emitted: HashMap<DedupKey, DateTime<Utc>>,
    suppressed: u64,
}

impl DedupLog {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_emitted: HashMap::new(),
            suppressed: 0,
        }
    }

    /// Decide whether a message keyed by `(source, template)` may be emitted at `now`.
    /// Records the emission when it returns `true`.
    pub fn admit(
        &mut self,
        source: &'static str,
        template: &'static str,
        now: DateTime<Utc>,
    ) -> bool {
        let key = (source, template);
        if let Some(last) = self.last_emitted.get(&key) {
            if now - *last < self.cooldown {
                self.suppressed += 1;
                return false;
            }
        }
        self.last_emitted.insert(key, now);
        true
    }

    /// Forget a key so the next occurrence is printed immediately
    pub fn reset(&mut self, source: &'static str, template: &'static str) {
        self.last_emitted.remove(&(source, template));
    }

    /// Number of messages dropped so far
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn log(
        &mut self,
        level: Level,
        now: DateTime<Utc>,
        source: &'static str,
        template: &'static str,
        message: impl Display,
    ) {
        if !self.admit(source, template, now) {
            return;
        }
        match level {
            Level::ERROR => error!(source, "{}", message),
            Level::WARN => warn!(source, "{}", message),
            _ => info!(source, "{}", message),
        }
    }

    pub fn warn(
        &mut self,
        now: DateTime<Utc>,
        source: &'static str,
        template: &'static str,
        message: impl Display,
    ) {
        self.log(Level::WARN, now, source, template, message)
    }

    pub fn error(
        &mut self,
        now: DateTime<Utc>,
        source: &'static str,
        template: &'static str,
        message: impl Display,
    ) {
        self.log(Level::ERROR, now, source, template, message)
    }
}

impl Default for DedupLog {
    fn default() -> Self {
        Self::new(Duration::seconds(60))
    }
}
