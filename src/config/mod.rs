//! Configuration management for PipGuard
//!
//! Loads built-in defaults, then `config/default` and `config/local` files,
//! then `PIPGUARD__*` environment variables (with `.env` support).

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::logging::LogFormat;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub risk: RiskParameters,
    pub sizing: SizingConfig,
    pub session: SessionConfig,
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Version tag for logs and run summaries
    pub tag: String,
    /// Managed instrument
    pub symbol: String,
    /// What to do with risk actions when parameters fail validation
    pub invalid_config_policy: InvalidConfigPolicy,
    /// Log output format
    pub log_format: LogFormat,
    /// Cooldown for repeated warnings in seconds
    pub log_cooldown_secs: u64,
}

/// Behaviour of the engine while its parameters are invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidConfigPolicy {
    /// Skip SL/TP convergence, break-even and trailing. Session close and the
    /// drawdown breaker still run since they only ever reduce exposure.
    Suppress,
    /// Keep every action running and only surface the error
    WarnOnly,
}

impl Default for InvalidConfigPolicy {
    fn default() -> Self {
        InvalidConfigPolicy::Suppress
    }
}

/// Distances in pips, loss ceiling in account currency
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskParameters {
    pub stop_loss_pips: f64,
    pub take_profit_pips: f64,
    /// Favorable excursion that arms break-even
    pub break_even_trigger_pips: f64,
    /// Offset from entry of the break-even stop
    pub break_even_margin_pips: f64,
    /// Distance the trailing stop keeps behind price
    pub trailing_stop_pips: f64,
    pub max_spread_pips: f64,
    /// Cumulative realized loss that trips the breaker, 0 disables it
    pub max_cumulative_loss: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            stop_loss_pips: 9.0,
            take_profit_pips: 26.0,
            break_even_trigger_pips: 7.0,
            break_even_margin_pips: 1.0,
            trailing_stop_pips: 12.0,
            max_spread_pips: 0.4,
            max_cumulative_loss: 200.0,
        }
    }
}

impl RiskParameters {
    pub fn validate(&self) -> Result<(), ParameterError> {
        require_positive("stop_loss_pips", self.stop_loss_pips)?;
        require_positive("take_profit_pips", self.take_profit_pips)?;
        require_positive("break_even_trigger_pips", self.break_even_trigger_pips)?;
        require_non_negative("break_even_margin_pips", self.break_even_margin_pips)?;
        if self.break_even_margin_pips >= self.break_even_trigger_pips {
            return Err(ParameterError::MarginNotBelowTrigger {
                margin: self.break_even_margin_pips,
                trigger: self.break_even_trigger_pips,
            });
        }
        require_positive("trailing_stop_pips", self.trailing_stop_pips)?;
        require_non_negative("max_spread_pips", self.max_spread_pips)?;
        require_non_negative("max_cumulative_loss", self.max_cumulative_loss)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SizingConfig {
    /// Size from balance × risk % instead of the fixed lot
    pub use_dynamic_lot: bool,
    pub fixed_lot: f64,
    /// Floor for dynamically sized volume
    pub min_lot: f64,
    /// Percent of balance risked per trade, (0, 2]
    pub risk_percent: f64,
    pub max_open_positions: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            use_dynamic_lot: true,
            fixed_lot: 1.0,
            min_lot: 0.01,
            risk_percent: 1.8,
            max_open_positions: 4,
        }
    }
}

/// Upper bound on per-trade risk
pub const MAX_RISK_PERCENT: f64 = 2.0;

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ParameterError> {
        require_positive("fixed_lot", self.fixed_lot)?;
        require_positive("min_lot", self.min_lot)?;
        if !(self.risk_percent > 0.0 && self.risk_percent <= MAX_RISK_PERCENT) {
            return Err(ParameterError::RiskPercentOutOfRange(self.risk_percent));
        }
        if self.max_open_positions == 0 {
            return Err(ParameterError::NoOpenPositionsAllowed);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionConfig {
    /// Manual rollover hour (UTC)
    pub rollover_hour: u32,
    /// Positions are force-closed this many minutes before a boundary
    pub force_close_window_minutes: i64,
    /// New entries are discouraged this many minutes before a boundary
    pub entry_block_window_minutes: i64,
    /// New entries are discouraged this many minutes after the session opens
    pub opening_delay_minutes: i64,
    /// On Fridays, force-close this many hours before the session close (0 disables)
    pub close_before_weekend_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rollover_hour: 20,
            force_close_window_minutes: 5,
            entry_block_window_minutes: 30,
            opening_delay_minutes: 0,
            close_before_weekend_hours: 1,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.rollover_hour > 23 {
            return Err(ParameterError::RolloverHourOutOfRange(self.rollover_hour));
        }
        require_non_negative(
            "force_close_window_minutes",
            self.force_close_window_minutes as f64,
        )?;
        require_non_negative(
            "entry_block_window_minutes",
            self.entry_block_window_minutes as f64,
        )?;
        require_non_negative("opening_delay_minutes", self.opening_delay_minutes as f64)?;
        require_non_negative(
            "close_before_weekend_hours",
            self.close_before_weekend_hours as f64,
        )?;
        Ok(())
    }
}

/// Paper replay settings used by the binary
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// CSV tape with `ts,bid,ask,open` columns
    pub quotes_path: String,
    /// Directory for trade CSV and run summary
    pub output_dir: String,
    pub tick_size: f64,
    pub pip_size: f64,
    pub digits: u32,
    /// Account currency per pip per lot
    pub pip_value: f64,
    pub initial_balance: f64,
    /// Daily session open hour (UTC)
    pub market_open_hour: u32,
    /// Daily session close hour (UTC)
    pub market_close_hour: u32,
    /// Sleep between replayed quotes, 0 for as fast as possible
    pub tick_interval_ms: u64,
}

/// Invalid parameter combination, surfaced as a persistent advisory
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("{name} must be greater than 0 (got {value})")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must not be negative (got {value})")]
    Negative { name: &'static str, value: f64 },
    #[error("break-even margin ({margin} pips) must be below the break-even trigger ({trigger} pips)")]
    MarginNotBelowTrigger { margin: f64, trigger: f64 },
    #[error("risk percent must be in (0, 2] (got {0})")]
    RiskPercentOutOfRange(f64),
    #[error("the maximum number of open positions must be greater than 0")]
    NoOpenPositionsAllowed,
    #[error("rollover hour must be between 0 and 23 (got {0})")]
    RolloverHourOutOfRange(u32),
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ParameterError::NonPositive { name, value })
    }
}

fn require_non_negative(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ParameterError::Negative { name, value })
    }
}

impl AppConfig {
    /// Load configuration from defaults, files and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults_builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PIPGUARD__RISK__STOP_LOSS_PIPS=...)
            .add_source(Environment::with_prefix("PIPGUARD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Built-in defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        Self::defaults_builder()?
            .build()
            .context("Failed to build default configuration")?
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    fn defaults_builder() -> Result<ConfigBuilder<config::builder::DefaultState>> {
        let risk = RiskParameters::default();
        let sizing = SizingConfig::default();
        let session = SessionConfig::default();

        let builder = Config::builder()
            // Engine defaults
            .set_default("engine.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("engine.symbol", "EURUSD")?
            .set_default("engine.invalid_config_policy", "suppress")?
            .set_default("engine.log_format", "text")?
            .set_default("engine.log_cooldown_secs", 60)?
            // Risk defaults
            .set_default("risk.stop_loss_pips", risk.stop_loss_pips)?
            .set_default("risk.take_profit_pips", risk.take_profit_pips)?
            .set_default("risk.break_even_trigger_pips", risk.break_even_trigger_pips)?
            .set_default("risk.break_even_margin_pips", risk.break_even_margin_pips)?
            .set_default("risk.trailing_stop_pips", risk.trailing_stop_pips)?
            .set_default("risk.max_spread_pips", risk.max_spread_pips)?
            .set_default("risk.max_cumulative_loss", risk.max_cumulative_loss)?
            // Sizing defaults
            .set_default("sizing.use_dynamic_lot", sizing.use_dynamic_lot)?
            .set_default("sizing.fixed_lot", sizing.fixed_lot)?
            .set_default("sizing.min_lot", sizing.min_lot)?
            .set_default("sizing.risk_percent", sizing.risk_percent)?
            .set_default("sizing.max_open_positions", sizing.max_open_positions as i64)?
            // Session defaults
            .set_default("session.rollover_hour", session.rollover_hour as i64)?
            .set_default(
                "session.force_close_window_minutes",
                session.force_close_window_minutes,
            )?
            .set_default(
                "session.entry_block_window_minutes",
                session.entry_block_window_minutes,
            )?
            .set_default("session.opening_delay_minutes", session.opening_delay_minutes)?
            .set_default(
                "session.close_before_weekend_hours",
                session.close_before_weekend_hours,
            )?
            // Replay defaults
            .set_default("replay.quotes_path", "./data/quotes.csv")?
            .set_default("replay.output_dir", "./data/out")?
            .set_default("replay.tick_size", 0.00001)?
            .set_default("replay.pip_size", 0.0001)?
            .set_default("replay.digits", 5)?
            .set_default("replay.pip_value", 10.0)?
            .set_default("replay.initial_balance", 10_000.0)?
            .set_default("replay.market_open_hour", 0)?
            .set_default("replay.market_close_hour", 21)?
            .set_default("replay.tick_interval_ms", 0)?;

        Ok(builder)
    }

    /// Every validation failure across risk, sizing and session parameters
    pub fn validation_errors(&self) -> Vec<ParameterError> {
        [
            self.risk.validate(),
            self.sizing.validate(),
            self.session.validate(),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect()
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "tag={} symbol={} sl={} tp={} be={}/{} trail={} max_spread={} max_loss={} rollover={}h",
            self.engine.tag,
            self.engine.symbol,
            self.risk.stop_loss_pips,
            self.risk.take_profit_pips,
            self.risk.break_even_trigger_pips,
            self.risk.break_even_margin_pips,
            self.risk.trailing_stop_pips,
            self.risk.max_spread_pips,
            self.risk.max_cumulative_loss,
            self.session.rollover_hour,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_and_validate() {
        let cfg = AppConfig::defaults().unwrap();
        assert_eq!(cfg.engine.symbol, "EURUSD");
        assert_eq!(cfg.engine.invalid_config_policy, InvalidConfigPolicy::Suppress);
        assert_eq!(cfg.engine.log_format, LogFormat::Text);
        assert_eq!(cfg.risk, RiskParameters::default());
        assert_eq!(cfg.sizing, SizingConfig::default());
        assert_eq!(cfg.session, SessionConfig::default());
        assert_eq!(cfg.replay.digits, 5);
        assert!(cfg.validation_errors().is_empty());
    }

    #[test]
    fn stop_loss_and_take_profit_must_be_positive() {
        let risk = RiskParameters {
            stop_loss_pips: 0.0,
            ..Default::default()
        };
        assert_eq!(
            risk.validate(),
            Err(ParameterError::NonPositive {
                name: "stop_loss_pips",
                value: 0.0
            })
        );

        let risk = RiskParameters {
            take_profit_pips: -3.0,
            ..Default::default()
        };
        assert!(matches!(
            risk.validate(),
            Err(ParameterError::NonPositive { name: "take_profit_pips", .. })
        ));
    }

    #[test]
    fn margin_must_stay_below_trigger() {
        let risk = RiskParameters {
            break_even_trigger_pips: 3.0,
            break_even_margin_pips: 3.0,
            ..Default::default()
        };
        assert!(matches!(
            risk.validate(),
            Err(ParameterError::MarginNotBelowTrigger { .. })
        ));
    }

    #[test]
    fn risk_percent_capped_at_two() {
        let sizing = SizingConfig {
            risk_percent: 2.5,
            ..Default::default()
        };
        assert_eq!(
            sizing.validate(),
            Err(ParameterError::RiskPercentOutOfRange(2.5))
        );
        let sizing = SizingConfig {
            risk_percent: 2.0,
            ..Default::default()
        };
        assert!(sizing.validate().is_ok());
    }

    #[test]
    fn validation_errors_collects_every_section() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.risk.stop_loss_pips = 0.0;
        cfg.session.rollover_hour = 24;
        let errors = cfg.validation_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1], ParameterError::RolloverHourOutOfRange(24));
    }

    #[test]
    fn error_messages_are_readable() {
        let err = ParameterError::RiskPercentOutOfRange(3.0);
        assert_eq!(err.to_string(), "risk percent must be in (0, 2] (got 3)");
    }
}
