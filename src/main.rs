//! PipGuard paper replay
//!
//! Loads configuration, replays the configured quote tape through the risk
//! engine on a paper host and writes the trade CSV and run summary.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info, warn};

use pipguard::config::AppConfig;
use pipguard::logging;
use pipguard::paper::{replay, report, tape};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init(config.engine.log_format)?;

    info!("🛡️ PipGuard {} starting", env!("CARGO_PKG_VERSION"));
    info!(config = %config, "Configuration loaded");
    for e in config.validation_errors() {
        warn!(error = %e, policy = ?config.engine.invalid_config_policy, "Invalid parameter");
    }

    let tape = tape::load_tape(Path::new(&config.replay.quotes_path))?;
    if tape.is_empty() {
        warn!(path = %config.replay.quotes_path, "Quote tape is empty, nothing to replay");
        return Ok(());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let outcome = replay::run(&config, tape, shutdown).await;

    let out_dir = Path::new(&config.replay.output_dir);
    report::write_trades(out_dir, &outcome.trades)?;
    report::write_summary(out_dir, &outcome.summary)?;

    info!(
        trades = outcome.summary.trades,
        win_rate = %format!("{:.1}%", outcome.summary.win_rate() * 100.0),
        pnl = %format!("{:.2}", outcome.summary.realized_pnl),
        balance = %format!("{:.2}", outcome.summary.final_balance),
        "✅ Replay complete"
    );
    Ok(())
}
