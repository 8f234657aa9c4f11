//! Replay driver: feeds a quote tape through a [`PaperHost`] and the risk engine
//!
//! The engine stays synchronous; this loop only paces the tape and races a
//! shutdown future so an operator can stop a long replay cleanly.

use chrono::Utc;
use std::future::Future;
use std::time::Duration as StdDuration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::host::TradingHost;
use crate::risk::{EngineSettings, EntryPermit, RiskEngine};
use crate::status::StatusLine;

use super::report::{RunSummary, TradeRecord};
use super::tape::QuoteRecord;
use super::{PaperConfig, PaperHost};

/// Result of a replay run
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub summary: RunSummary,
    pub trades: Vec<TradeRecord>,
}

fn forward_closures(host: &mut PaperHost, engine: &mut RiskEngine) {
    for id in host.drain_closed() {
        engine.on_position_closed(id);
    }
}

/// Replay `tape` until it ends, the engine halts or `shutdown` resolves
pub async fn run<F>(config: &AppConfig, tape: Vec<QuoteRecord>, shutdown: F) -> ReplayOutcome
where
    F: Future<Output = ()>,
{
    let mut host = PaperHost::new(PaperConfig::from_replay(
        &config.engine.symbol,
        &config.replay,
    ));
    let mut engine = RiskEngine::new(EngineSettings::from(config));
    let interval = StdDuration::from_millis(config.replay.tick_interval_ms);

    let mut summary = RunSummary {
        run_id: uuid::Uuid::new_v4().to_string(),
        tag: config.engine.tag.clone(),
        symbol: config.engine.symbol.clone(),
        started_at: Some(Utc::now()),
        ..Default::default()
    };
    info!(
        run_id = %summary.run_id,
        quotes = tape.len(),
        "Starting paper replay"
    );

    tokio::pin!(shutdown);

    for quote in tape {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("Shutdown requested, stopping replay");
                summary.interrupted = true;
                break;
            }
            _ = sleep(interval) => {}
        }

        host.apply_quote(&quote);
        forward_closures(&mut host, &mut engine);

        if let Some(side) = quote.open {
            match engine.entry_permit(&host.clock()) {
                EntryPermit::Allowed => {
                    let lots = engine
                        .suggested_lots(host.account().balance, host.config().pip_value)
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "Sizing failed, using fixed lot");
                            config.sizing.fixed_lot
                        });
                    host.open_position(side, lots);
                    summary.entries_opened += 1;
                }
                EntryPermit::Blocked(reason) => {
                    info!(%side, %reason, "Entry blocked");
                    summary.entries_blocked += 1;
                }
            }
        }

        let clock = host.clock();
        let report = engine.on_tick(&mut host, &clock);
        forward_closures(&mut host, &mut engine);

        summary.ticks += 1;
        summary.stop_loss_updates += report.stop_loss_updates as u64;
        summary.take_profit_updates += report.take_profit_updates as u64;
        summary.broker_errors += report.broker_errors as u64;
        if report.force_close.is_some() {
            summary.forced_closes += report.closed.len() as u64;
        }

        let status = StatusLine::capture(&engine, &clock);
        if report.modifications() > 0 || !report.closed.is_empty() {
            info!("{}", status);
        } else {
            debug!("{}", status);
        }

        if report.is_halt() {
            warn!("Engine halted by drawdown breaker, stopping replay");
            summary.halted = true;
            break;
        }
    }

    let account = host.account();
    let trades = host.trades().to_vec();
    summary.finished_at = Some(Utc::now());
    summary.trades = trades.len();
    summary.winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
    summary.realized_pnl = account.realized_pnl;
    summary.final_balance = account.balance;
    summary.open_positions = host.open_count();
    summary.suppressed_logs = engine.suppressed_logs();

    info!(
        run_id = %summary.run_id,
        ticks = summary.ticks,
        trades = summary.trades,
        pnl = summary.realized_pnl,
        halted = summary.halted,
        "Paper replay finished"
    );

    ReplayOutcome { summary, trades }
}
