//! Replay artifacts: closed-trade CSV and JSON run summary

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::{PositionId, Side};

/// One closed paper position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: PositionId,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub pnl: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub tag: String,
    pub symbol: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub entries_opened: u64,
    pub entries_blocked: u64,
    pub trades: usize,
    pub winning_trades: usize,
    pub stop_loss_updates: u64,
    pub take_profit_updates: u64,
    pub forced_closes: u64,
    pub broker_errors: u64,
    pub realized_pnl: f64,
    pub final_balance: f64,
    pub open_positions: usize,
    pub halted: bool,
    pub interrupted: bool,
    pub suppressed_logs: u64,
}

impl RunSummary {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.trades as f64
        }
    }
}

/// Append trades to `trades.csv` in `dir`, writing the header only for a new file
pub fn write_trades(dir: &Path, trades: &[TradeRecord]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join("trades.csv");
    let file_has_data =
        path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context("Failed to open trades CSV")?;
    let mut writer = WriterBuilder::new()
        .has_headers(!file_has_data)
        .from_writer(file);

    for trade in trades {
        writer
            .serialize(trade)
            .context("Failed to write trade record")?;
    }
    writer.flush().context("Failed to flush trades writer")?;

    info!(path = %path.display(), count = trades.len(), "Trades written");
    Ok(path)
}

/// Write `summary_<run_id>.json` in `dir`
pub fn write_summary(dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(format!("summary_{}.json", summary.run_id));
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    fs::write(&path, json).context("Failed to write run summary")?;

    info!(path = %path.display(), "Run summary written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("pipguard_report_{}", uuid::Uuid::new_v4()))
    }

    fn trade(id: PositionId, pnl: f64) -> TradeRecord {
        let t = Utc.with_ymd_and_hms(2024, 3, 13, 10, 0, 0).unwrap();
        TradeRecord {
            position_id: id,
            side: Side::Long,
            volume: 1.0,
            entry_price: 1.1,
            exit_price: 1.1 + pnl / 100_000.0,
            opened_at: t,
            closed_at: t,
            pnl,
            reason: "command".to_string(),
        }
    }

    #[test]
    fn appending_keeps_a_single_header() {
        let dir = temp_dir();
        write_trades(&dir, &[trade(1, 5.0)]).unwrap();
        let path = write_trades(&dir, &[trade(2, -3.0), trade(3, 1.0)]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<TradeRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].position_id, 2);
        assert_eq!(rows[0].side, Side::Long);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn summary_round_trips_through_json() {
        let dir = temp_dir();
        let summary = RunSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            trades: 4,
            winning_trades: 3,
            ..Default::default()
        };
        let path = write_summary(&dir, &summary).unwrap();
        let loaded: RunSummary = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, summary);
        assert_eq!(loaded.win_rate(), 0.75);

        fs::remove_dir_all(&dir).ok();
    }
}
