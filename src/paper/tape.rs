//! Quote tape: CSV with `ts,bid,ask,open` columns
//!
//! `ts` is RFC 3339, `open` is an optional `buy`/`sell` entry request the
//! replay forwards through the entry gate.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

use crate::types::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub ts: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    #[serde(default)]
    pub open: Option<Side>,
}

/// Parse a tape, rejecting quotes out of time order
pub fn read_tape<R: Read>(reader: R) -> Result<Vec<QuoteRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut quotes: Vec<QuoteRecord> = Vec::new();
    for (line, result) in reader.deserialize().enumerate() {
        let quote: QuoteRecord =
            result.with_context(|| format!("Failed to parse quote on row {}", line + 1))?;
        if let Some(prev) = quotes.last() {
            if quote.ts < prev.ts {
                bail!(
                    "Quote on row {} at {} precedes previous quote at {}",
                    line + 1,
                    quote.ts,
                    prev.ts
                );
            }
        }
        quotes.push(quote);
    }
    Ok(quotes)
}

pub fn load_tape(path: &Path) -> Result<Vec<QuoteRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open quote tape {}", path.display()))?;
    read_tape(file)
}
