//! CSV Persistence Module
//!
//! Durable logging of emitted signals, settled trades and session snapshots.
//! The session core only talks to the `Journal` trait; the CSV layout here is
//! one possible backend and nothing in the core depends on it.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::session::SessionStats;
use crate::types::{TradeRecord, TradeSignal};

/// Collaborator receiving everything worth keeping. Implementations must not
/// propagate storage errors into the session core.
pub trait Journal: Send + Sync {
    fn log_signal(&self, signal: &TradeSignal);
    fn log_trade(&self, trade: &TradeRecord);
    fn log_session(&self, stats: &SessionStats);
}

/// Journal that drops everything, for tests and bare setups
pub struct NullJournal;

impl Journal for NullJournal {
    fn log_signal(&self, _signal: &TradeSignal) {}
    fn log_trade(&self, _trade: &TradeRecord) {}
    fn log_session(&self, _stats: &SessionStats) {}
}

/// Signal row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRow {
    pub timestamp: String,
    pub id: String,
    pub pair: String,
    pub direction: String,
    pub expiry: String,
    pub confidence: f64,
    pub reason: String,
}

/// Trade row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    pub timestamp: String,
    pub pair: String,
    pub direction: String,
    pub stake: f64,
    pub expiry: String,
    pub outcome: String,
    pub pnl: f64,
}

/// Session snapshot row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub started_at: String,
    pub stopped_at: String,
    pub state: String,
    pub session_profit: f64,
    pub trades_taken: u32,
    pub wins: u32,
    pub losses: u32,
    pub stop_reason: String,
}

/// Append-only CSV journal, one file per record kind
pub struct CsvJournal {
    signal_writer: Mutex<csv::Writer<std::fs::File>>,
    trade_writer: Mutex<csv::Writer<std::fs::File>>,
    session_writer: Mutex<csv::Writer<std::fs::File>>,
}

impl CsvJournal {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(Self {
            signal_writer: Mutex::new(Self::create_writer(&data_dir, "signals.csv")?),
            trade_writer: Mutex::new(Self::create_writer(&data_dir, "trades.csv")?),
            session_writer: Mutex::new(Self::create_writer(&data_dir, "sessions.csv")?),
        })
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    fn append<T: Serialize>(
        writer: &Mutex<csv::Writer<std::fs::File>>,
        row: &T,
        kind: &str,
    ) {
        let mut writer = match writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.serialize(row) {
            warn!(kind, error = %e, "failed to append journal row");
            return;
        }
        if let Err(e) = writer.flush() {
            warn!(kind, error = %e, "failed to flush journal writer");
        }
    }
}

impl Journal for CsvJournal {
    fn log_signal(&self, signal: &TradeSignal) {
        let row = SignalRow {
            timestamp: signal.timestamp.to_rfc3339(),
            id: signal.id.clone(),
            pair: signal.pair.clone(),
            direction: signal.direction.to_string(),
            expiry: signal.expiry.to_string(),
            confidence: signal.confidence,
            reason: signal.reason.clone(),
        };
        Self::append(&self.signal_writer, &row, "signal");
    }

    fn log_trade(&self, trade: &TradeRecord) {
        let row = TradeRow {
            timestamp: trade.timestamp.to_rfc3339(),
            pair: trade.pair.clone(),
            direction: trade.direction.to_string(),
            stake: trade.stake,
            expiry: trade.expiry.to_string(),
            outcome: trade.outcome.to_string(),
            pnl: trade.pnl,
        };
        Self::append(&self.trade_writer, &row, "trade");
    }

    fn log_session(&self, stats: &SessionStats) {
        let row = SessionRow {
            started_at: stats
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            stopped_at: stats
                .stopped_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            state: stats.state.to_string(),
            session_profit: stats.session_profit,
            trades_taken: stats.trades_taken,
            wins: stats.wins,
            losses: stats.losses,
            stop_reason: stats
                .stop_reason
                .map(|r| r.to_string())
                .unwrap_or_default(),
        };
        Self::append(&self.session_writer, &row, "session");
    }
}
