//! Append-only trade journal and daily summaries.
//!
//! Every trade state transition becomes one JSON line in the current day's
//! `trades-YYYY-MM-DD.jsonl`. All writes funnel through a single queue task
//! so concurrent trade completions never interleave. A human-readable
//! `summary-YYYY-MM-DD.txt` is produced on day rollover and on shutdown.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::{OpportunityKind, TradeAttempt, TradeStatus};

/// One journal line: a timestamped snapshot of a trade attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub ts: DateTime<Utc>,
    pub trade: TradeAttempt,
}

enum Command {
    Record(Box<JournalLine>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle for submitting journal writes; cheap to clone.
#[derive(Clone)]
pub struct TransactionJournal {
    tx: mpsc::Sender<Command>,
}

impl TransactionJournal {
    /// Spawn the writer task. `dir` is created if missing.
    pub fn spawn(dir: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let handle = tokio::spawn(run_writer(dir, rx));
        (Self { tx }, handle)
    }

    /// Queue a state-transition snapshot. Journal loss is logged, never
    /// propagated into the trade path.
    pub async fn record(&self, trade: &TradeAttempt) {
        let line = JournalLine {
            ts: Utc::now(),
            trade: trade.clone(),
        };
        if self.tx.send(Command::Record(Box::new(line))).await.is_err() {
            error!(trade_id = %trade.id, "Journal writer gone, trade line dropped");
        }
    }

    /// Wait until everything queued so far has hit the file.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Flush, write the day summary, and stop the writer.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

#[derive(Default)]
struct KindStats {
    attempted: u32,
    completed: u32,
}

#[derive(Default)]
struct DayStats {
    attempted: u32,
    completed: u32,
    failed: u32,
    rejected: u32,
    partial: u32,
    gross_profit: Decimal,
    net_profit: Decimal,
    total_execution_ms: i64,
    timed: u32,
    by_kind: HashMap<OpportunityKind, KindStats>,
}

impl DayStats {
    /// Terminal transitions are the unit of accounting: every attempt ends
    /// in exactly one.
    fn observe(&mut self, trade: &TradeAttempt) {
        if !trade.status.is_terminal() {
            return;
        }
        self.attempted += 1;
        let kind = self.by_kind.entry(trade.kind).or_default();
        kind.attempted += 1;
        match trade.status {
            TradeStatus::Completed => {
                self.completed += 1;
                kind.completed += 1;
            }
            TradeStatus::Rejected => self.rejected += 1,
            TradeStatus::Partial => self.partial += 1,
            _ => self.failed += 1,
        }
        if let Some(profit) = trade.realized_profit {
            self.net_profit += profit;
            if profit > Decimal::ZERO {
                self.gross_profit += profit;
            }
        }
        if let Some(ms) = trade.execution_ms() {
            self.total_execution_ms += ms;
            self.timed += 1;
        }
    }

    fn render(&self, date: NaiveDate) -> String {
        let avg_ms = if self.timed > 0 {
            self.total_execution_ms / i64::from(self.timed)
        } else {
            0
        };
        let success_rate = if self.attempted > 0 {
            f64::from(self.completed) / f64::from(self.attempted) * 100.0
        } else {
            0.0
        };
        let mut out = String::new();
        out.push_str(&format!("Trade summary for {date}\n"));
        out.push_str(&format!("  attempted:     {}\n", self.attempted));
        out.push_str(&format!("  completed:     {}\n", self.completed));
        out.push_str(&format!("  failed:        {}\n", self.failed));
        out.push_str(&format!("  rejected:      {}\n", self.rejected));
        out.push_str(&format!("  partial:       {}\n", self.partial));
        out.push_str(&format!("  gross profit:  {}\n", self.gross_profit));
        out.push_str(&format!("  net profit:    {}\n", self.net_profit));
        out.push_str(&format!("  avg exec ms:   {avg_ms}\n"));
        out.push_str(&format!("  success rate:  {success_rate:.1}%\n"));
        for (kind, stats) in &self.by_kind {
            out.push_str(&format!(
                "  {}: {} attempted, {} completed\n",
                kind.as_str(),
                stats.attempted,
                stats.completed
            ));
        }
        out
    }
}

struct Writer {
    dir: PathBuf,
    day: Option<NaiveDate>,
    file: Option<File>,
    stats: DayStats,
}

impl Writer {
    fn roll_to(&mut self, date: NaiveDate) -> std::io::Result<()> {
        if self.day == Some(date) {
            return Ok(());
        }
        if let Some(previous) = self.day.take() {
            self.write_summary(previous);
            self.stats = DayStats::default();
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("trades-{date}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "Journal file opened");
        self.day = Some(date);
        self.file = Some(file);
        Ok(())
    }

    fn append(&mut self, line: &JournalLine) {
        let date = line.ts.date_naive();
        if let Err(e) = self.roll_to(date) {
            error!(error = %e, "Failed to open journal file");
            return;
        }
        self.stats.observe(&line.trade);
        let Some(file) = self.file.as_mut() else {
            return;
        };
        match serde_json::to_string(line) {
            Ok(json) => {
                if let Err(e) = writeln!(file, "{json}") {
                    error!(error = %e, "Journal write failed");
                }
            }
            Err(e) => error!(error = %e, "Journal line serialization failed"),
        }
    }

    fn write_summary(&mut self, date: NaiveDate) {
        let path = self.dir.join(format!("summary-{date}.txt"));
        if let Err(e) = fs::write(&path, self.stats.render(date)) {
            error!(error = %e, path = %path.display(), "Summary write failed");
        } else {
            info!(path = %path.display(), "Daily summary written");
        }
    }

    fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}

async fn run_writer(dir: PathBuf, mut rx: mpsc::Receiver<Command>) {
    let mut writer = Writer {
        dir,
        day: None,
        file: None,
        stats: DayStats::default(),
    };
    while let Some(command) = rx.recv().await {
        match command {
            Command::Record(line) => writer.append(&line),
            Command::Flush(ack) => {
                writer.flush();
                let _ = ack.send(());
            }
            Command::Shutdown(ack) => {
                writer.flush();
                if let Some(day) = writer.day {
                    writer.write_summary(day);
                }
                let _ = ack.send(());
                break;
            }
        }
    }
}
