//! Append-only ledgers
//!
//! Every audit trail in Arbor (decisions, file changes, activity, initiatives)
//! is one [`Ledger`]: a newline-delimited JSON file that only ever grows.
//!
//! # Guarantees
//!
//! - Records are appended as whole lines in a single write on a blocking
//!   task. Dropping the calling future does not interrupt the write, so a
//!   cancelled caller never leaves half a record behind. A torn last line
//!   left by a crash is closed off before the next record is written.
//! - Readers skip lines that do not decode and report how many were skipped;
//!   one corrupt line never hides the rest of the ledger.
//! - Current state is derived by folding the ordered records, either with
//!   [`Ledger::fold`] or through a [`Projection`].
//!
//! No cross-process locking is attempted. A single writer process is assumed.

pub mod projections;
pub mod records;

pub use projections::{ChangeGraph, InitiativeBoard, LatestDecisions};
pub use records::{
    ActivityKind, ActivityRecord, AgentSummary, BreakageRisk, ChangeRecord, ChangeType,
    DecisionKind, DecisionOutcome, DecisionRecord, InitiativeRecord, InitiativeStatus,
};

use sdk::errors::EngineError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Errors raised by ledger I/O
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode ledger record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Ledger writer task failed: {0}")]
    Writer(String),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

/// State derived from an ordered sequence of ledger records.
pub trait Projection<R> {
    fn apply(&mut self, record: &R);
}

/// Result of reading a ledger: decoded records in append order plus the
/// number of lines that failed to decode.
#[derive(Debug)]
pub struct LedgerScan<R> {
    pub records: Vec<R>,
    pub skipped_lines: usize,
}

/// An append-only JSONL ledger of `R` records.
#[derive(Debug)]
pub struct Ledger<R> {
    path: PathBuf,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Ledger<R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _record: PhantomData,
        }
    }
}

impl<R> Ledger<R>
where
    R: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as one line.
    pub async fn append(&self, record: &R) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || append_line(&path, line.as_bytes()))
            .await
            .map_err(|e| LedgerError::Writer(e.to_string()))?;

        if let Err(ref e) = result {
            error!("Ledger append failed: {}", e);
        }
        result
    }

    /// Read every decodable record in append order.
    pub async fn scan(&self) -> Result<LedgerScan<R>, LedgerError> {
        // Bytes, not a String: one garbled line must not hide the others
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerScan {
                    records: Vec::new(),
                    skipped_lines: 0,
                })
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        let mut skipped_lines = 0;
        for (number, line) in contents.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<R>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped_lines += 1;
                    warn!(
                        "Skipping unreadable line {} in {:?}: {}",
                        number + 1,
                        self.path,
                        e
                    );
                }
            }
        }

        Ok(LedgerScan {
            records,
            skipped_lines,
        })
    }

    pub async fn read_all(&self) -> Result<Vec<R>, LedgerError> {
        Ok(self.scan().await?.records)
    }

    /// The last `n` records, oldest first.
    pub async fn tail(&self, n: usize) -> Result<Vec<R>, LedgerError> {
        let mut records = self.read_all().await?;
        let start = records.len().saturating_sub(n);
        Ok(records.split_off(start))
    }

    pub async fn fold<S, F>(&self, init: S, mut f: F) -> Result<S, LedgerError>
    where
        F: FnMut(S, &R) -> S,
    {
        let records = self.read_all().await?;
        Ok(records.iter().fold(init, |state, record| f(state, record)))
    }

    pub async fn project<P>(&self) -> Result<P, LedgerError>
    where
        P: Projection<R> + Default,
    {
        self.fold(P::default(), |mut projection, record| {
            projection.apply(record);
            projection
        })
        .await
    }
}

fn append_line(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let io_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;

    // A crash can leave a torn last line; start on a fresh one
    let mut buffer = Vec::with_capacity(bytes.len() + 1);
    if ends_mid_line(&mut file).map_err(io_err)? {
        warn!("{:?} ends with a torn line, starting a new one", path);
        buffer.push(b'\n');
    }
    buffer.extend_from_slice(bytes);

    file.write_all(&buffer).map_err(io_err)?;
    file.flush().map_err(io_err)
}

fn ends_mid_line(file: &mut std::fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// The four ledgers kept under the data directory.
#[derive(Debug, Clone)]
pub struct Ledgers {
    pub decisions: Ledger<DecisionRecord>,
    pub changes: Ledger<ChangeRecord>,
    pub activity: Ledger<ActivityRecord>,
    pub initiatives: Ledger<InitiativeRecord>,
}

impl Ledgers {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            decisions: Ledger::new(data_dir.join("decisions.jsonl")),
            changes: Ledger::new(data_dir.join("changes.jsonl")),
            activity: Ledger::new(data_dir.join("activity.jsonl")),
            initiatives: Ledger::new(data_dir.join("initiatives.jsonl")),
        }
    }

    /// Decisions for one component, newest last, capped at `limit`.
    pub async fn recent_decisions_for(
        &self,
        component_id: u64,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, LedgerError> {
        let mut matching: Vec<DecisionRecord> = self
            .decisions
            .read_all()
            .await?
            .into_iter()
            .filter(|d| d.component_id == Some(component_id))
            .collect();
        let start = matching.len().saturating_sub(limit);
        Ok(matching.split_off(start))
    }

    /// Append an activity line, logging instead of failing.
    ///
    /// Activity is the secondary effect of a transition whose primary effect
    /// (the pipeline document) has already been persisted.
    pub async fn record_activity(&self, record: ActivityRecord) {
        if let Err(e) = self.activity.append(&record).await {
            error!("Activity line not recorded ({:?}): {}", record.kind, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        seq: u32,
        note: String,
    }

    fn entry(seq: u32) -> Entry {
        Entry {
            seq,
            note: format!("entry {}", seq),
        }
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order() {
        let temp = TempDir::new().unwrap();
        let ledger: Ledger<Entry> = Ledger::new(temp.path().join("test.jsonl"));

        for seq in 0..10 {
            ledger.append(&entry(seq)).await.unwrap();
        }

        let records = ledger.read_all().await.unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().enumerate().all(|(i, r)| r.seq == i as u32));
    }

    #[tokio::test]
    async fn test_corrupt_line_is_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.jsonl");
        let ledger: Ledger<Entry> = Ledger::new(&path);

        for seq in 0..3 {
            ledger.append(&entry(seq)).await.unwrap();
        }
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"seq\": 99, \"note\": \n");
        std::fs::write(&path, raw).unwrap();
        for seq in 3..5 {
            ledger.append(&entry(seq)).await.unwrap();
        }

        let scan = ledger.scan().await.unwrap();
        assert_eq!(scan.records.len(), 5);
        assert_eq!(scan.skipped_lines, 1);
        assert_eq!(scan.records[3], entry(3));
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let ledger: Ledger<Entry> = Ledger::new(temp.path().join("absent.jsonl"));

        assert!(ledger.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tail_and_fold() {
        let temp = TempDir::new().unwrap();
        let ledger: Ledger<Entry> = Ledger::new(temp.path().join("test.jsonl"));
        for seq in 1..=6 {
            ledger.append(&entry(seq)).await.unwrap();
        }

        let tail = ledger.tail(2).await.unwrap();
        assert_eq!(tail, vec![entry(5), entry(6)]);

        let sum = ledger.fold(0u32, |acc, r| acc + r.seq).await.unwrap();
        assert_eq!(sum, 21);
    }

    #[tokio::test]
    async fn test_append_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let ledger: Ledger<Entry> = Ledger::new(temp.path().join("nested/dir/test.jsonl"));

        ledger.append(&entry(1)).await.unwrap();
        assert_eq!(ledger.read_all().await.unwrap().len(), 1);
    }
}
