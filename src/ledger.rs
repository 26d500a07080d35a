// 🔗 Audit Ledger - append-only, hash-chained record of every evaluation
//
// entry[n].prev_hash == entry[n-1].current_hash, entry[1].prev_hash == "GENESIS"
// current_hash = SHA-256(canonical(transaction_data) ‖ score ‖ prev_hash)
//
// Rows are never updated or deleted by this module. Any divergence between a
// recomputed hash and a stored one is proof of tampering.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::anchor::AnchorSink;
use crate::rules::Decision;

/// prev_hash of the first entry
pub const GENESIS_HASH: &str = "GENESIS";

// ============================================================================
// LEDGER ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: i64,
    pub transaction_id: String,
    /// Canonical JSON of the evaluated transaction
    pub transaction_data: String,
    pub score: u32,
    pub decision: String,
    pub prev_hash: String,
    pub current_hash: String,
    /// Filled in by the anchor worker after the append returns
    pub external_anchor_ref: Option<String>,
    pub anchor_error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Hash linkage returned to callers after an append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLink {
    pub sequence: i64,
    pub prev_hash: String,
    pub current_hash: String,
    pub external_anchor_ref: Option<String>,
}

impl From<&LedgerEntry> for LedgerLink {
    fn from(entry: &LedgerEntry) -> Self {
        LedgerLink {
            sequence: entry.sequence,
            prev_hash: entry.prev_hash.clone(),
            current_hash: entry.current_hash.clone(),
            external_anchor_ref: entry.external_anchor_ref.clone(),
        }
    }
}

// ============================================================================
// VERIFICATION STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TamperReason {
    /// Sequence numbers are not contiguous from 1
    SequenceGap { expected: i64, found: i64 },
    /// Stored prev_hash does not match the running chain
    BrokenLink,
    /// Recomputed hash differs from the stored one
    HashMismatch,
    /// Stored decision is not the one the stored score implies
    DecisionMismatch,
    /// Stored transaction ID differs from the ID inside the stored data
    TransactionIdMismatch,
    /// A column no longer holds a value of the expected type
    MalformedRow,
}

impl fmt::Display for TamperReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TamperReason::SequenceGap { expected, found } => {
                write!(f, "sequence gap: expected {}, found {}", expected, found)
            }
            TamperReason::BrokenLink => write!(f, "prev_hash does not match previous entry"),
            TamperReason::HashMismatch => write!(f, "recomputed hash does not match stored hash"),
            TamperReason::DecisionMismatch => write!(f, "decision does not match score"),
            TamperReason::TransactionIdMismatch => write!(f, "transaction ID does not match data"),
            TamperReason::MalformedRow => write!(f, "malformed row"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum LedgerStatus {
    Verified { entries: usize },
    Tampered { sequence: i64, reason: TamperReason },
}

impl LedgerStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, LedgerStatus::Verified { .. })
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerStatus::Verified { .. } => write!(f, "VERIFIED"),
            LedgerStatus::Tampered { .. } => write!(f, "TAMPERED"),
        }
    }
}

// ============================================================================
// HASHING
// ============================================================================

/// Key-order-independent JSON: object keys sorted recursively, no whitespace
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", Value::String(key.clone()), canonical_json(&map[key])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// SHA-256 over canonical data ‖ score ‖ prev_hash, lowercase hex
pub fn chain_hash(canonical_data: &str, score: i64, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}{}{}", canonical_data, score, prev_hash));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// AUDIT LEDGER
// ============================================================================

/// Pending anchor jobs; beyond this the entry is recorded without a reference
pub const ANCHOR_QUEUE_CAPACITY: usize = 1024;

/// SQLite-backed ledger. All access goes through one connection behind a mutex,
/// which gives appends a single-writer discipline. Anchoring runs on its own
/// worker thread and only takes the lock to record its result.
pub struct AuditLedger {
    conn: Arc<Mutex<Connection>>,
    anchor: Option<AnchorWorker>,
}

impl AuditLedger {
    /// Open (or create) a ledger file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open ledger database: {:?}", path.as_ref()))?;

        // WAL for crash recovery
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_ledger(&conn)?;
        Ok(AuditLedger {
            conn: Arc::new(Mutex::new(conn)),
            anchor: None,
        })
    }

    /// Forward each new hash to `sink` from a background worker
    pub fn with_anchor(mut self, sink: Box<dyn AnchorSink>) -> Self {
        match AnchorWorker::spawn(Arc::clone(&self.conn), sink) {
            Ok(worker) => self.anchor = Some(worker),
            Err(e) => tracing::warn!(error = %e, "anchor worker failed to start, anchoring disabled"),
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one evaluation. Reading the chain head and inserting happen in one
    /// SQLite transaction under the ledger lock; the anchor job is queued after
    /// the lock is released, so the returned entry never carries a reference yet.
    pub fn append(
        &self,
        transaction_id: &str,
        transaction_data: &Value,
        score: u32,
        decision: Decision,
    ) -> Result<LedgerEntry> {
        let canonical = canonical_json(transaction_data);
        let recorded_at = Utc::now();

        let (sequence, prev_hash, current_hash) = {
            let mut conn = self.lock();
            let db_tx = conn.transaction()?;

            let prev_hash = head_hash(&db_tx)?.unwrap_or_else(|| GENESIS_HASH.to_string());
            let current_hash = chain_hash(&canonical, score as i64, &prev_hash);

            db_tx.execute(
                "INSERT INTO compliance_log (
                    transaction_id, transaction_data, score, decision,
                    prev_hash, current_hash, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    transaction_id,
                    canonical,
                    score,
                    decision.as_str(),
                    prev_hash,
                    current_hash,
                    recorded_at.to_rfc3339(),
                ],
            )?;
            let sequence = db_tx.last_insert_rowid();
            db_tx.commit().context("Failed to commit ledger entry")?;
            (sequence, prev_hash, current_hash)
        };

        tracing::info!(sequence, transaction_id, hash = %current_hash, "ledger entry appended");
        self.queue_anchor(sequence, &current_hash, score);

        Ok(LedgerEntry {
            sequence,
            transaction_id: transaction_id.to_string(),
            transaction_data: canonical,
            score,
            decision: decision.as_str().to_string(),
            prev_hash,
            current_hash,
            external_anchor_ref: None,
            anchor_error: None,
            recorded_at,
        })
    }

    /// Never blocks: a full or stopped queue is recorded as a failed anchor
    fn queue_anchor(&self, sequence: i64, hash: &str, score: u32) {
        let Some(sender) = self.anchor.as_ref().and_then(|worker| worker.sender.as_ref()) else {
            return;
        };

        let job = AnchorJob::Anchor {
            sequence,
            hash: hash.to_string(),
            score,
        };
        let reason = match sender.try_send(job) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "anchor queue full",
            Err(TrySendError::Disconnected(_)) => "anchor worker stopped",
        };

        tracing::warn!(sequence, hash, reason, "external anchor skipped, entry kept without reference");
        let conn = self.lock();
        if let Err(e) = record_anchor(&conn, sequence, Err(anyhow!(reason))) {
            tracing::error!(sequence, error = %e, "failed to record anchor outcome");
        }
    }

    /// Block until every anchor job queued so far has been recorded
    pub fn sync_anchors(&self) {
        let Some(sender) = self.anchor.as_ref().and_then(|worker| worker.sender.as_ref()) else {
            return;
        };

        let (done_tx, done_rx) = bounded(1);
        if sender.send(AnchorJob::Sync(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    /// Replay the chain from genesis; the first mismatch ends the scan
    pub fn verify(&self) -> Result<LedgerStatus> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT sequence, transaction_id, transaction_data, score, decision, prev_hash, current_hash
             FROM compliance_log
             ORDER BY sequence ASC",
        )?;
        let mut rows = stmt.query([])?;

        let mut running = GENESIS_HASH.to_string();
        let mut expected_sequence = 1;
        let mut checked = 0;

        while let Some(row) = rows.next()? {
            let link = StoredLink::read(row)?;

            if let Err(reason) = link.check(expected_sequence, &running) {
                tracing::warn!(sequence = link.sequence, %reason, "ledger tampering detected");
                return Ok(LedgerStatus::Tampered {
                    sequence: link.sequence,
                    reason,
                });
            }

            running = link.current_hash.unwrap_or_default();
            expected_sequence += 1;
            checked += 1;
        }

        tracing::debug!(entries = checked, "ledger verified");
        Ok(LedgerStatus::Verified { entries: checked })
    }

    /// Hash at the head of the chain (GENESIS when empty)
    pub fn latest_hash(&self) -> Result<String> {
        let conn = self.lock();
        Ok(head_hash(&conn)?.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM compliance_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All entries in append order, with whatever anchor outcome has been recorded
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT l.sequence, l.transaction_id, l.transaction_data, l.score, l.decision,
                    l.prev_hash, l.current_hash, a.external_anchor_ref, a.anchor_error, l.recorded_at
             FROM compliance_log l
             LEFT JOIN ledger_anchors a ON a.sequence = l.sequence
             ORDER BY l.sequence ASC",
        )?;

        let entries = stmt
            .query_map([], |row| {
                let recorded_at: String = row.get(9)?;
                Ok(LedgerEntry {
                    sequence: row.get(0)?,
                    transaction_id: row.get(1)?,
                    transaction_data: row.get(2)?,
                    score: row.get(3)?,
                    decision: row.get(4)?,
                    prev_hash: row.get(5)?,
                    current_hash: row.get(6)?,
                    external_anchor_ref: row.get(7)?,
                    anchor_error: row.get(8)?,
                    recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?
                        .with_timezone(&Utc),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

fn setup_ledger(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS compliance_log (
            sequence INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id TEXT NOT NULL,
            transaction_data TEXT NOT NULL,
            score INTEGER NOT NULL,
            decision TEXT NOT NULL,
            prev_hash TEXT NOT NULL,
            current_hash TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_compliance_log_tx ON compliance_log(transaction_id)",
        [],
    )?;

    // Anchor outcomes live outside the chained rows: written later, never hashed
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_anchors (
            sequence INTEGER PRIMARY KEY,
            external_anchor_ref TEXT,
            anchor_error TEXT,
            anchored_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// First outcome wins; a ref and an error are never both set
fn record_anchor(conn: &Connection, sequence: i64, outcome: Result<String>) -> Result<()> {
    let (reference, error) = match outcome {
        Ok(reference) => (Some(reference), None),
        Err(e) => (None, Some(e.to_string())),
    };

    conn.execute(
        "INSERT OR IGNORE INTO ledger_anchors (sequence, external_anchor_ref, anchor_error, anchored_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![sequence, reference, error, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

// ============================================================================
// ANCHOR WORKER
// ============================================================================

enum AnchorJob {
    Anchor { sequence: i64, hash: String, score: u32 },
    /// Answered once every earlier job has been handled
    Sync(Sender<()>),
}

struct AnchorWorker {
    sender: Option<Sender<AnchorJob>>,
    handle: Option<JoinHandle<()>>,
}

impl AnchorWorker {
    fn spawn(conn: Arc<Mutex<Connection>>, sink: Box<dyn AnchorSink>) -> std::io::Result<Self> {
        let (sender, receiver) = bounded(ANCHOR_QUEUE_CAPACITY);
        let handle = thread::Builder::new()
            .name("ledger-anchor".to_string())
            .spawn(move || run_anchor_worker(&conn, sink.as_ref(), receiver))?;

        Ok(AnchorWorker {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

impl Drop for AnchorWorker {
    /// Closing the queue lets the worker drain what is left, then exit
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("anchor worker panicked");
            }
        }
    }
}

/// The sink is called without the ledger lock; the lock is held only to record the outcome
fn run_anchor_worker(conn: &Mutex<Connection>, sink: &dyn AnchorSink, jobs: Receiver<AnchorJob>) {
    for job in jobs.iter() {
        match job {
            AnchorJob::Anchor { sequence, hash, score } => {
                let outcome = sink.anchor(&hash, score);
                if let Err(e) = &outcome {
                    tracing::warn!(sequence, hash = %hash, error = %e, "external anchor failed, entry kept without reference");
                }

                let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = record_anchor(&conn, sequence, outcome) {
                    tracing::error!(sequence, error = %e, "failed to record anchor outcome");
                }
            }
            AnchorJob::Sync(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn head_hash(conn: &Connection) -> Result<Option<String>> {
    let hash = conn
        .query_row(
            "SELECT current_hash FROM compliance_log ORDER BY sequence DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

// ============================================================================
// STORED LINK (verification view of one row)
// ============================================================================

/// Columns read loosely: a tampered column of the wrong type is evidence, not an I/O error
struct StoredLink {
    sequence: i64,
    transaction_id: Option<String>,
    transaction_data: Option<String>,
    score: Option<i64>,
    decision: Option<String>,
    prev_hash: Option<String>,
    current_hash: Option<String>,
}

impl StoredLink {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredLink {
            sequence: row.get(0)?,
            transaction_id: text(row, 1)?,
            transaction_data: text(row, 2)?,
            score: match row.get_ref(3)? {
                ValueRef::Integer(i) => Some(i),
                _ => None,
            },
            decision: text(row, 4)?,
            prev_hash: text(row, 5)?,
            current_hash: text(row, 6)?,
        })
    }

    fn check(&self, expected_sequence: i64, running: &str) -> Result<(), TamperReason> {
        if self.sequence != expected_sequence {
            return Err(TamperReason::SequenceGap {
                expected: expected_sequence,
                found: self.sequence,
            });
        }

        let (Some(transaction_id), Some(data), Some(score), Some(decision), Some(prev_hash), Some(current_hash)) = (
            &self.transaction_id,
            &self.transaction_data,
            self.score,
            &self.decision,
            &self.prev_hash,
            &self.current_hash,
        ) else {
            return Err(TamperReason::MalformedRow);
        };

        if prev_hash != running {
            return Err(TamperReason::BrokenLink);
        }

        let data: Value = serde_json::from_str(data).map_err(|_| TamperReason::MalformedRow)?;
        if chain_hash(&canonical_json(&data), score, running) != *current_hash {
            return Err(TamperReason::HashMismatch);
        }

        let score = u32::try_from(score).map_err(|_| TamperReason::MalformedRow)?;
        if decision.parse::<Decision>().ok() != Some(Decision::from_score(score)) {
            return Err(TamperReason::DecisionMismatch);
        }

        if let Some(embedded) = data.get("Transaction_ID").and_then(Value::as_str) {
            if embedded != transaction_id {
                return Err(TamperReason::TransactionIdMismatch);
            }
        }

        Ok(())
    }
}

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
        _ => None,
    })
}

// ============================================================================
// TESTS
// ============================================================================
