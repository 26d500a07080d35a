// 📥 Data Loader - account master, PEP watchlist, transaction log
//
// Reads three CSV files from a data directory:
//   accounts.csv      Account_ID,Name,KYC_Status,Declared_Income,Country[,Account_Status]
//   watchlist.csv     Name[,Role,Country]
//   transactions.csv  Transaction_ID,Sender_Account_ID,Receiver_Account_ID,Amount,Timestamp[,Currency]
//
// A missing file loads as empty; a malformed row is an error naming file and line.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::entities::Account;
use crate::transaction::Transaction;
use crate::watchlist::Watchlist;

pub const ACCOUNTS_FILE: &str = "accounts.csv";
pub const WATCHLIST_FILE: &str = "watchlist.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";

/// Everything screening needs from the outside world
#[derive(Debug, Clone, Default)]
pub struct ScreeningData {
    pub accounts: Vec<Account>,
    pub watchlist: Watchlist,
    pub transactions: Vec<Transaction>,
}

impl ScreeningData {
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        let accounts = load_file(&dir.join(ACCOUNTS_FILE), read_accounts)?;
        let watchlist = load_file(&dir.join(WATCHLIST_FILE), read_watchlist)?;
        let transactions = load_file(&dir.join(TRANSACTIONS_FILE), read_transactions)?;

        tracing::info!(
            dir = %dir.display(),
            accounts = accounts.len(),
            watchlist = watchlist.len(),
            transactions = transactions.len(),
            "screening data loaded"
        );

        Ok(ScreeningData {
            accounts,
            watchlist,
            transactions,
        })
    }
}

fn load_file<T: Default>(path: &Path, read: fn(File, &str) -> Result<T>) -> Result<T> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "data file not found, loading empty");
        return Ok(T::default());
    }

    let file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv");

    read(file, source)
}

pub fn read_accounts<R: Read>(reader: R, source: &str) -> Result<Vec<Account>> {
    read_records(reader, source)
}

#[derive(Debug, Deserialize)]
struct WatchlistRow {
    #[serde(rename = "Name")]
    name: String,
}

pub fn read_watchlist<R: Read>(reader: R, source: &str) -> Result<Watchlist> {
    let rows: Vec<WatchlistRow> = read_records(reader, source)?;
    Ok(Watchlist::from_names(rows.iter().map(|row| row.name.as_str())))
}

/// Transaction log rows; blank IDs and currencies get the same defaults as API input
pub fn read_transactions<R: Read>(reader: R, source: &str) -> Result<Vec<Transaction>> {
    let mut transactions: Vec<Transaction> = read_records(reader, source)?;

    for (i, tx) in transactions.iter_mut().enumerate() {
        if tx.transaction_id.trim().is_empty() {
            tx.transaction_id = format!("TXN-{}", i);
        }
        if tx.currency.trim().is_empty() {
            tx.currency = "USD".to_string();
        }
    }

    Ok(transactions)
}

fn read_records<T: DeserializeOwned, R: Read>(reader: R, source: &str) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (line_num, result) in reader.deserialize().enumerate() {
        // +2: 1-indexed plus header row
        let record = result.with_context(|| format!("Failed to parse CSV line {} in {}", line_num + 2, source))?;
        records.push(record);
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================
