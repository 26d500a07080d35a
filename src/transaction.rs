// 💸 Transaction - the unit of screening
// Immutable once created; consumed once by the rule engine, then retained in history

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Wire format for transaction timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Transaction submitted for screening
///
/// Field names follow the external interface (`Transaction_ID`, `Sender_Account_ID`, ...)
/// so the same struct reads CSV rows, API bodies, and ledger payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "Transaction_ID", default = "default_transaction_id")]
    pub transaction_id: String,

    #[serde(rename = "Sender_Account_ID")]
    pub sender_id: String,

    #[serde(rename = "Receiver_Account_ID")]
    pub receiver_id: String,

    #[serde(rename = "Amount")]
    pub amount: f64,

    /// Raw timestamp as received ("YYYY-MM-DD HH:MM:SS").
    /// Kept verbatim so the ledger records exactly what was submitted.
    #[serde(rename = "Timestamp")]
    pub timestamp: String,

    #[serde(rename = "Currency", default = "default_currency")]
    pub currency: String,
}

fn default_transaction_id() -> String {
    format!("TXN-{}", uuid::Uuid::new_v4())
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        amount: f64,
        timestamp: impl Into<String>,
    ) -> Self {
        Transaction {
            transaction_id: transaction_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            amount,
            timestamp: timestamp.into(),
            currency: default_currency(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Reject records that cannot be screened at all
    pub fn validate(&self) -> Result<()> {
        if self.sender_id.trim().is_empty() || self.receiver_id.trim().is_empty() {
            bail!("Transaction {} is missing a sender or receiver", self.transaction_id);
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            bail!(
                "Transaction {} has invalid amount {}",
                self.transaction_id,
                self.amount
            );
        }
        Ok(())
    }

    /// Parsed timestamp, or None when the raw value is unparsable
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    /// Timestamp used for scoring: the parsed value, or `fallback` (processing time)
    pub fn effective_time(&self, fallback: NaiveDateTime) -> NaiveDateTime {
        match self.parsed_timestamp() {
            Some(ts) => ts,
            None => {
                tracing::warn!(
                    transaction_id = %self.transaction_id,
                    raw = %self.timestamp,
                    "unparsable timestamp, using processing time"
                );
                fallback
            }
        }
    }

    /// JSON form recorded in the audit ledger
    pub fn to_ledger_data(&self) -> serde_json::Value {
        serde_json::json!({
            "Transaction_ID": self.transaction_id,
            "Sender_Account_ID": self.sender_id,
            "Receiver_Account_ID": self.receiver_id,
            "Amount": self.amount,
            "Timestamp": self.timestamp,
            "Currency": self.currency,
        })
    }
}

/// Parse a timestamp in the wire format, tolerating ISO-8601 variants found in history files
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Try "YYYY-MM-DD HH:MM:SS"
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(ts);
    }

    // Try fractional seconds / "T" separator
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }

    // Try RFC 3339 (normalized to UTC)
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.naive_utc())
}

// ============================================================================
// TESTS
// ============================================================================
