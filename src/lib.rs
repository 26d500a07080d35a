// RegShield - AML Screening Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod anchor;       // External hash anchoring (best-effort)
pub mod config;       // File + environment configuration
pub mod entities;     // Account profiles and the shared directory
pub mod error;        // Typed screening errors
pub mod gating;       // Weighted-risk gating policy
pub mod graph;        // Sender → receiver graph, bounded search
pub mod history;      // Snapshot-isolated transaction history
pub mod ledger;       // Hash-chained audit ledger
pub mod loader;       // CSV data loading
pub mod narrative;    // STR report formatters
pub mod rules;        // Six-rule risk engine
pub mod service;      // Screening pipeline + admin operations
pub mod threshold;    // Runtime-adjustable policy thresholds
pub mod transaction;  // Transaction record
pub mod watchlist;    // PEP watchlist
pub mod window;       // Time-window aggregation

// Re-export commonly used types
pub use anchor::{AnchorSink, DigestAnchor};
pub use config::{AnchorMode, GatingConfig, ScreeningConfig};
pub use entities::{Account, AccountDirectory, AccountLookup, AccountStatus, KycStatus};
pub use error::ScreeningError;
pub use gating::{GatingDecision, GatingPolicy, RiskSignals};
pub use graph::TransactionGraph;
pub use history::{HistorySnapshot, HistoryStore, HistoryView};
pub use ledger::{
    canonical_json, chain_hash,
    AuditLedger, LedgerEntry, LedgerLink, LedgerStatus, TamperReason, GENESIS_HASH,
};
pub use loader::ScreeningData;
pub use narrative::{FormalReport, NarrativeFormatter, NarrativeProvider, NarrativeService, SummaryReport};
pub use rules::{Decision, EvaluationContext, EvaluationResult, RiskBreakdown, RuleEngine};
pub use service::{ComplianceService, Rejection, ReplayReport, ScreeningOutcome};
pub use threshold::{PolicyThresholds, SharedThresholds, ThresholdStore};
pub use transaction::Transaction;
pub use watchlist::Watchlist;
pub use window::{WindowAggregate, WindowAggregator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
