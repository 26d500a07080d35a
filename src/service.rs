// 🛡️ Compliance Service - the screening pipeline
//
// snapshot → evaluate → ledger append → history append
//
// The rule engine is pure; every side effect of a screening happens here, and only
// after the evaluation has completed. A gated breach leaves no trace in the ledger
// or in history.

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::anchor::DigestAnchor;
use crate::config::{AnchorMode, ScreeningConfig};
use crate::entities::AccountDirectory;
use crate::error::ScreeningError;
use crate::gating::{GatingDecision, GatingPolicy, RiskSignals};
use crate::history::HistoryStore;
use crate::ledger::{AuditLedger, LedgerEntry, LedgerLink, LedgerStatus};
use crate::loader::ScreeningData;
use crate::narrative::NarrativeService;
use crate::rules::{EvaluationContext, EvaluationResult, RuleEngine};
use crate::threshold::{PolicyThresholds, SharedThresholds, ThresholdStore};
use crate::transaction::Transaction;
use crate::watchlist::Watchlist;

/// Result of one screening: the evaluation plus its ledger linkage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningOutcome {
    pub transaction: Transaction,
    pub evaluation: EvaluationResult,
    pub ledger: LedgerLink,
}

/// A transaction from a replayed log that was refused instead of scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub transaction_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayReport {
    pub outcomes: Vec<ScreeningOutcome>,
    pub rejected: Vec<Rejection>,
}

pub struct ComplianceService {
    engine: RuleEngine,
    accounts: AccountDirectory,
    watchlist: Watchlist,
    history: HistoryStore,
    ledger: AuditLedger,
    thresholds: Arc<dyn ThresholdStore>,
    gating: GatingPolicy,
    narratives: NarrativeService,
}

impl ComplianceService {
    pub fn new(accounts: AccountDirectory, watchlist: Watchlist, history: HistoryStore, ledger: AuditLedger) -> Self {
        ComplianceService {
            engine: RuleEngine::new(),
            accounts,
            watchlist,
            history,
            ledger,
            thresholds: Arc::new(SharedThresholds::default()),
            gating: GatingPolicy::default(),
            narratives: NarrativeService::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Arc<dyn ThresholdStore>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_gating(mut self, gating: GatingPolicy) -> Self {
        self.gating = gating;
        self
    }

    pub fn with_narratives(mut self, narratives: NarrativeService) -> Self {
        self.narratives = narratives;
        self
    }

    /// Build from configuration. With `seed_history`, the data directory's
    /// transaction log becomes pre-existing history; otherwise history starts empty
    /// (for replaying the log through the pipeline).
    pub fn from_config(config: &ScreeningConfig, seed_history: bool) -> Result<(Self, Vec<Transaction>)> {
        let data = ScreeningData::load_dir(&config.data_dir)?;

        let mut ledger = AuditLedger::open(&config.database_path)?;
        if config.anchor == AnchorMode::Digest {
            ledger = ledger.with_anchor(Box::new(DigestAnchor));
        }

        let thresholds = SharedThresholds::default();
        thresholds.set_structuring_threshold(config.structuring_threshold)?;

        let (history, pending) = if seed_history {
            (HistoryStore::from_transactions(data.transactions), Vec::new())
        } else {
            (HistoryStore::new(), data.transactions)
        };

        let service = ComplianceService::new(
            AccountDirectory::from_accounts(data.accounts),
            data.watchlist,
            history,
            ledger,
        )
        .with_thresholds(Arc::new(thresholds))
        .with_gating(GatingPolicy::from(&config.gating))
        .with_narratives(NarrativeService::from_provider(config.narrative_provider));

        Ok((service, pending))
    }

    // ========================================================================
    // SCREENING
    // ========================================================================

    /// Screen one transaction at the current processing time
    pub fn screen(&self, tx: Transaction) -> Result<ScreeningOutcome, ScreeningError> {
        self.screen_at(tx, Utc::now().naive_utc())
    }

    /// Screen with an explicit processing time (used when the timestamp is unparsable)
    pub fn screen_at(&self, tx: Transaction, processing_time: NaiveDateTime) -> Result<ScreeningOutcome, ScreeningError> {
        tx.validate()
            .map_err(|e| ScreeningError::InvalidTransaction(e.to_string()))?;

        // The view must be released before the history append below
        let evaluation = {
            let view = self.history.snapshot();
            let ctx = EvaluationContext {
                accounts: &self.accounts,
                watchlist: &self.watchlist,
                history: &view.transactions,
                graph: &view.graph,
                thresholds: self.thresholds.current(),
                processing_time,
            };
            self.engine.evaluate(&tx, &ctx)?
        };

        let entry = self.ledger.append(
            &tx.transaction_id,
            &tx.to_ledger_data(),
            evaluation.total_score,
            evaluation.decision,
        )?;
        self.history.append(tx.clone());

        Ok(ScreeningOutcome {
            transaction: tx,
            evaluation,
            ledger: LedgerLink::from(&entry),
        })
    }

    /// Screen a log in order, each transaction seeing the ones before it as history.
    /// Refusals are collected; storage failures abort the replay.
    pub fn replay(&self, transactions: Vec<Transaction>) -> Result<ReplayReport, ScreeningError> {
        let mut report = ReplayReport::default();

        for tx in transactions {
            let transaction_id = tx.transaction_id.clone();
            match self.screen(tx) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e @ (ScreeningError::GatedAccountBreach { .. } | ScreeningError::InvalidTransaction(_))) => {
                    report.rejected.push(Rejection {
                        transaction_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            screened = report.outcomes.len(),
            rejected = report.rejected.len(),
            "replay finished"
        );
        Ok(report)
    }

    /// STR text for a screened transaction
    pub fn narrate(&self, outcome: &ScreeningOutcome) -> String {
        self.narratives
            .narrate(&outcome.transaction, &outcome.evaluation.triggered_rules)
    }

    // ========================================================================
    // ADMINISTRATION
    // ========================================================================

    pub fn shift_threshold(&self, new_threshold: f64) -> Result<PolicyThresholds, ScreeningError> {
        self.thresholds.set_structuring_threshold(new_threshold)
    }

    pub fn apply_weighted_risk(&self, account_id: &str, signals: RiskSignals) -> Result<GatingDecision, ScreeningError> {
        self.gating.apply(&self.accounts, account_id, signals)
    }

    pub fn verify_ledger(&self) -> Result<LedgerStatus, ScreeningError> {
        Ok(self.ledger.verify()?)
    }

    pub fn ledger_entries(&self) -> Result<Vec<LedgerEntry>, ScreeningError> {
        Ok(self.ledger.entries()?)
    }

    pub fn thresholds(&self) -> PolicyThresholds {
        self.thresholds.current()
    }

    pub fn accounts(&self) -> &AccountDirectory {
        &self.accounts
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Account, AccountStatus, KycStatus};
    use crate::rules::Decision;
    use chrono::NaiveDateTime;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-03-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn service() -> ComplianceService {
        let accounts = AccountDirectory::from_accounts(vec![
            Account::new("ACC-001", "John Doe", KycStatus::Verified, 50000.0, "USA"),
            Account::new("ACC-002", "Panama Holdings", KycStatus::Incomplete, 200000.0, "Panama"),
            Account::new("ACC-003", "Jane Smith", KycStatus::Verified, 30000.0, "USA"),
        ]);
        let watchlist = Watchlist::from_names(["Panama Holdings"]);
        ComplianceService::new(
            accounts,
            watchlist,
            HistoryStore::new(),
            AuditLedger::open_in_memory().unwrap(),
        )
    }

    fn tx(id: &str, from: &str, to: &str, amount: f64) -> Transaction {
        Transaction::new(id, from, to, amount, "2024-03-01 11:00:00")
    }

    #[test]
    fn test_screen_appends_ledger_then_history() {
        let service = service();
        let outcome = service.screen_at(tx("TX-1", "ACC-001", "ACC-003", 100.0), now()).unwrap();

        assert_eq!(outcome.evaluation.decision, Decision::Clear);
        assert_eq!(outcome.ledger.sequence, 1);
        assert_eq!(outcome.ledger.prev_hash, "GENESIS");
        assert_eq!(service.history().len(), 1);
        assert_eq!(service.ledger().len().unwrap(), 1);
    }

    #[test]
    fn test_screening_appends_history_in_place() {
        let mut seed = Vec::with_capacity(64);
        for i in 0..10 {
            seed.push(Transaction::new(
                format!("H{}", i),
                "ACC-003",
                "ACC-001",
                10.0,
                "2024-02-20 09:00:00",
            ));
        }

        let service = ComplianceService::new(
            AccountDirectory::new(),
            Watchlist::new(),
            HistoryStore::from_transactions(seed),
            AuditLedger::open_in_memory().unwrap(),
        );
        let stored = service.history().snapshot().transactions.as_ptr();

        for i in 0..20 {
            service
                .screen_at(tx(&format!("TX-{}", i), "ACC-001", "ACC-003", 10.0), now())
                .unwrap();
        }

        assert_eq!(service.history().len(), 30);
        assert_eq!(service.history().snapshot().transactions.as_ptr(), stored);
    }

    #[test]
    fn test_gated_breach_has_no_side_effects() {
        let service = service();
        service.accounts().gate("ACC-001", 5000.0).unwrap();

        let err = service
            .screen_at(tx("TX-1", "ACC-001", "ACC-003", 6000.0), now())
            .unwrap_err();

        assert!(err.is_gated_breach());
        assert!(service.history().is_empty());
        assert_eq!(service.ledger().len().unwrap(), 0);
    }

    #[test]
    fn test_invalid_transaction_rejected() {
        let service = service();
        let err = service.screen_at(tx("TX-1", "", "ACC-003", 10.0), now()).unwrap_err();
        assert!(matches!(err, ScreeningError::InvalidTransaction(_)));
    }

    #[test]
    fn test_threshold_shift_applies_to_next_screening() {
        let service = service();
        service.screen_at(tx("TX-1", "ACC-001", "ACC-003", 4000.0), now()).unwrap();

        let before = service.screen_at(tx("TX-2", "ACC-001", "ACC-003", 4000.0), now()).unwrap();
        assert_eq!(before.evaluation.risk_breakdown.structuring, 0);

        service.shift_threshold(7000.0).unwrap();
        let after = service.screen_at(tx("TX-3", "ACC-001", "ACC-003", 100.0), now()).unwrap();
        assert_eq!(after.evaluation.risk_breakdown.structuring, 30);
    }

    #[test]
    fn test_weighted_risk_gates_for_later_screenings() {
        let service = service();
        let decision = service
            .apply_weighted_risk("ACC-003", RiskSignals::new(8.5, 9500.0, 1))
            .unwrap();
        assert!(decision.gated);
        assert_eq!(
            service.accounts().get("ACC-003").unwrap().status,
            AccountStatus::Gated { limit: 5000.0 }
        );

        assert!(service.screen_at(tx("TX-1", "ACC-003", "ACC-001", 5000.0), now()).is_ok());
        assert!(service
            .screen_at(tx("TX-2", "ACC-003", "ACC-001", 5000.01), now())
            .unwrap_err()
            .is_gated_breach());
    }

    #[test]
    fn test_replay_collects_rejections() {
        let service = service();
        service.accounts().gate("ACC-002", 1000.0).unwrap();

        let report = service
            .replay(vec![
                tx("TX-1", "ACC-001", "ACC-003", 100.0),
                tx("TX-2", "ACC-002", "ACC-001", 5000.0),
                tx("TX-3", "ACC-003", "ACC-001", 100.0),
            ])
            .unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].transaction_id, "TX-2");
        assert!(report.rejected[0].reason.starts_with("GATED_ACCOUNT_BREACH"));
        assert!(service.verify_ledger().unwrap().is_verified());
    }

    #[test]
    fn test_narrate_uses_triggered_rules() {
        let service = service();
        let outcome = service
            .screen_at(tx("TX-1", "ACC-002", "ACC-001", 25000.0), now())
            .unwrap();

        assert!(outcome.evaluation.requires_str());
        let report = service.narrate(&outcome);
        assert!(report.contains("STR-TX-1"));
        assert!(report.contains("PEP: High-Value Transaction Escalation"));
    }
}
