// 🏷️ Compliance Rules - six deterministic risk rules
// Scores one pending transaction against account, watchlist, and history context
//
// The engine is a pure function of its inputs: it never appends to history or to
// the ledger. That is the caller's job, after a complete evaluation.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::entities::{Account, AccountLookup, AccountStatus, KycStatus};
use crate::error::ScreeningError;
use crate::graph::TransactionGraph;
use crate::threshold::PolicyThresholds;
use crate::transaction::Transaction;
use crate::watchlist::Watchlist;
use crate::window::WindowAggregator;

// ============================================================================
// POLICY CONSTANTS
// ============================================================================

pub const STRUCTURING_POINTS: u32 = 30;
pub const VELOCITY_POINTS: u32 = 20;
pub const NETWORK_POINTS: u32 = 40;
pub const PEP_MATCH_POINTS: u32 = 50;
pub const PEP_ESCALATION_POINTS: u32 = 35;
pub const PEP_MAX_POINTS: u32 = 85;
pub const JURISDICTION_POINTS: u32 = 25;
pub const KYC_POINTS: u32 = 20;

pub const STRUCTURING_WINDOW_HOURS: i64 = 24;
pub const VELOCITY_WINDOW_HOURS: i64 = 48;
/// More than this many historical sends in the velocity window triggers the rule
pub const VELOCITY_MAX_COUNT: usize = 5;
/// Expansion depth for cycle search from the receiver (paths of at most 3 edges)
pub const CYCLE_SEARCH_DEPTH: usize = 2;
/// More than this many distinct senders into one receiver flags a mule
pub const MULE_MAX_SENDERS: usize = 4;
pub const PEP_ESCALATION_AMOUNT: f64 = 20_000.0;
/// Share of declared income above which a single transfer is out of profile
pub const INCOME_RATIO_LIMIT: f64 = 0.5;

pub const STR_SCORE_THRESHOLD: u32 = 80;
pub const REVIEW_SCORE_THRESHOLD: u32 = 50;

pub const HIGH_RISK_COUNTRIES: [&str; 4] = ["Panama", "Syria", "North Korea", "Iran"];

// ============================================================================
// RISK BREAKDOWN
// ============================================================================

/// Per-rule contributions. Each value is bounded by its rule's maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub structuring: u32,
    pub velocity: u32,
    pub network: u32,
    pub pep: u32,
    pub jurisdiction: u32,
    pub kyc: u32,
}

impl RiskBreakdown {
    /// Exact sum of the six contributions (not capped at 100)
    pub fn total(&self) -> u32 {
        self.structuring + self.velocity + self.network + self.pep + self.jurisdiction + self.kyc
    }

    /// True when every contribution is within its rule's maximum
    pub fn within_caps(&self) -> bool {
        self.structuring <= STRUCTURING_POINTS
            && self.velocity <= VELOCITY_POINTS
            && self.network <= NETWORK_POINTS
            && self.pep <= PEP_MAX_POINTS
            && self.jurisdiction <= JURISDICTION_POINTS
            && self.kyc <= KYC_POINTS
    }
}

// ============================================================================
// DECISION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "Clear")]
    Clear,

    #[serde(rename = "Flag for Review")]
    FlagForReview,

    /// Suspicious Transaction Report required
    #[serde(rename = "Generate STR")]
    GenerateStr,
}

impl Decision {
    /// >80 → STR, 50..=80 → review, otherwise clear
    pub fn from_score(total_score: u32) -> Self {
        if total_score > STR_SCORE_THRESHOLD {
            Decision::GenerateStr
        } else if total_score >= REVIEW_SCORE_THRESHOLD {
            Decision::FlagForReview
        } else {
            Decision::Clear
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Clear => "Clear",
            Decision::FlagForReview => "Flag for Review",
            Decision::GenerateStr => "Generate STR",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Clear" => Ok(Decision::Clear),
            "Flag for Review" => Ok(Decision::FlagForReview),
            "Generate STR" => Ok(Decision::GenerateStr),
            other => Err(format!("Unknown decision: {}", other)),
        }
    }
}

// ============================================================================
// EVALUATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub transaction_id: String,
    pub total_score: u32,
    pub risk_breakdown: RiskBreakdown,
    pub decision: Decision,
    /// Reasons in rule order
    pub triggered_rules: Vec<String>,
    /// Closed loop `[sender, receiver, ..., sender]` when the cycle check fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_path: Option<Vec<String>>,
}

impl EvaluationResult {
    pub fn requires_str(&self) -> bool {
        self.decision == Decision::GenerateStr
    }
}

// ============================================================================
// EVALUATION CONTEXT
// ============================================================================

/// Everything one evaluation reads. Treated as an immutable snapshot.
pub struct EvaluationContext<'a> {
    pub accounts: &'a dyn AccountLookup,
    pub watchlist: &'a Watchlist,
    pub history: &'a [Transaction],
    pub graph: &'a TransactionGraph,
    pub thresholds: PolicyThresholds,
    /// Substituted when the pending transaction's timestamp is unparsable
    pub processing_time: NaiveDateTime,
}

// ============================================================================
// RULE ENGINE
// ============================================================================

pub struct RuleEngine {
    high_risk_countries: BTreeSet<String>,
}

impl RuleEngine {
    pub fn new() -> Self {
        RuleEngine {
            high_risk_countries: HIGH_RISK_COUNTRIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_high_risk_country(&self, country: &str) -> bool {
        self.high_risk_countries.contains(country)
    }

    /// Score one pending transaction
    ///
    /// Fails with `GatedAccountBreach` before any rule runs when the sender is
    /// gated and the amount exceeds its limit.
    pub fn evaluate(
        &self,
        tx: &Transaction,
        ctx: &EvaluationContext<'_>,
    ) -> Result<EvaluationResult, ScreeningError> {
        let sender = ctx.accounts.account_or_default(&tx.sender_id);

        if let AccountStatus::Gated { limit } = sender.status {
            if tx.amount > limit {
                tracing::warn!(
                    transaction_id = %tx.transaction_id,
                    account = %sender.id,
                    amount = tx.amount,
                    limit,
                    "gated account breach, transaction rejected"
                );
                return Err(ScreeningError::GatedAccountBreach {
                    account_id: sender.id,
                    amount: tx.amount,
                    limit,
                });
            }
        }

        let receiver = ctx.accounts.account_or_default(&tx.receiver_id);
        let now = tx.effective_time(ctx.processing_time);

        let mut breakdown = RiskBreakdown::default();
        let mut triggered = Vec::new();

        breakdown.structuring = self.structuring_risk(tx, now, ctx, &mut triggered);
        breakdown.velocity = self.velocity_risk(tx, now, ctx, &mut triggered);
        let (network, cycle_path) = self.network_risk(tx, ctx, &mut triggered);
        breakdown.network = network;
        breakdown.pep = self.pep_risk(tx, &sender, &receiver, ctx.watchlist, &mut triggered);
        breakdown.jurisdiction = self.jurisdiction_risk(&sender, &receiver, &mut triggered);
        breakdown.kyc = self.kyc_risk(tx, &sender, &mut triggered);

        let total_score = breakdown.total();
        let decision = Decision::from_score(total_score);

        tracing::info!(
            transaction_id = %tx.transaction_id,
            total_score,
            decision = %decision,
            rules = triggered.len(),
            "transaction evaluated"
        );

        Ok(EvaluationResult {
            transaction_id: tx.transaction_id.clone(),
            total_score,
            risk_breakdown: breakdown,
            decision,
            triggered_rules: triggered,
            cycle_path,
        })
    }

    // ========================================================================
    // RULES
    // ========================================================================

    /// Structuring: sender's 24h total, pending transaction included
    fn structuring_risk(
        &self,
        tx: &Transaction,
        now: NaiveDateTime,
        ctx: &EvaluationContext<'_>,
        triggered: &mut Vec<String>,
    ) -> u32 {
        let window = WindowAggregator::sum_and_count(
            &tx.sender_id,
            ctx.history,
            now - Duration::hours(STRUCTURING_WINDOW_HOURS),
            now,
        );

        let total = window.sum + tx.amount;
        let count = window.count + 1;
        tracing::debug!(
            transaction_id = %tx.transaction_id,
            total,
            count,
            threshold = ctx.thresholds.structuring_threshold,
            "structuring window"
        );

        if total > ctx.thresholds.structuring_threshold && count > 1 {
            triggered.push(format!(
                "Structuring: total {:.2} over {} transactions in 24h",
                total, count
            ));
            return STRUCTURING_POINTS;
        }

        0
    }

    /// Velocity: historical sends in the trailing 48h, pending transaction excluded
    fn velocity_risk(
        &self,
        tx: &Transaction,
        now: NaiveDateTime,
        ctx: &EvaluationContext<'_>,
        triggered: &mut Vec<String>,
    ) -> u32 {
        let window = WindowAggregator::sum_and_count(
            &tx.sender_id,
            ctx.history,
            now - Duration::hours(VELOCITY_WINDOW_HOURS),
            now,
        );
        tracing::debug!(transaction_id = %tx.transaction_id, count = window.count, "velocity window");

        if window.count > VELOCITY_MAX_COUNT {
            triggered.push(format!("Velocity: {} transactions in 48h", window.count));
            return VELOCITY_POINTS;
        }

        0
    }

    /// Network: cycle back to the sender first; mule fan-in only when no cycle
    fn network_risk(
        &self,
        tx: &Transaction,
        ctx: &EvaluationContext<'_>,
        triggered: &mut Vec<String>,
    ) -> (u32, Option<Vec<String>>) {
        let pending = (tx.sender_id.as_str(), tx.receiver_id.as_str());

        if let Some(path) = ctx.graph.bounded_reachable_with_edge(
            pending,
            &tx.receiver_id,
            &tx.sender_id,
            CYCLE_SEARCH_DEPTH,
        ) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(tx.sender_id.clone());
            cycle.extend(path);

            tracing::debug!(transaction_id = %tx.transaction_id, path = %cycle.join(" → "), "cycle found");
            triggered.push("Network: Circular transaction detected".to_string());
            return (NETWORK_POINTS, Some(cycle));
        }

        let mut senders: BTreeSet<&str> = ctx.graph.distinct_senders(&tx.receiver_id).into_iter().collect();
        senders.insert(tx.sender_id.as_str());
        tracing::debug!(transaction_id = %tx.transaction_id, senders = senders.len(), "no cycle, mule fan-in");

        if senders.len() > MULE_MAX_SENDERS {
            triggered.push(format!(
                "Network: Potential Mule (Received from {} unique senders)",
                senders.len()
            ));
            return (NETWORK_POINTS, None);
        }

        (0, None)
    }

    /// PEP: watchlist match on either party, escalated for high-value transfers
    fn pep_risk(
        &self,
        tx: &Transaction,
        sender: &Account,
        receiver: &Account,
        watchlist: &Watchlist,
        triggered: &mut Vec<String>,
    ) -> u32 {
        let sender_pep = watchlist.contains(&sender.name);
        let receiver_pep = watchlist.contains(&receiver.name);

        let party = match (sender_pep, receiver_pep) {
            (true, true) => "Sender and Receiver",
            (true, false) => "Sender",
            (false, true) => "Receiver",
            (false, false) => return 0,
        };
        tracing::debug!(transaction_id = %tx.transaction_id, party, "watchlist match");

        triggered.push(format!("PEP: Match found ({})", party));
        let mut points = PEP_MATCH_POINTS;

        if tx.amount > PEP_ESCALATION_AMOUNT {
            triggered.push("PEP: High-Value Transaction Escalation (> $20k)".to_string());
            points += PEP_ESCALATION_POINTS;
        }

        points.min(PEP_MAX_POINTS)
    }

    /// Jurisdiction: either party in a high-risk country
    fn jurisdiction_risk(
        &self,
        sender: &Account,
        receiver: &Account,
        triggered: &mut Vec<String>,
    ) -> u32 {
        let flagged = [sender, receiver]
            .into_iter()
            .find(|account| self.is_high_risk_country(&account.country));

        match flagged {
            Some(account) => {
                tracing::debug!(account = %account.id, country = %account.country, "high-risk jurisdiction");
                triggered.push(format!("Jurisdiction: High Risk ({})", account.country));
                JURISDICTION_POINTS
            }
            None => 0,
        }
    }

    /// KYC: incomplete onboarding or an out-of-profile amount; not additive
    fn kyc_risk(&self, tx: &Transaction, sender: &Account, triggered: &mut Vec<String>) -> u32 {
        let mut flagged = false;

        if sender.kyc_status == KycStatus::Incomplete {
            triggered.push("KYC: Status is Incomplete".to_string());
            flagged = true;
        }

        if sender.declared_income > 0.0 && tx.amount > INCOME_RATIO_LIMIT * sender.declared_income {
            triggered.push(format!(
                "KYC: Amount ({:.2}) > 50% of Income ({:.2})",
                tx.amount, sender.declared_income
            ));
            flagged = true;
        }

        tracing::debug!(transaction_id = %tx.transaction_id, account = %sender.id, flagged, "kyc check");

        if flagged {
            KYC_POINTS
        } else {
            0
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::AccountDirectory;
    use crate::transaction::parse_timestamp;
    use std::io;
    use std::sync::{Arc, Mutex};

    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    const NOW: &str = "2024-03-01 12:00:00";

    fn accounts() -> AccountDirectory {
        AccountDirectory::from_accounts(vec![
            Account::new("ACC-001", "John Doe", KycStatus::Verified, 50000.0, "USA"),
            Account::new("ACC-002", "Panama Holdings", KycStatus::Incomplete, 200000.0, "Panama"),
            Account::new("ACC-003", "Jane Smith", KycStatus::Verified, 30000.0, "USA"),
            Account::new("ACC-004", "Tehran Trading", KycStatus::Verified, 900000.0, "Iran"),
        ])
    }

    fn watchlist() -> Watchlist {
        Watchlist::from_names(["panama holdings", "politician a", "general b"])
    }

    /// Timestamp `minutes` before NOW
    fn ago(minutes: i64) -> String {
        (parse_timestamp(NOW).unwrap() - Duration::minutes(minutes))
            .format(crate::transaction::TIMESTAMP_FORMAT)
            .to_string()
    }

    fn tx(id: &str, from: &str, to: &str, amount: f64, ts: &str) -> Transaction {
        Transaction::new(id, from, to, amount, ts)
    }

    fn run(
        pending: &Transaction,
        history: &[Transaction],
        accounts: &AccountDirectory,
        thresholds: PolicyThresholds,
    ) -> Result<EvaluationResult, ScreeningError> {
        let graph = TransactionGraph::from_transactions(history);
        let watchlist = watchlist();
        let ctx = EvaluationContext {
            accounts,
            watchlist: &watchlist,
            history,
            graph: &graph,
            thresholds,
            processing_time: parse_timestamp(NOW).unwrap(),
        };
        RuleEngine::new().evaluate(pending, &ctx)
    }

    fn eval(pending: &Transaction, history: &[Transaction]) -> EvaluationResult {
        run(pending, history, &accounts(), PolicyThresholds::default()).unwrap()
    }

    // ------------------------------------------------------------------------
    // Structuring
    // ------------------------------------------------------------------------

    #[test]
    fn test_structuring_over_threshold() {
        let history = vec![
            tx("H1", "ACC-001", "ACC-003", 3000.0, &ago(120)),
            tx("H2", "ACC-001", "ACC-003", 4000.0, &ago(60)),
            tx("H3", "ACC-001", "ACC-003", 3500.0, &ago(30)),
        ];
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 500.0, NOW), &history);

        assert_eq!(result.risk_breakdown.structuring, 30);
        assert!(result.triggered_rules[0].starts_with("Structuring: total 11000.00 over 4"));
    }

    #[test]
    fn test_structuring_exact_threshold_is_not_over() {
        let history = vec![
            tx("H1", "ACC-001", "ACC-003", 3000.0, &ago(120)),
            tx("H2", "ACC-001", "ACC-003", 4000.0, &ago(60)),
            tx("H3", "ACC-001", "ACC-003", 2500.0, &ago(30)),
        ];
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 500.0, NOW), &history);

        assert_eq!(result.risk_breakdown.structuring, 0);
    }

    #[test]
    fn test_structuring_needs_more_than_one_transaction() {
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 15000.0, NOW), &[]);
        assert_eq!(result.risk_breakdown.structuring, 0);
    }

    #[test]
    fn test_structuring_ignores_rows_older_than_24h() {
        let history = vec![
            tx("H1", "ACC-001", "ACC-003", 9000.0, &ago(25 * 60)),
            tx("H2", "ACC-001", "ACC-003", 900.0, &ago(60)),
        ];
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 500.0, NOW), &history);
        assert_eq!(result.risk_breakdown.structuring, 0);
    }

    #[test]
    fn test_structuring_follows_shifted_threshold() {
        let history = vec![
            tx("H1", "ACC-001", "ACC-003", 3000.0, &ago(120)),
            tx("H2", "ACC-001", "ACC-003", 3500.0, &ago(60)),
        ];
        let pending = tx("T1", "ACC-001", "ACC-003", 1000.0, NOW);

        let default = run(&pending, &history, &accounts(), PolicyThresholds::default()).unwrap();
        assert_eq!(default.risk_breakdown.structuring, 0);

        let shifted = PolicyThresholds { structuring_threshold: 7000.0 };
        let result = run(&pending, &history, &accounts(), shifted).unwrap();
        assert_eq!(result.risk_breakdown.structuring, 30);
    }

    // ------------------------------------------------------------------------
    // Velocity
    // ------------------------------------------------------------------------

    #[test]
    fn test_velocity_more_than_five_in_48h() {
        let history: Vec<Transaction> = (0..6)
            .map(|i| tx(&format!("H{}", i), "ACC-001", "ACC-003", 1000.0, &ago(i * 120)))
            .collect();
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 1000.0, NOW), &history);

        assert_eq!(result.risk_breakdown.velocity, 20);
        assert!(result.triggered_rules.iter().any(|r| r == "Velocity: 6 transactions in 48h"));
    }

    #[test]
    fn test_velocity_excludes_pending_transaction() {
        let history: Vec<Transaction> = (0..5)
            .map(|i| tx(&format!("H{}", i), "ACC-001", "ACC-003", 100.0, &ago(i * 120)))
            .collect();
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 100.0, NOW), &history);

        assert_eq!(result.risk_breakdown.velocity, 0);
    }

    // ------------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------------

    #[test]
    fn test_circular_transaction_detected() {
        let history = vec![
            tx("H1", "ACC-001", "ACC-002", 5000.0, &ago(30)),
            tx("H2", "ACC-002", "ACC-003", 5000.0, &ago(20)),
            tx("H3", "ACC-003", "ACC-001", 5000.0, &ago(10)),
        ];
        let result = eval(&tx("T1", "ACC-001", "ACC-002", 1000.0, NOW), &history);

        assert_eq!(result.risk_breakdown.network, 40);
        let path = result.cycle_path.unwrap();
        assert_eq!(path, vec!["ACC-001", "ACC-002", "ACC-003", "ACC-001"]);
        assert!(path.len() <= 4);
        assert!(result
            .triggered_rules
            .iter()
            .any(|r| r == "Network: Circular transaction detected"));
    }

    #[test]
    fn test_rules_emit_debug_events() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer({
                let buffer = Arc::clone(&buffer);
                move || CaptureWriter(Arc::clone(&buffer))
            })
            .finish();

        let history = vec![
            tx("H1", "ACC-001", "ACC-002", 5000.0, &ago(30)),
            tx("H2", "ACC-002", "ACC-003", 5000.0, &ago(20)),
            tx("H3", "ACC-003", "ACC-001", 5000.0, &ago(10)),
        ];
        let result = tracing::subscriber::with_default(subscriber, || {
            eval(&tx("T1", "ACC-001", "ACC-002", 1000.0, NOW), &history)
        });
        assert_eq!(result.risk_breakdown.network, 40);

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        for event in ["structuring window", "velocity window", "cycle found", "kyc check"] {
            assert!(output.contains(event), "missing debug event {:?} in:\n{}", event, output);
        }
        assert!(output.contains("ACC-001 → ACC-002 → ACC-003 → ACC-001"));
    }

    #[test]
    fn test_mule_fan_in() {
        let history: Vec<Transaction> = ["S1", "S2", "S3", "S4"]
            .iter()
            .enumerate()
            .map(|(i, s)| tx(&format!("H{}", i), s, "ACC-003", 100.0, &ago(60)))
            .collect();
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 100.0, NOW), &history);

        assert_eq!(result.risk_breakdown.network, 40);
        assert!(result.cycle_path.is_none());
        assert!(result
            .triggered_rules
            .iter()
            .any(|r| r == "Network: Potential Mule (Received from 5 unique senders)"));
    }

    #[test]
    fn test_mule_counts_distinct_senders_only() {
        // Sender already among the four: set stays at four
        let history: Vec<Transaction> = ["ACC-001", "S2", "S3", "S4", "S2"]
            .iter()
            .enumerate()
            .map(|(i, s)| tx(&format!("H{}", i), s, "ACC-003", 100.0, &ago(60)))
            .collect();
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 100.0, NOW), &history);

        assert_eq!(result.risk_breakdown.network, 0);
    }

    #[test]
    fn test_cycle_and_mule_do_not_stack() {
        let mut history: Vec<Transaction> = ["S1", "S2", "S3", "S4"]
            .iter()
            .enumerate()
            .map(|(i, s)| tx(&format!("H{}", i), s, "ACC-003", 100.0, &ago(60)))
            .collect();
        history.push(tx("HC", "ACC-003", "ACC-001", 100.0, &ago(30)));

        let result = eval(&tx("T1", "ACC-001", "ACC-003", 100.0, NOW), &history);

        assert_eq!(result.risk_breakdown.network, 40);
        assert!(result.cycle_path.is_some());
        let network_rules = result
            .triggered_rules
            .iter()
            .filter(|r| r.starts_with("Network"))
            .count();
        assert_eq!(network_rules, 1);
    }

    // ------------------------------------------------------------------------
    // PEP / Jurisdiction / KYC
    // ------------------------------------------------------------------------

    #[test]
    fn test_pep_match() {
        let result = eval(&tx("T1", "ACC-002", "ACC-001", 15000.0, NOW), &[]);
        assert_eq!(result.risk_breakdown.pep, 50);
        assert!(result.triggered_rules.contains(&"PEP: Match found (Sender)".to_string()));
    }

    #[test]
    fn test_pep_high_value_escalation() {
        let result = eval(&tx("T1", "ACC-002", "ACC-001", 25000.0, NOW), &[]);

        assert_eq!(result.risk_breakdown.pep, 85);
        assert!(result.total_score > 80);
        assert_eq!(result.decision, Decision::GenerateStr);
        assert!(result.requires_str());
    }

    #[test]
    fn test_pep_receiver_side() {
        let result = eval(&tx("T1", "ACC-001", "ACC-002", 100.0, NOW), &[]);
        assert_eq!(result.risk_breakdown.pep, 50);
        assert!(result.triggered_rules.contains(&"PEP: Match found (Receiver)".to_string()));
    }

    #[test]
    fn test_jurisdiction_either_party() {
        let sender_side = eval(&tx("T1", "ACC-002", "ACC-001", 5000.0, NOW), &[]);
        assert_eq!(sender_side.risk_breakdown.jurisdiction, 25);

        let receiver_side = eval(&tx("T2", "ACC-001", "ACC-004", 100.0, NOW), &[]);
        assert_eq!(receiver_side.risk_breakdown.jurisdiction, 25);
        assert!(receiver_side
            .triggered_rules
            .contains(&"Jurisdiction: High Risk (Iran)".to_string()));
    }

    #[test]
    fn test_kyc_incomplete_and_income_not_additive() {
        // ACC-002: Incomplete KYC, income 200k; 150k is > 50%
        let result = eval(&tx("T1", "ACC-002", "ACC-001", 150000.0, NOW), &[]);

        assert_eq!(result.risk_breakdown.kyc, 20);
        let kyc_rules = result.triggered_rules.iter().filter(|r| r.starts_with("KYC")).count();
        assert_eq!(kyc_rules, 2);
    }

    #[test]
    fn test_kyc_exceeds_income() {
        let result = eval(&tx("T1", "ACC-003", "ACC-001", 16000.0, NOW), &[]);
        assert_eq!(result.risk_breakdown.kyc, 20);
        assert!(result.triggered_rules.iter().any(|r| r.contains("50% of Income")));
    }

    #[test]
    fn test_unknown_accounts_use_default_profile() {
        let result = eval(&tx("T1", "ACC-X", "ACC-Y", 100.0, NOW), &[]);

        // Incomplete KYC, no income, Unknown country, no name to match
        assert_eq!(result.risk_breakdown.kyc, 20);
        assert_eq!(result.risk_breakdown.pep, 0);
        assert_eq!(result.risk_breakdown.jurisdiction, 0);
        assert_eq!(result.total_score, 20);
        assert_eq!(result.decision, Decision::Clear);
    }

    // ------------------------------------------------------------------------
    // Scoring & decisions
    // ------------------------------------------------------------------------

    #[test]
    fn test_total_is_exact_sum() {
        let history = vec![
            tx("H1", "ACC-002", "ACC-003", 6000.0, &ago(60)),
            tx("H2", "ACC-003", "ACC-002", 6000.0, &ago(30)),
        ];
        let result = eval(&tx("T1", "ACC-002", "ACC-003", 25000.0, NOW), &history);

        let b = result.risk_breakdown;
        assert_eq!(result.total_score, b.structuring + b.velocity + b.network + b.pep + b.jurisdiction + b.kyc);
        assert!(b.within_caps());
        assert_eq!(result.decision, Decision::from_score(result.total_score));
        // structuring 30 + network 40 + pep 85 + jurisdiction 25 + kyc 20
        assert_eq!(result.total_score, 200);
    }

    #[test]
    fn test_decision_boundaries() {
        assert_eq!(Decision::from_score(0), Decision::Clear);
        assert_eq!(Decision::from_score(49), Decision::Clear);
        assert_eq!(Decision::from_score(50), Decision::FlagForReview);
        assert_eq!(Decision::from_score(80), Decision::FlagForReview);
        assert_eq!(Decision::from_score(81), Decision::GenerateStr);
        assert_eq!(Decision::from_score(220), Decision::GenerateStr);
    }

    #[test]
    fn test_decision_text_round_trip() {
        for decision in [Decision::Clear, Decision::FlagForReview, Decision::GenerateStr] {
            assert_eq!(decision.to_string().parse::<Decision>().unwrap(), decision);
        }
        assert_eq!(
            serde_json::to_string(&Decision::GenerateStr).unwrap(),
            "\"Generate STR\""
        );
    }

    #[test]
    fn test_flag_for_review_band() {
        let directory = accounts();
        directory.upsert(Account::new("ACC-005", "Politician A", KycStatus::Verified, 90000.0, "France"));

        let result = run(
            &tx("T1", "ACC-005", "ACC-001", 1000.0, NOW),
            &[],
            &directory,
            PolicyThresholds::default(),
        )
        .unwrap();

        assert_eq!(result.total_score, 50);
        assert_eq!(result.decision, Decision::FlagForReview);
    }

    // ------------------------------------------------------------------------
    // Gating short-circuit
    // ------------------------------------------------------------------------

    #[test]
    fn test_gated_account_breach() {
        let directory = accounts();
        directory.gate("ACC-001", 5000.0).unwrap();

        let err = run(
            &tx("T1", "ACC-001", "ACC-003", 6000.0, NOW),
            &[],
            &directory,
            PolicyThresholds::default(),
        )
        .unwrap_err();

        assert!(err.is_gated_breach());
        assert!(err.to_string().contains("GATED_ACCOUNT_BREACH"));
    }

    #[test]
    fn test_gated_account_at_limit_is_scored() {
        let directory = accounts();
        directory.gate("ACC-001", 5000.0).unwrap();

        let result = run(
            &tx("T1", "ACC-001", "ACC-003", 5000.0, NOW),
            &[],
            &directory,
            PolicyThresholds::default(),
        )
        .unwrap();

        assert_eq!(result.decision, Decision::Clear);
    }

    // ------------------------------------------------------------------------
    // Time handling & determinism
    // ------------------------------------------------------------------------

    #[test]
    fn test_unparsable_timestamp_uses_processing_time() {
        let history = vec![
            tx("H1", "ACC-001", "ACC-003", 6000.0, &ago(60)),
            tx("H2", "ACC-001", "ACC-003", 4500.0, &ago(30)),
        ];
        let result = eval(&tx("T1", "ACC-001", "ACC-003", 100.0, "not-a-time"), &history);

        assert_eq!(result.risk_breakdown.structuring, 30);
    }

    #[test]
    fn test_identical_inputs_identical_output() {
        let history = vec![
            tx("H1", "ACC-001", "ACC-002", 5000.0, &ago(30)),
            tx("H2", "ACC-002", "ACC-003", 5000.0, &ago(20)),
            tx("H3", "ACC-003", "ACC-001", 5000.0, &ago(10)),
            tx("H4", "ACC-002", "ACC-004", 5000.0, &ago(10)),
            tx("H5", "ACC-004", "ACC-001", 5000.0, &ago(5)),
        ];
        let pending = tx("T1", "ACC-001", "ACC-002", 21000.0, "bad timestamp");

        let first = serde_json::to_vec(&eval(&pending, &history)).unwrap();
        for _ in 0..10 {
            let again = serde_json::to_vec(&eval(&pending, &history)).unwrap();
            assert_eq!(first, again);
        }
    }
}
