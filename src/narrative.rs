// 📝 STR Narratives - Suspicious Transaction Report text
//
// One capability (`NarrativeFormatter`), several providers chosen by configuration.
// Every formatter reads only the transaction and the triggered rule texts, so the
// same inputs always produce the same report.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

const RULE: &str = "═══════════════════════════════════════════════════════════════════";
const SUBRULE: &str = "─────────────────────────────────────────────────────────────────";

pub trait NarrativeFormatter: Send + Sync {
    fn produce_narrative(&self, tx: &Transaction, triggered_rules: &[String]) -> Result<String>;
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// Formatter selection, as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeProvider {
    /// Sectioned regulator-facing report
    #[default]
    Formal,
    /// Short-form report for analyst queues
    Summary,
}

impl NarrativeProvider {
    pub fn build(self) -> Box<dyn NarrativeFormatter> {
        match self {
            NarrativeProvider::Formal => Box::new(FormalReport),
            NarrativeProvider::Summary => Box::new(SummaryReport),
        }
    }
}

/// Header, transaction details, violations, assessment
#[derive(Debug, Clone, Copy, Default)]
pub struct FormalReport;

impl NarrativeFormatter for FormalReport {
    fn produce_narrative(&self, tx: &Transaction, triggered_rules: &[String]) -> Result<String> {
        let mut report = String::new();

        report.push_str(RULE);
        report.push_str("\n              SUSPICIOUS TRANSACTION REPORT (STR)\n");
        report.push_str(RULE);
        report.push('\n');
        report.push_str(&format!("Report ID: STR-{}\n", tx.transaction_id));
        report.push_str("Reporting Entity: RegShield AML Compliance System\n\n");

        report.push_str(SUBRULE);
        report.push_str("\n1. TRANSACTION DETAILS\n");
        report.push_str(SUBRULE);
        report.push('\n');
        report.push_str(&format!("Transaction ID: {}\n", tx.transaction_id));
        report.push_str(&format!("Sender: {}\n", tx.sender_id));
        report.push_str(&format!("Receiver: {}\n", tx.receiver_id));
        report.push_str(&format!("Amount: ${} {}\n", format_amount(tx.amount), tx.currency));
        report.push_str(&format!("Timestamp: {}\n\n", tx.timestamp));

        report.push_str(SUBRULE);
        report.push_str("\n2. COMPLIANCE VIOLATIONS DETECTED\n");
        report.push_str(SUBRULE);
        report.push('\n');
        for rule in triggered_rules {
            report.push_str(&format!("• {}\n", rule));
        }
        report.push('\n');

        report.push_str(SUBRULE);
        report.push_str("\n3. REGULATORY ASSESSMENT\n");
        report.push_str(SUBRULE);
        report.push('\n');
        report.push_str("This transaction has been flagged for exhibiting multiple high-risk\n");
        report.push_str("indicators consistent with potential money laundering activities.\n\n");
        report.push_str("RECOMMENDATION: Enhanced Due Diligence (EDD) Required\n");
        report.push_str("ACTION: Transaction held for manual review by compliance officer\n\n");

        report.push_str(RULE);
        report.push_str("\nThis report is generated for regulatory compliance purposes only.\n");
        report.push_str(RULE);
        report.push('\n');

        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryReport;

impl NarrativeFormatter for SummaryReport {
    fn produce_narrative(&self, tx: &Transaction, triggered_rules: &[String]) -> Result<String> {
        let primary = triggered_rules
            .first()
            .map(String::as_str)
            .unwrap_or("unknown factors");

        Ok(format!(
            "SUSPICIOUS TRANSACTION REPORT (STR)\n\
             -----------------------------------\n\
             DATE: {}\n\
             TRANSACTION ID: {}\n\n\
             SUMMARY OF SUSPICION:\n\
             The following compliance rules were triggered during automated screening:\n\
             {}\n\n\
             DETAILS:\n\
             Subject Account {} initiated a transfer of {} {} to {}.\n\n\
             ANALYSIS:\n\
             The specific triggers indicate potential money laundering risks associated with {}.\n\n\
             RECOMMENDATION:\n\
             Immediate freeze recommended. Elevate to Level 2 Investigation.",
            tx.timestamp,
            tx.transaction_id,
            triggered_rules.join(", "),
            tx.sender_id,
            format_amount(tx.amount),
            tx.currency,
            tx.receiver_id,
            primary,
        ))
    }
}

/// 1234567.5 → "1,234,567.50"
fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::new();
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, cents)
}

// ============================================================================
// NARRATIVE SERVICE
// ============================================================================

/// Configured formatter with a guaranteed fallback
pub struct NarrativeService {
    primary: Box<dyn NarrativeFormatter>,
    fallback: FormalReport,
}

impl NarrativeService {
    pub fn new(primary: Box<dyn NarrativeFormatter>) -> Self {
        NarrativeService {
            primary,
            fallback: FormalReport,
        }
    }

    pub fn from_provider(provider: NarrativeProvider) -> Self {
        Self::new(provider.build())
    }

    /// Never fails: a provider error falls back to the formal report
    pub fn narrate(&self, tx: &Transaction, triggered_rules: &[String]) -> String {
        match self.primary.produce_narrative(tx, triggered_rules) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    transaction_id = %tx.transaction_id,
                    error = %e,
                    "narrative provider failed, using fallback report"
                );
                fallback_report(&self.fallback, tx, triggered_rules)
            }
        }
    }
}

impl Default for NarrativeService {
    fn default() -> Self {
        Self::from_provider(NarrativeProvider::default())
    }
}

fn fallback_report(formal: &FormalReport, tx: &Transaction, triggered_rules: &[String]) -> String {
    formal.produce_narrative(tx, triggered_rules).unwrap_or_else(|_| {
        format!(
            "STR-{}: {} → {} ({} {})\n{}",
            tx.transaction_id,
            tx.sender_id,
            tx.receiver_id,
            format_amount(tx.amount),
            tx.currency,
            triggered_rules.join("\n")
        )
    })
}

// ============================================================================
// TESTS
// ============================================================================
