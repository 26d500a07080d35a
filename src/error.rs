// 🚫 Screening errors
// Typed failures surfaced to callers of the screening pipeline

use thiserror::Error;

/// Errors raised by screening, gating, and policy administration
#[derive(Error, Debug)]
pub enum ScreeningError {
    /// A gated account tried to move more than its transfer limit.
    /// Raised before any rule runs; the request is rejected, not scored.
    #[error("GATED_ACCOUNT_BREACH: account {account_id} attempted {amount:.2}, limit is {limit:.2}")]
    GatedAccountBreach {
        account_id: String,
        amount: f64,
        limit: f64,
    },

    /// Rejected before evaluation: the record cannot be screened at all
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid structuring threshold: {0} (must be a positive, finite amount)")]
    InvalidThreshold(f64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ScreeningError {
    /// True when the request was rejected by the gating short-circuit
    pub fn is_gated_breach(&self) -> bool {
        matches!(self, ScreeningError::GatedAccountBreach { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breach_message_carries_marker() {
        let err = ScreeningError::GatedAccountBreach {
            account_id: "ACC-001".to_string(),
            amount: 6000.0,
            limit: 5000.0,
        };

        assert!(err.is_gated_breach());
        assert!(err.to_string().starts_with("GATED_ACCOUNT_BREACH"));
        assert!(err.to_string().contains("ACC-001"));
    }

    #[test]
    fn test_storage_error_is_not_breach() {
        let err: ScreeningError = anyhow::anyhow!("disk full").into();
        assert!(!err.is_gated_breach());
        assert_eq!(err.to_string(), "disk full");
    }
}
