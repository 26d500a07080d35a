// 💳 Account Entity - customer profile consulted by every screening
//
// "Account ID is IDENTITY (never changes), status is a VALUE (changes over time)"
//
// The directory is owned by the outside world; the only field screening ever writes
// is `status`, and only through `AccountDirectory::set_status` / `gate`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ScreeningError;

// ============================================================================
// KYC STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KycStatus {
    /// Identity documents checked and accepted
    #[serde(alias = "verified", alias = "VERIFIED")]
    Verified,

    /// Onboarding not finished (also the profile assumed for unknown accounts)
    #[serde(alias = "incomplete", alias = "INCOMPLETE")]
    Incomplete,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Verified => "Verified",
            KycStatus::Incomplete => "Incomplete",
        }
    }
}

// ============================================================================
// ACCOUNT STATUS
// ============================================================================

/// Transfer status of an account
///
/// Text form is `Active` or `Gated_<limit>_Limit` (e.g. `Gated_5000_Limit`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccountStatus {
    Active,

    /// Transfers above `limit` are rejected before scoring
    Gated { limit: f64 },
}

impl AccountStatus {
    pub fn is_gated(&self) -> bool {
        matches!(self, AccountStatus::Gated { .. })
    }

    /// Limit in force, if gated
    pub fn limit(&self) -> Option<f64> {
        match self {
            AccountStatus::Active => None,
            AccountStatus::Gated { limit } => Some(*limit),
        }
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        AccountStatus::Active
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "Active"),
            AccountStatus::Gated { limit } => write!(f, "Gated_{}_Limit", limit),
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("active") {
            return Ok(AccountStatus::Active);
        }

        let limit = s
            .strip_prefix("Gated_")
            .and_then(|rest| rest.strip_suffix("_Limit"))
            .ok_or_else(|| format!("Unknown account status: {}", s))?;

        let limit: f64 = limit
            .parse()
            .map_err(|_| format!("Invalid gating limit in status: {}", s))?;

        if !limit.is_finite() || limit < 0.0 {
            return Err(format!("Invalid gating limit in status: {}", s));
        }

        Ok(AccountStatus::Gated { limit })
    }
}

impl TryFrom<String> for AccountStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountStatus> for String {
    fn from(status: AccountStatus) -> Self {
        status.to_string()
    }
}

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identity - NEVER changes
    #[serde(rename = "Account_ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "KYC_Status")]
    pub kyc_status: KycStatus,

    #[serde(rename = "Declared_Income", default)]
    pub declared_income: f64,

    #[serde(rename = "Country")]
    pub country: String,

    #[serde(rename = "Account_Status", default)]
    pub status: AccountStatus,

    /// Bumped on every status transition
    #[serde(skip, default = "initial_version")]
    pub version: i64,

    /// When the status last changed (None = as loaded)
    #[serde(skip)]
    pub status_changed_at: Option<DateTime<Utc>>,
}

fn initial_version() -> i64 {
    1
}

impl Account {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kyc_status: KycStatus,
        declared_income: f64,
        country: impl Into<String>,
    ) -> Self {
        Account {
            id: id.into(),
            name: name.into(),
            kyc_status,
            declared_income,
            country: country.into(),
            status: AccountStatus::Active,
            version: initial_version(),
            status_changed_at: None,
        }
    }

    /// Benign profile assumed when the directory has no record:
    /// Unknown country, Incomplete KYC, zero income, Active
    pub fn unknown(id: impl Into<String>) -> Self {
        Account::new(id, "", KycStatus::Incomplete, 0.0, "Unknown")
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }
}

// ============================================================================
// ACCOUNT LOOKUP
// ============================================================================

/// Read access to account profiles, as consumed by the rule engine
pub trait AccountLookup {
    fn account(&self, id: &str) -> Option<Account>;

    /// Profile for `id`, or the benign default when absent
    fn account_or_default(&self, id: &str) -> Account {
        self.account(id).unwrap_or_else(|| Account::unknown(id))
    }
}

impl AccountLookup for HashMap<String, Account> {
    fn account(&self, id: &str) -> Option<Account> {
        self.get(id).cloned()
    }
}

// ============================================================================
// ACCOUNT DIRECTORY
// ============================================================================

/// Shared registry of account profiles
///
/// Cloning is cheap and yields a handle to the same registry. Status transitions
/// happen under the write lock, so a concurrent reader sees either the old or the
/// new status, never a torn one.
#[derive(Clone, Default)]
pub struct AccountDirectory {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let directory = Self::new();
        for account in accounts {
            directory.upsert(account);
        }
        directory
    }

    /// Insert or replace a profile
    pub fn upsert(&self, account: Account) {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        accounts.insert(account.id.clone(), account);
    }

    pub fn get(&self, id: &str) -> Option<Account> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        accounts.get(id).cloned()
    }

    /// All profiles, sorted by ID
    pub fn all_accounts(&self) -> Vec<Account> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn count(&self) -> usize {
        self.accounts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Replace an account's status atomically, returning the updated profile
    pub fn set_status(&self, id: &str, status: AccountStatus) -> Result<Account, ScreeningError> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| ScreeningError::AccountNotFound(id.to_string()))?;

        if account.status != status {
            account.status = status;
            account.version += 1;
            account.status_changed_at = Some(Utc::now());
        }

        Ok(account.clone())
    }

    /// Gate an account at `limit`
    pub fn gate(&self, id: &str, limit: f64) -> Result<Account, ScreeningError> {
        self.set_status(id, AccountStatus::Gated { limit })
    }
}

impl AccountLookup for AccountDirectory {
    fn account(&self, id: &str) -> Option<Account> {
        self.get(id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account() -> Account {
        Account::new("ACC-001", "John Doe", KycStatus::Verified, 50000.0, "USA")
    }

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!("Active".parse::<AccountStatus>().unwrap(), AccountStatus::Active);
        assert_eq!(
            "Gated_5000_Limit".parse::<AccountStatus>().unwrap(),
            AccountStatus::Gated { limit: 5000.0 }
        );
        assert_eq!(AccountStatus::Gated { limit: 5000.0 }.to_string(), "Gated_5000_Limit");
        assert_eq!("".parse::<AccountStatus>().unwrap(), AccountStatus::Active);
    }

    #[test]
    fn test_status_rejects_garbage() {
        assert!("Frozen".parse::<AccountStatus>().is_err());
        assert!("Gated_abc_Limit".parse::<AccountStatus>().is_err());
        assert!("Gated_-5_Limit".parse::<AccountStatus>().is_err());
    }

    #[test]
    fn test_unknown_profile_is_benign_default() {
        let account = Account::unknown("ACC-404");
        assert_eq!(account.kyc_status, KycStatus::Incomplete);
        assert_eq!(account.declared_income, 0.0);
        assert_eq!(account.country, "Unknown");
        assert_eq!(account.status, AccountStatus::Active);
    }

    #[test]
    fn test_lookup_default_for_missing() {
        let directory = AccountDirectory::from_accounts(vec![sample_account()]);
        assert_eq!(directory.account_or_default("ACC-001").name, "John Doe");
        assert_eq!(directory.account_or_default("ACC-999").country, "Unknown");
    }

    #[test]
    fn test_gate_transitions_and_bumps_version() {
        let directory = AccountDirectory::from_accounts(vec![sample_account()]);

        let gated = directory.gate("ACC-001", 5000.0).unwrap();
        assert_eq!(gated.status, AccountStatus::Gated { limit: 5000.0 });
        assert_eq!(gated.version, 2);
        assert!(gated.status_changed_at.is_some());

        // Same status again is a no-op
        let again = directory.gate("ACC-001", 5000.0).unwrap();
        assert_eq!(again.version, 2);

        // Visible through any handle
        let handle = directory.clone();
        assert!(handle.get("ACC-001").unwrap().status.is_gated());
    }

    #[test]
    fn test_gate_unknown_account_fails() {
        let directory = AccountDirectory::new();
        let err = directory.gate("ACC-404", 5000.0).unwrap_err();
        assert!(matches!(err, ScreeningError::AccountNotFound(id) if id == "ACC-404"));
    }

    #[test]
    fn test_account_from_json_row() {
        let json = r#"{
            "Account_ID": "ACC-002",
            "Name": "Panama Holdings",
            "KYC_Status": "Incomplete",
            "Declared_Income": 200000,
            "Country": "Panama",
            "Account_Status": "Gated_5000_Limit"
        }"#;

        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.kyc_status, KycStatus::Incomplete);
        assert_eq!(account.status.limit(), Some(5000.0));
        assert_eq!(account.version, 1);
    }

    #[test]
    fn test_all_accounts_sorted() {
        let directory = AccountDirectory::from_accounts(vec![
            Account::unknown("ACC-003"),
            Account::unknown("ACC-001"),
            Account::unknown("ACC-002"),
        ]);
        let ids: Vec<String> = directory.all_accounts().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["ACC-001", "ACC-002", "ACC-003"]);
        assert_eq!(directory.count(), 3);
    }
}
