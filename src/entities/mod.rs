// Entity Models
// Accounts are owned by an external directory; screening reads profiles and
// writes only the transfer status.

pub mod account;

pub use account::{Account, AccountDirectory, AccountLookup, AccountStatus, KycStatus};
