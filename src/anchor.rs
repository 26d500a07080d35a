// ⚓ External anchoring - optional, best-effort
//
// An anchor sink forwards (hash, score) to an outside immutable store and returns an
// opaque reference. Local integrity never depends on it: a failure is recorded as a
// missing reference and is not retried.

use anyhow::Result;
use sha2::{Digest, Sha256};

/// Destination for ledger hashes
///
/// Called from the ledger's anchor worker thread, outside the ledger lock. A slow
/// sink only delays when its reference appears in `AuditLedger::entries`.
pub trait AnchorSink: Send + Sync {
    fn anchor(&self, hash: &str, score: u32) -> Result<String>;
}

/// Offline stand-in for a chain anchor: `0x` + first 40 hex chars of SHA-256(hash ‖ score)
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestAnchor;

impl AnchorSink for DigestAnchor {
    fn anchor(&self, hash: &str, score: u32) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}{}", hash, score));
        let digest = format!("{:x}", hasher.finalize());
        Ok(format!("0x{}", &digest[..40]))
    }
}
