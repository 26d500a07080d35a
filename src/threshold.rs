// 🎚️ Policy thresholds - runtime-adjustable, globally visible
//
// Evaluations receive a `PolicyThresholds` value; the store behind it only needs
// read-after-write visibility, not a point-in-time view across a batch.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use crate::error::ScreeningError;

/// Default structuring threshold (currency units)
pub const DEFAULT_STRUCTURING_THRESHOLD: f64 = 10_000.0;

/// Policy values passed into each evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyThresholds {
    /// 24h sender total must exceed this for the structuring rule
    pub structuring_threshold: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        PolicyThresholds {
            structuring_threshold: DEFAULT_STRUCTURING_THRESHOLD,
        }
    }
}

/// Writer-synchronized source of the current policy
pub trait ThresholdStore: Send + Sync {
    fn current(&self) -> PolicyThresholds;

    /// Replace the structuring threshold, returning the new policy
    fn set_structuring_threshold(&self, value: f64) -> Result<PolicyThresholds, ScreeningError>;
}

/// In-process store backed by a `RwLock`
#[derive(Debug, Default)]
pub struct SharedThresholds {
    inner: RwLock<PolicyThresholds>,
}

impl SharedThresholds {
    pub fn new(initial: PolicyThresholds) -> Self {
        SharedThresholds {
            inner: RwLock::new(initial),
        }
    }
}

impl ThresholdStore for SharedThresholds {
    fn current(&self) -> PolicyThresholds {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_structuring_threshold(&self, value: f64) -> Result<PolicyThresholds, ScreeningError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ScreeningError::InvalidThreshold(value));
        }

        let mut policy = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let previous = policy.structuring_threshold;
        policy.structuring_threshold = value;

        tracing::info!(previous, current = value, "structuring threshold shifted");
        Ok(*policy)
    }
}
