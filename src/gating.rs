// 🚧 Gating Policy - weighted risk → transfer limit
//
// score = 0.4·velocity + 0.3·geo + 0.3·proximity, each normalized to [0, 100]
// score > threshold  ⇒  account status becomes Gated_<limit>_Limit

use serde::{Deserialize, Serialize};

use crate::entities::{AccountDirectory, AccountStatus};
use crate::error::ScreeningError;

pub const DEFAULT_GATING_SCORE_THRESHOLD: f64 = 75.0;
pub const DEFAULT_GATED_LIMIT: f64 = 5_000.0;

const VELOCITY_WEIGHT: f64 = 0.4;
const GEO_WEIGHT: f64 = 0.3;
const PROXIMITY_WEIGHT: f64 = 0.3;

/// Geo entropy at which the geographic component saturates
const GEO_ENTROPY_SCALE: f64 = 10_000.0;

/// Behavioural inputs to the weighted score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSignals {
    /// Transfers per unit time; ×10 saturates at 10
    pub velocity: f64,
    pub geo_entropy: f64,
    /// 0 = the account itself is blacklisted
    pub hops_to_blacklist: u32,
}

impl RiskSignals {
    pub fn new(velocity: f64, geo_entropy: f64, hops_to_blacklist: u32) -> Self {
        RiskSignals {
            velocity,
            geo_entropy,
            hops_to_blacklist,
        }
    }

    /// Weighted score in [0, 100]
    pub fn weighted_risk(&self) -> f64 {
        let velocity = normalize(self.velocity * 10.0);
        let geo = normalize(self.geo_entropy / GEO_ENTROPY_SCALE * 100.0);
        let proximity = match self.hops_to_blacklist {
            0 => 100.0,
            hops => 100.0 / hops as f64,
        };

        let score = velocity * VELOCITY_WEIGHT + geo * GEO_WEIGHT + proximity * PROXIMITY_WEIGHT;
        score.min(100.0)
    }
}

fn normalize(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Outcome of one gating evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingDecision {
    pub account_id: String,
    pub weighted_score: f64,
    pub gated: bool,
    /// Status text after the decision (`Active`, `Gated_5000_Limit`, ...)
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatingPolicy {
    pub score_threshold: f64,
    pub limit: f64,
}

impl Default for GatingPolicy {
    fn default() -> Self {
        GatingPolicy {
            score_threshold: DEFAULT_GATING_SCORE_THRESHOLD,
            limit: DEFAULT_GATED_LIMIT,
        }
    }
}

impl GatingPolicy {
    pub fn new(score_threshold: f64, limit: f64) -> Self {
        GatingPolicy { score_threshold, limit }
    }

    /// Score `account_id` and gate it when the score exceeds the threshold.
    ///
    /// The status write goes through the directory's write lock, so it is atomic
    /// with respect to the rule engine's gating check. Below the threshold the
    /// account is left untouched (an existing gate is never lifted here).
    pub fn apply(
        &self,
        directory: &AccountDirectory,
        account_id: &str,
        signals: RiskSignals,
    ) -> Result<GatingDecision, ScreeningError> {
        let weighted_score = signals.weighted_risk();

        let account = if weighted_score > self.score_threshold {
            let account = directory.gate(account_id, self.limit)?;
            tracing::warn!(
                account = account_id,
                weighted_score,
                limit = self.limit,
                "account gated"
            );
            account
        } else {
            let account = directory
                .get(account_id)
                .ok_or_else(|| ScreeningError::AccountNotFound(account_id.to_string()))?;
            tracing::info!(account = account_id, weighted_score, "weighted risk below gating threshold");
            account
        };

        Ok(GatingDecision {
            account_id: account.id,
            weighted_score,
            gated: matches!(account.status, AccountStatus::Gated { .. }),
            status: account.status.to_string(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
