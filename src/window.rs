// ⏱️ Window Aggregator - time-windowed sums and counts over a sender's history
// Feeds the structuring and velocity rules

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Result of one window scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowAggregate {
    pub sum: f64,
    pub count: usize,
    /// Sender rows excluded because their timestamp could not be parsed
    pub skipped: usize,
}

pub struct WindowAggregator;

impl WindowAggregator {
    /// Sum and count `sender_id`'s transactions with timestamp in `[window_start, window_end]`
    ///
    /// Rows with an unparsable timestamp are a data-quality anomaly: they are
    /// excluded and counted in `skipped`, never an error.
    pub fn sum_and_count(
        sender_id: &str,
        history: &[Transaction],
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
    ) -> WindowAggregate {
        let mut aggregate = WindowAggregate::default();

        for tx in history.iter().filter(|tx| tx.sender_id == sender_id) {
            let Some(ts) = tx.parsed_timestamp() else {
                aggregate.skipped += 1;
                continue;
            };

            if ts >= window_start && ts <= window_end {
                aggregate.sum += tx.amount;
                aggregate.count += 1;
            }
        }

        if aggregate.skipped > 0 {
            tracing::warn!(
                sender = sender_id,
                skipped = aggregate.skipped,
                "history rows with unparsable timestamps excluded from window"
            );
        }

        aggregate
    }
}

// ============================================================================
// TESTS
// ============================================================================
