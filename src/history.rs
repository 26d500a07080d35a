// 📚 History Store - screened transactions, shared across evaluations
//
// One append-only log plus the graph built from it, behind a `RwLock`.
// An evaluation holds a read view for its whole duration, so it sees a fixed
// prefix of history; appends wait for open views and then push in place
// (amortized O(1), no copy of the log or the graph).

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::graph::TransactionGraph;
use crate::transaction::Transaction;

/// History and the graph built from it
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    pub transactions: Vec<Transaction>,
    pub graph: TransactionGraph,
}

impl HistorySnapshot {
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let graph = TransactionGraph::from_transactions(&transactions);
        HistorySnapshot { transactions, graph }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Read view held for one evaluation. Appends block until it is dropped.
pub type HistoryView<'a> = RwLockReadGuard<'a, HistorySnapshot>;

#[derive(Clone, Default)]
pub struct HistoryStore {
    log: Arc<RwLock<HistorySnapshot>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        HistoryStore {
            log: Arc::new(RwLock::new(HistorySnapshot::from_transactions(transactions))),
        }
    }

    /// Consistent view for one evaluation; drop it before appending on the same thread
    pub fn snapshot(&self) -> HistoryView<'_> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retain a screened transaction; the graph is updated in the same step
    pub fn append(&self, tx: Transaction) {
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        log.graph.add_edge(&tx.sender_id, &tx.receiver_id);
        log.transactions.push(tx);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
