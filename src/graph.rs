// 🕸️ Transaction Graph - who paid whom
// Directed sender → receiver graph, maintained incrementally as history grows
//
// Nodes are interned to dense indices; adjacency lists are kept sorted by account ID
// so every traversal visits neighbors in the same order and reported paths are
// reproducible for identical inputs.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::transaction::Transaction;

#[derive(Debug, Clone, Default)]
pub struct TransactionGraph {
    index: HashMap<String, usize>,
    ids: Vec<String>,
    /// Distinct receivers per node, sorted by account ID
    outgoing: Vec<Vec<usize>>,
    /// Distinct senders per node, sorted by account ID
    incoming: Vec<Vec<usize>>,
    /// Edges observed, repeats included
    edge_count: usize,
}

impl TransactionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a full history (used when loading a snapshot from disk)
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut graph = Self::new();
        for tx in transactions {
            graph.add_edge(&tx.sender_id, &tx.receiver_id);
        }
        graph
    }

    /// Record one sender → receiver edge
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from = self.intern(from);
        let to = self.intern(to);
        self.edge_count += 1;

        let ids = &self.ids;
        insert_sorted(&mut self.outgoing[from], to, ids);
        insert_sorted(&mut self.incoming[to], from, ids);
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&f), Some(&t)) => self.outgoing[f].contains(&t),
            _ => false,
        }
    }

    /// Distinct accounts that have ever paid `receiver`, sorted by ID
    pub fn distinct_senders(&self, receiver: &str) -> Vec<&str> {
        match self.index.get(receiver) {
            Some(&r) => self.incoming[r].iter().map(|&i| self.ids[i].as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Breadth-first search from `start` for `target`, expanding nodes up to `max_depth`
    ///
    /// Returns the witness path `[start, ..., target]` (at most `max_depth + 2` nodes),
    /// or None when `target` is not reachable within the bound.
    pub fn bounded_reachable(&self, start: &str, target: &str, max_depth: usize) -> Option<Vec<String>> {
        self.search(start, target, max_depth, None)
    }

    /// Same as `bounded_reachable`, with one extra `from → to` edge overlaid.
    /// Used for the pending transaction, which must not touch the shared graph.
    pub fn bounded_reachable_with_edge(
        &self,
        pending: (&str, &str),
        start: &str,
        target: &str,
        max_depth: usize,
    ) -> Option<Vec<String>> {
        self.search(start, target, max_depth, Some(pending))
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn intern(&mut self, id: &str) -> usize {
        if let Some(&i) = self.index.get(id) {
            return i;
        }
        let i = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), i);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        i
    }

    /// Neighbors of `node` in account-ID order, pending edge merged in
    fn neighbors<'a>(&'a self, node: &str, pending: Option<(&'a str, &'a str)>) -> Vec<&'a str> {
        let mut out: Vec<&'a str> = match self.index.get(node) {
            Some(&i) => self.outgoing[i].iter().map(|&j| self.ids[j].as_str()).collect(),
            None => Vec::new(),
        };

        if let Some((from, to)) = pending {
            if from == node {
                if let Err(pos) = out.binary_search(&to) {
                    out.insert(pos, to);
                }
            }
        }

        out
    }

    fn search(
        &self,
        start: &str,
        target: &str,
        max_depth: usize,
        pending: Option<(&str, &str)>,
    ) -> Option<Vec<String>> {
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut parent: HashMap<String, String> = HashMap::new();

        queue.push_back((start.to_string(), 0));
        visited.insert(start.to_string());

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            for neighbor in self.neighbors(&current, pending) {
                if neighbor == target {
                    let mut path = vec![target.to_string()];
                    let mut node = current.clone();
                    loop {
                        path.push(node.clone());
                        match parent.get(&node) {
                            Some(p) => node = p.clone(),
                            None => break,
                        }
                    }
                    path.reverse();
                    return Some(path);
                }

                if visited.insert(neighbor.to_string()) {
                    parent.insert(neighbor.to_string(), current.clone());
                    queue.push_back((neighbor.to_string(), depth + 1));
                }
            }
        }

        None
    }
}

fn insert_sorted(list: &mut Vec<usize>, node: usize, ids: &[String]) {
    if let Err(pos) = list.binary_search_by(|&slot| ids[slot].cmp(&ids[node])) {
        list.insert(pos, node);
    }
}

// ============================================================================
// TESTS
// ============================================================================
