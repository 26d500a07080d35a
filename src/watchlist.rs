// 👁️ PEP Watchlist - politically exposed persons
// Names are normalized (trimmed, lower-cased) on insert and on lookup

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    names: HashSet<String>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut watchlist = Self::new();
        for name in names {
            watchlist.insert(name.as_ref());
        }
        watchlist
    }

    /// Add a name; blank names are ignored
    pub fn insert(&mut self, name: &str) {
        let normalized = normalize(name);
        if !normalized.is_empty() {
            self.names.insert(normalized);
        }
    }

    /// Case-insensitive membership test. Blank names never match.
    pub fn contains(&self, name: &str) -> bool {
        let normalized = normalize(name);
        !normalized.is_empty() && self.names.contains(&normalized)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
