use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CachedRoster {
    pub classes: serde_json::Value,
    pub fingerprint: String,
    stored_at: Instant,
}

/// Per-teacher serialized rosters, served for `ttl` after they were built.
/// A zero ttl turns the cache off.
#[derive(Debug, Default)]
pub struct RosterCache {
    ttl: Duration,
    entries: HashMap<String, CachedRoster>,
}

impl RosterCache {
    pub fn new(ttl: Duration) -> Self {
        RosterCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&CachedRoster> {
        self.entries
            .get(user_id)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
    }

    pub fn put(&mut self, user_id: &str, classes: serde_json::Value, fingerprint: String) {
        if self.ttl.is_zero() {
            return;
        }
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        self.entries.insert(
            user_id.to_string(),
            CachedRoster {
                classes,
                fingerprint,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "roster cache cleared");
        }
        self.entries.clear();
    }
}
