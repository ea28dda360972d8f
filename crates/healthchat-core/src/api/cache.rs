use std::collections::HashMap;

use super::endpoint::{Endpoint, Tag};

/// Identifies one cached query: the endpoint plus its argument, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub endpoint: Endpoint,
    pub id: Option<i64>,
}

impl QueryKey {
    pub fn new(endpoint: Endpoint, id: Option<i64>) -> Self {
        Self { endpoint, id }
    }

    pub fn path(&self) -> String {
        self.endpoint.path(self.id)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    tags: &'static [Tag],
}

/// Response cache for queries, keyed by [`QueryKey`] and invalidated by tag.
///
/// Tags are per entity type: invalidating `ChatContent` drops the content of
/// every chat, not only the one that changed.
///
/// Every invalidation bumps a per-tag generation. A fetch records the
/// generation before it goes out and stores its answer with
/// [`QueryCache::insert_if_current`], so a response that was in flight across
/// an invalidation is never cached.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, Entry>,
    generations: HashMap<Tag, u64>,
    // Bumped by `clear`, which invalidates every tag at once.
    epoch: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&serde_json::Value> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Store a query result under the tags its endpoint provides.
    pub fn insert(&mut self, key: QueryKey, value: serde_json::Value) {
        let tags = key.endpoint.spec().provides;
        self.entries.insert(key, Entry { value, tags });
    }

    /// Current generation of the tags `key` provides. Counters only grow, so
    /// the sum changes whenever any of them does.
    pub fn generation(&self, key: &QueryKey) -> u64 {
        key.endpoint
            .spec()
            .provides
            .iter()
            .map(|t| self.generations.get(t).copied().unwrap_or(0))
            .sum::<u64>()
            + self.epoch
    }

    /// Store `value` only if nothing invalidated the key's tags since
    /// `generation` was read. Returns whether the value was stored.
    pub fn insert_if_current(
        &mut self,
        key: QueryKey,
        value: serde_json::Value,
        generation: u64,
    ) -> bool {
        if self.generation(&key) != generation {
            tracing::debug!(
                endpoint = key.endpoint.name(),
                id = ?key.id,
                "discarding response invalidated while in flight"
            );
            return false;
        }
        self.insert(key, value);
        true
    }

    /// Drop every entry carrying one of `tags`. Returns the dropped keys so the
    /// caller can re-issue them.
    pub fn invalidate(&mut self, tags: &[Tag]) -> Vec<QueryKey> {
        if tags.is_empty() {
            return Vec::new();
        }
        for tag in tags {
            *self.generations.entry(*tag).or_insert(0) += 1;
        }
        let stale: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.tags.iter().any(|t| tags.contains(t)))
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            self.entries.remove(key);
        }
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), ?tags, "invalidated cached queries");
        }
        stale
    }

    pub fn remove(&mut self, key: &QueryKey) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
