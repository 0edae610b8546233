use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::ids::MessageId;
use crate::message::Message;

/// Default number of rendered rows kept between render passes.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Composite identity of one rendered message.
///
/// Any edit to the message yields a different key, so stale renders are never
/// served; they simply age out under capacity pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub message_id: MessageId,
    pub timestamp: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl CacheKey {
    pub fn for_message(message: &Message) -> Self {
        Self {
            message_id: message.id,
            timestamp: message.timestamp,
            revision: message.render_revision(),
        }
    }
}

/// Insertion-ordered render cache with oldest-first eviction.
#[derive(Debug)]
pub struct RenderCache<V> {
    entries: IndexMap<CacheKey, V>,
}

impl<V> Default for RenderCache<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<V> RenderCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&V> {
        self.entries.get(key)
    }

    /// Stores `value`; re-putting an existing key keeps its original insertion slot.
    pub fn put(&mut self, key: CacheKey, value: V) {
        self.entries.insert(key, value);
    }

    /// Drops the oldest-inserted entries until at most `capacity` remain.
    pub fn evict_excess(&mut self, capacity: usize) -> usize {
        let excess = self.entries.len().saturating_sub(capacity);
        if excess > 0 {
            self.entries.drain(..excess);
            tracing::debug!(evicted = excess, capacity, "render cache trimmed");
        }
        excess
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::message::MessageKind;

    fn key(revision: u64) -> CacheKey {
        CacheKey {
            message_id: MessageId::new_v7(),
            timestamp: None,
            revision,
        }
    }

    #[test]
    fn overflow_evicts_oldest_inserted_keys() {
        let capacity = 5;
        let extra = 3;
        let keys = (0..(capacity + extra) as u64).map(key).collect::<Vec<_>>();
        let mut cache = RenderCache::new();
        for (index, key) in keys.iter().enumerate() {
            cache.put(*key, index);
        }

        let evicted = cache.evict_excess(capacity);

        assert_eq!(evicted, extra);
        assert_eq!(cache.len(), capacity);
        assert!(keys[..extra].iter().all(|key| !cache.contains(key)));
        assert!(keys[extra..].iter().all(|key| cache.contains(key)));
        assert_eq!(cache.evict_excess(capacity), 0);
    }

    #[test]
    fn reads_and_overwrites_do_not_refresh_age() {
        let keys = (0..3).map(key).collect::<Vec<_>>();
        let mut cache = RenderCache::new();
        for key in &keys {
            cache.put(*key, "row");
        }

        assert_eq!(cache.get(&keys[0]), Some(&"row"));
        cache.put(keys[0], "updated");
        cache.evict_excess(2);

        assert!(!cache.contains(&keys[0]));
        assert!(cache.contains(&keys[1]));
        assert!(cache.contains(&keys[2]));
    }

    #[test]
    fn content_edits_produce_a_new_key() {
        let mut message = Message::new(MessageId::new_v7(), MessageKind::Ai, "partial");
        let before = CacheKey::for_message(&message);

        message.content.push_str(" answer");
        let after = CacheKey::for_message(&message);

        assert_ne!(before, after);
        assert_eq!(before.message_id, after.message_id);
    }
}
