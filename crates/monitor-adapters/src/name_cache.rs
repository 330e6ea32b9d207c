use std::collections::HashMap;

/// Per-adapter-instance, in-memory cache mapping a provider user id to its
/// resolved display name. Evicts the oldest half of entries once `max_entries`
/// is reached rather than tracking per-entry access time — cheap and good
/// enough for a cache whose whole point is avoiding a burst of resolve calls
/// within a single poll.
pub struct NameCache {
    entries: HashMap<String, String>,
    order: Vec<String>,
    max_entries: usize,
}

impl NameCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            max_entries,
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&str> {
        self.entries.get(user_id).map(|s| s.as_str())
    }

    pub fn insert(&mut self, user_id: String, display_name: String) {
        if !self.entries.contains_key(&user_id) {
            if self.order.len() >= self.max_entries {
                let evict_count = self.order.len() / 2;
                for id in self.order.drain(..evict_count) {
                    self.entries.remove(&id);
                }
            }
            self.order.push(user_id.clone());
        }
        self.entries.insert(user_id, display_name);
    }

    /// Resolves `user_id` to a display name, falling back to the raw id on
    /// cache miss — callers supply `resolve` to perform the actual lookup
    /// and are responsible for inserting the result back via `insert`.
    pub fn resolve_or<'a>(&'a self, user_id: &'a str) -> &'a str {
        self.get(user_id).unwrap_or(user_id)
    }
}

impl Default for NameCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_inserted_name() {
        let mut cache = NameCache::new(8);
        cache.insert("U1".to_string(), "Alice".to_string());
        assert_eq!(cache.resolve_or("U1"), "Alice");
    }

    #[test]
    fn falls_back_to_raw_id_on_miss() {
        let cache = NameCache::new(8);
        assert_eq!(cache.resolve_or("U9"), "U9");
    }

    #[test]
    fn evicts_oldest_half_when_full() {
        let mut cache = NameCache::new(4);
        for i in 0..4 {
            cache.insert(format!("U{i}"), format!("Name{i}"));
        }
        cache.insert("U4".to_string(), "Name4".to_string());
        assert!(cache.get("U0").is_none());
        assert!(cache.get("U1").is_none());
        assert_eq!(cache.get("U4"), Some("Name4"));
    }
}
