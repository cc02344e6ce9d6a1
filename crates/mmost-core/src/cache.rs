//! In-memory caches for read-mostly Mattermost entities.
//!
//! Entries live until a mutating operation on the same resource invalidates
//! them or the whole store is cleared. There is no time-based expiry;
//! correctness relies on explicit invalidation by the client.

use std::collections::HashMap;

use serde_json::Value;

/// Cache store owned by one client instance.
///
/// Three logical caches: the team list, the channel cache (per-team list
/// entries plus per-channel detail entries), and user profiles.
#[derive(Debug, Default)]
pub struct CacheStore {
    /// Teams the bot belongs to. A single entry for the whole scope.
    pub teams: Option<Vec<Value>>,
    /// Channel lists keyed by team ID.
    pub channel_lists: HashMap<String, Vec<Value>>,
    /// Channel details keyed by channel ID.
    pub channel_details: HashMap<String, Value>,
    /// User profiles keyed by user ID.
    pub users: HashMap<String, Value>,
}

impl CacheStore {
    /// Drop every cached entry unconditionally.
    pub fn clear(&mut self) {
        self.teams = None;
        self.channel_lists.clear();
        self.channel_details.clear();
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clear_resets_every_map() {
        let mut store = CacheStore::default();
        store.teams = Some(vec![json!({"id": "t1"})]);
        store
            .channel_lists
            .insert("t1".to_string(), vec![json!({"id": "c1"})]);
        store
            .channel_details
            .insert("c1".to_string(), json!({"id": "c1"}));
        store.users.insert("u1".to_string(), json!({"id": "u1"}));

        store.clear();

        assert!(store.teams.is_none());
        assert!(store.channel_lists.is_empty());
        assert!(store.channel_details.is_empty());
        assert!(store.users.is_empty());
    }
}
