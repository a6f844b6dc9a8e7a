//! In-memory stage result cache with an ordered persistence queue.

use std::collections::{HashMap, VecDeque};

/// One cached stage result, keyed by the stage's build signature.
#[derive(Debug, Clone)]
pub struct StageEntry<S> {
    /// The signature this entry was stored under.
    pub signature: String,
    /// The cached stage state.
    pub state: S,
}

/// In-memory `{stageId -> {signature -> StageEntry}}` map, plus a FIFO
/// queue of `(stageId, signature)` pairs awaiting persistence.
///
/// Entries are written eagerly to the in-memory map and queued for
/// disk persistence separately, so a task can read back its own
/// just-recorded result before the flush to disk happens.
pub struct StageCache<S> {
    entries: HashMap<String, HashMap<String, StageEntry<S>>>,
    pending_persistence: VecDeque<(String, String)>,
}

impl<S> Default for StageCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StageCache<S> {
    /// An empty stage cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            pending_persistence: VecDeque::new(),
        }
    }

    /// Look up a cached stage result by stage id and signature.
    #[must_use]
    pub fn get(&self, stage_id: &str, signature: &str) -> Option<&StageEntry<S>> {
        self.entries.get(stage_id)?.get(signature)
    }

    /// Record a stage result and queue it for persistence.
    pub fn put(&mut self, stage_id: impl Into<String>, signature: impl Into<String>, state: S) {
        let stage_id = stage_id.into();
        let signature = signature.into();
        self.entries
            .entry(stage_id.clone())
            .or_default()
            .insert(signature.clone(), StageEntry { signature: signature.clone(), state });
        self.pending_persistence.push_back((stage_id, signature));
    }

    /// All signatures currently cached for a stage.
    #[must_use]
    pub fn signatures_for_stage(&self, stage_id: &str) -> Vec<String> {
        self.entries
            .get(stage_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Pop the next `(stageId, signature)` pair awaiting persistence, in
    /// the order it was recorded.
    pub fn next_pending_persistence(&mut self) -> Option<(String, String)> {
        self.pending_persistence.pop_front()
    }

    /// Whether there is persistence work still queued.
    #[must_use]
    pub fn has_pending_persistence(&self) -> bool {
        !self.pending_persistence.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut cache: StageCache<u32> = StageCache::new();
        cache.put("compile", "sig-a", 42);
        assert_eq!(cache.get("compile", "sig-a").unwrap().state, 42);
        assert!(cache.get("compile", "sig-b").is_none());
        assert!(cache.get("other", "sig-a").is_none());
    }

    #[test]
    fn persistence_queue_is_fifo_and_drains() {
        let mut cache: StageCache<u32> = StageCache::new();
        cache.put("compile", "sig-a", 1);
        cache.put("compile", "sig-b", 2);
        assert_eq!(cache.next_pending_persistence(), Some(("compile".into(), "sig-a".into())));
        assert_eq!(cache.next_pending_persistence(), Some(("compile".into(), "sig-b".into())));
        assert_eq!(cache.next_pending_persistence(), None);
        assert!(!cache.has_pending_persistence());
    }

    #[test]
    fn overwriting_a_signature_still_queues_a_new_persistence_entry() {
        let mut cache: StageCache<u32> = StageCache::new();
        cache.put("compile", "sig-a", 1);
        cache.put("compile", "sig-a", 2);
        assert_eq!(cache.get("compile", "sig-a").unwrap().state, 2);
        assert_eq!(cache.next_pending_persistence(), Some(("compile".into(), "sig-a".into())));
        assert_eq!(cache.next_pending_persistence(), Some(("compile".into(), "sig-a".into())));
    }
}
