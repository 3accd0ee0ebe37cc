use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

/// Listener invoked with the payload of a matching inbound frame.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Per-topic state held by the registry.
#[derive(Default)]
pub(crate) struct ChannelEntry {
    pub joined: bool,
    /// A join frame has been transmitted for this entry.
    pub join_sent: bool,
    listeners: HashMap<String, Vec<Callback>>,
}

impl ChannelEntry {
    pub fn add_listener(&mut self, event: &str, callback: Callback) {
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(callback);
    }

    /// Snapshot of the listeners for `event`, in registration order.
    pub fn listeners(&self, event: &str) -> Vec<Callback> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

/// Topic registry plus the set of topics whose join waits for the socket to open.
///
/// Every topic in `pending` has an entry in `channels` that is not yet joined.
#[derive(Default)]
pub(crate) struct Registry {
    channels: HashMap<String, ChannelEntry>,
    pending: HashSet<String>,
}

impl Registry {
    /// Entry for `topic`, created empty on first reference.
    pub fn ensure(&mut self, topic: &str) -> &mut ChannelEntry {
        self.channels.entry(topic.to_string()).or_default()
    }

    pub fn get(&self, topic: &str) -> Option<&ChannelEntry> {
        self.channels.get(topic)
    }

    pub fn get_mut(&mut self, topic: &str) -> Option<&mut ChannelEntry> {
        self.channels.get_mut(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.channels.contains_key(topic)
    }

    pub fn mark_pending(&mut self, topic: &str) {
        self.ensure(topic);
        self.pending.insert(topic.to_string());
    }

    pub fn is_pending(&self, topic: &str) -> bool {
        self.pending.contains(topic)
    }

    pub fn cancel_pending(&mut self, topic: &str) -> bool {
        self.pending.remove(topic)
    }

    /// Empties the pending set, returning the topics that still have an entry.
    pub fn drain_pending(&mut self) -> Vec<String> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter(|topic| self.channels.contains_key(topic))
            .collect()
    }

    pub fn pending_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.pending.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.channels.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Drops the entry and any pending join for `topic`.
    pub fn remove(&mut self, topic: &str) -> bool {
        self.pending.remove(topic);
        self.channels.remove(topic).is_some()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Callback {
        let log = log.clone();
        Arc::new(move |_| log.lock().unwrap().push(tag))
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut registry = Registry::default();
        registry.ensure("user:1").joined = true;
        assert!(registry.ensure("user:1").joined);
        assert_eq!(registry.topics(), vec!["user:1".to_string()]);
    }

    #[test]
    fn listeners_keep_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::default();
        let entry = registry.ensure("t");
        entry.add_listener("e", recording(&log, "first"));
        entry.add_listener("e", recording(&log, "second"));
        entry.add_listener("other", recording(&log, "other"));

        for cb in registry.get("t").unwrap().listeners("e") {
            cb(&Value::Null);
        }
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn drain_pending_empties_set() {
        let mut registry = Registry::default();
        registry.mark_pending("a");
        registry.mark_pending("b");
        registry.mark_pending("a");

        let mut drained = registry.drain_pending();
        drained.sort();
        assert_eq!(drained, vec!["a".to_string(), "b".to_string()]);
        assert!(registry.pending_topics().is_empty());
        assert!(registry.drain_pending().is_empty());
    }

    #[test]
    fn remove_clears_pending_membership() {
        let mut registry = Registry::default();
        registry.mark_pending("a");
        assert!(registry.remove("a"));
        assert!(!registry.is_pending("a"));
        assert!(!registry.contains("a"));
        assert!(!registry.remove("a"));
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = Registry::default();
        registry.mark_pending("a");
        registry.ensure("b");
        registry.clear();
        assert!(registry.topics().is_empty());
        assert!(registry.pending_topics().is_empty());
    }
}
