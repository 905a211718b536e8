//! Topic → callback fan-out.
//!
//! Registrations for the same topic accumulate and fire in registration
//! order. Removal comes in two forms: by topic (drops every callback for the
//! topic, whoever registered it) and by [`SubscriptionId`] (drops exactly
//! the callbacks one `subscribe` call added).
//!
//! Callbacks run on the session task. A callback that panics is logged and
//! skipped; the remaining callbacks and the session carry on.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::error;

/// Callback invoked with `(payload, from_address, topic)` for each publication.
pub type Callback = Arc<dyn Fn(&Value, &str, &str) + Send + Sync>;

/// Handle for the callbacks added by one `subscribe` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Clone, Default)]
pub struct SubscriptionTable {
    topics: BTreeMap<String, Vec<(SubscriptionId, Callback)>>,
    next_id: u64,
}

impl SubscriptionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to every topic in `topics` under a fresh id.
    pub fn add(&mut self, topics: &[String], callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        for topic in topics {
            self.topics
                .entry(topic.clone())
                .or_default()
                .push((id, Arc::clone(&callback)));
        }
        id
    }

    /// Drop every callback for `topic`. Returns whether the topic had any.
    pub fn remove_topic(&mut self, topic: &str) -> bool {
        self.topics.remove(topic).is_some()
    }

    /// Drop the callbacks registered under `id`.
    ///
    /// Returns the topics left without any callback, which the caller
    /// should unsubscribe from on the server.
    pub fn remove_id(&mut self, id: SubscriptionId) -> Vec<String> {
        let mut emptied = Vec::new();
        self.topics.retain(|topic, callbacks| {
            let before = callbacks.len();
            callbacks.retain(|(cb_id, _)| *cb_id != id);
            if callbacks.is_empty() && before > 0 {
                emptied.push(topic.clone());
                return false;
            }
            true
        });
        emptied
    }

    /// Invoke every callback for `topic` in registration order.
    ///
    /// Returns the number of callbacks invoked; zero means the publication
    /// was dropped.
    pub fn publish(&self, topic: &str, data: &Value, from: &str) -> usize {
        let Some(callbacks) = self.topics.get(topic) else {
            return 0;
        };
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(data, from, topic))).is_err() {
                error!(topic = %topic, subscription = ?id, "subscriptions: callback panicked");
            }
        }
        callbacks.len()
    }

    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Subscribed topics in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[path = "subscriptions_test.rs"]
mod tests;
