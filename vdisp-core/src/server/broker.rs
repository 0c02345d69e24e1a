//! Latched publish/subscribe topics.
//!
//! Each topic retains its last published value. A new subscriber
//! receives that value first, then every later publish in order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

#[derive(Default)]
struct Topic {
    latched: Option<String>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<String>>,
}

/// In-memory topic registry shared by all connections of one server.
#[derive(Default)]
pub struct Broker {
    topics: Mutex<HashMap<String, Topic>>,
    next_id: AtomicU64,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscriber. Returns its id and the receiving half.
    pub fn subscribe(&self, topic: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut topics = self.topics();
        let entry = topics.entry(topic.to_string()).or_default();
        if let Some(value) = &entry.latched {
            let _ = tx.send(value.clone());
        }
        entry.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, topic: &str, id: u64) {
        if let Some(entry) = self.topics().get_mut(topic) {
            entry.subscribers.remove(&id);
        }
    }

    /// Retain `data` and deliver it to every live subscriber.
    pub fn publish(&self, topic: &str, data: &str) {
        let mut topics = self.topics();
        let entry = topics.entry(topic.to_string()).or_default();
        entry.latched = Some(data.to_string());
        entry
            .subscribers
            .retain(|_, tx| tx.send(data.to_string()).is_ok());
    }

    pub fn latched(&self, topic: &str) -> Option<String> {
        self.topics().get(topic).and_then(|t| t.latched.clone())
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics()
            .get(topic)
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }
}

// ── Tests ────────────────────────────────────────────────────────
