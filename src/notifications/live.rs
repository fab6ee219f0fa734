//! In-process live update channel.
//!
//! Subscribers (WebSocket connections) attach to a topic and receive every
//! message published on it afterwards. Each job has its own topic.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Namespace prefix for per-job topics.
pub const TOPIC_NAMESPACE: &str = "script_msg";

const DEFAULT_CAPACITY: usize = 64;

/// A message delivered to live subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMessage {
    pub topic: String,
    /// JSON-encoded payload.
    pub payload: String,
}

/// Topic-keyed broadcast channels.
pub struct LiveChannel {
    topics: RwLock<HashMap<String, broadcast::Sender<LiveMessage>>>,
    capacity: usize,
}

impl Default for LiveChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Topic carrying the new records of a job.
    pub fn topic_for_job(job_id: &str) -> String {
        format!("{}_{}", TOPIC_NAMESPACE, job_id)
    }

    /// Subscribe to a topic, creating it if needed.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<LiveMessage> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish a payload. Returns how many subscribers received it.
    pub async fn publish(&self, topic: &str, payload: String) -> usize {
        let topics = self.topics.read().await;
        let Some(sender) = topics.get(topic) else {
            debug!("No subscribers on {}", topic);
            return 0;
        };

        let message = LiveMessage {
            topic: topic.to_string(),
            payload,
        };
        sender.send(message).unwrap_or(0)
    }

    /// Number of live subscribers on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics.get(topic).map(|s| s.receiver_count()).unwrap_or(0)
    }

    /// Drop a topic. Existing subscribers see the channel close.
    pub async fn close_topic(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if topics.remove(topic).is_some() {
            debug!("Closed live topic {}", topic);
        }
    }
}
