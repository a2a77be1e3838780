//! Message bus abstraction and in-memory implementation.
//!
//! The bus delivers at-least-once: consumer groups track a committed offset
//! per topic, a restart resumes after the last committed message, and a
//! poll without a commit re-delivers. Exactly-once user-visible effects
//! therefore require handler-level idempotency.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
    error::{CoreError, Result},
    time::Clock,
};

/// A message read from the bus, stamped with its per-topic offset.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Topic the message was published on.
    pub topic: String,

    /// Partition key scoping the ordering guarantee.
    pub key: String,

    /// Opaque payload bytes.
    pub payload: Bytes,

    /// When the producer published the message.
    pub produced_at: DateTime<Utc>,

    /// Position within the topic log, 0-based.
    pub offset: u64,
}

/// Producer and consumer operations on a message bus.
///
/// Committed offsets are "next offset to read": committing `offset + 1`
/// acknowledges the message at `offset`. Consumer connections are owned by
/// the consumer framework; producers only publish.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a message on a topic.
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()>;

    /// Returns up to `max_messages` uncommitted messages for a consumer
    /// group, across the given topics in publish order per topic.
    async fn poll(
        &self,
        group: &str,
        topics: &[String],
        max_messages: usize,
    ) -> Result<Vec<BusMessage>>;

    /// Advances the committed offset for a group on a topic.
    ///
    /// Offsets only move forward; committing behind the current position is
    /// a no-op.
    async fn commit(&self, group: &str, topic: &str, offset: u64) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredMessage {
    key: String,
    payload: Bytes,
    produced_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BusState {
    logs: HashMap<String, Vec<StoredMessage>>,
    committed: HashMap<(String, String), u64>,
}

/// In-memory bus with per-topic logs and per-group committed offsets.
///
/// Backs local runs and tests; a deployment substitutes a real broker
/// client behind the same trait.
pub struct InMemoryBus {
    clock: Arc<dyn Clock>,
    state: Mutex<BusState>,
}

impl InMemoryBus {
    /// Creates an empty bus stamping messages with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, state: Mutex::new(BusState::default()) }
    }

    /// Number of messages ever published on a topic.
    pub fn published_count(&self, topic: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.logs.get(topic).map_or(0, Vec::len)
    }

    /// Committed offset for a group on a topic, if any commit happened.
    pub fn committed_offset(&self, group: &str, topic: &str) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.committed.get(&(group.to_string(), topic.to_string())).copied()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        if topic.is_empty() {
            return Err(CoreError::invalid_input("cannot publish to an empty topic"));
        }

        let produced_at = self.clock.now_utc();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.logs.entry(topic.to_string()).or_default().push(StoredMessage {
            key: key.to_string(),
            payload,
            produced_at,
        });
        Ok(())
    }

    async fn poll(
        &self,
        group: &str,
        topics: &[String],
        max_messages: usize,
    ) -> Result<Vec<BusMessage>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut batch = Vec::new();

        for topic in topics {
            if batch.len() >= max_messages {
                break;
            }

            let Some(log) = state.logs.get(topic) else { continue };
            let start = state
                .committed
                .get(&(group.to_string(), topic.clone()))
                .copied()
                .unwrap_or(0) as usize;

            for (index, stored) in log.iter().enumerate().skip(start) {
                if batch.len() >= max_messages {
                    break;
                }
                batch.push(BusMessage {
                    topic: topic.clone(),
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                    produced_at: stored.produced_at,
                    offset: index as u64,
                });
            }
        }

        Ok(batch)
    }

    async fn commit(&self, group: &str, topic: &str, offset: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let entry = state.committed.entry((group.to_string(), topic.to_string())).or_insert(0);
        *entry = (*entry).max(offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TestClock;

    fn test_bus() -> InMemoryBus {
        InMemoryBus::new(Arc::new(TestClock::new()))
    }

    #[tokio::test]
    async fn poll_returns_messages_in_publish_order() {
        let bus = test_bus();
        for n in 0..3 {
            bus.publish("item.created", "user-42", Bytes::from(format!("{n}")))
                .await
                .expect("publish");
        }

        let topics = vec!["item.created".to_string()];
        let batch = bus.poll("workers", &topics, 10).await.expect("poll");

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].offset, 0);
        assert_eq!(batch[2].offset, 2);
        assert_eq!(batch[0].payload, Bytes::from("0"));
        assert_eq!(batch[2].payload, Bytes::from("2"));
    }

    #[tokio::test]
    async fn uncommitted_messages_are_redelivered() {
        let bus = test_bus();
        bus.publish("item.created", "k", Bytes::from("a")).await.expect("publish");

        let topics = vec!["item.created".to_string()];
        let first = bus.poll("workers", &topics, 10).await.expect("poll");
        let second = bus.poll("workers", &topics, 10).await.expect("poll");

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1, "poll without commit must re-deliver");
    }

    #[tokio::test]
    async fn commit_advances_past_consumed_messages() {
        let bus = test_bus();
        bus.publish("item.created", "k", Bytes::from("a")).await.expect("publish");
        bus.publish("item.created", "k", Bytes::from("b")).await.expect("publish");

        let topics = vec!["item.created".to_string()];
        bus.commit("workers", "item.created", 1).await.expect("commit");

        let batch = bus.poll("workers", &topics, 10).await.expect("poll");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, Bytes::from("b"));
    }

    #[tokio::test]
    async fn commit_never_moves_backwards() {
        let bus = test_bus();
        for n in 0..3 {
            bus.publish("t", "k", Bytes::from(format!("{n}"))).await.expect("publish");
        }

        bus.commit("workers", "t", 3).await.expect("commit");
        bus.commit("workers", "t", 1).await.expect("commit");

        assert_eq!(bus.committed_offset("workers", "t"), Some(3));
        let batch = bus.poll("workers", &["t".to_string()], 10).await.expect("poll");
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn groups_track_independent_offsets() {
        let bus = test_bus();
        bus.publish("t", "k", Bytes::from("a")).await.expect("publish");
        bus.commit("workers", "t", 1).await.expect("commit");

        let topics = vec!["t".to_string()];
        assert!(bus.poll("workers", &topics, 10).await.expect("poll").is_empty());
        assert_eq!(bus.poll("audit", &topics, 10).await.expect("poll").len(), 1);
    }

    #[tokio::test]
    async fn publish_rejects_empty_topic() {
        let bus = test_bus();
        let result = bus.publish("", "k", Bytes::from("a")).await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn poll_respects_batch_limit_across_topics() {
        let bus = test_bus();
        for topic in ["a", "b"] {
            for n in 0..5 {
                bus.publish(topic, "k", Bytes::from(format!("{n}"))).await.expect("publish");
            }
        }

        let topics = vec!["a".to_string(), "b".to_string()];
        let batch = bus.poll("workers", &topics, 7).await.expect("poll");
        assert_eq!(batch.len(), 7);
    }
}
