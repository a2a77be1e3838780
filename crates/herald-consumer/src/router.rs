//! Topic handler registry.
//!
//! Handlers are registered per topic before the consumer starts, so a
//! missing or duplicate registration fails at startup instead of
//! surfacing as silently dropped messages at runtime.

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use herald_core::Event;

use crate::error::{ConsumerError, Result};

/// Processes events routed from a subscribed topic.
///
/// Handlers must be idempotent: the bus delivers at-least-once, so a
/// crash between processing and commit re-delivers the same event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event. An error triggers the consumer's retry policy.
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct HandlerFn<F> {
    func: F,
}

/// Wraps an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(func: F) -> HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    HandlerFn { func }
}

#[async_trait]
impl<F, Fut> EventHandler for HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        (self.func)(event).await
    }
}

/// Maps topics to their registered handlers.
#[derive(Clone, Default)]
pub struct TopicRouter {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl TopicRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a topic.
    ///
    /// Rejects empty topic names and double registration.
    pub fn register(&mut self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) -> Result<()> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(ConsumerError::configuration("topic name cannot be empty"));
        }
        if self.handlers.contains_key(&topic) {
            return Err(ConsumerError::configuration(format!(
                "handler already registered for topic '{topic}'"
            )));
        }

        self.handlers.insert(topic, handler);
        Ok(())
    }

    /// Returns the handler registered for a topic, if any.
    pub fn handler_for(&self, topic: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(topic).cloned()
    }

    /// All registered topics.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Whether any handler has been registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter").field("topics", &self.topics()).finish()
    }
}
