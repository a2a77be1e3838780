//! Event consumer framework.
//!
//! Polls a message bus in batches and routes each event to the handler
//! registered for its topic. Distinct partition keys are processed
//! concurrently, a single key strictly in order. Failing handlers are
//! retried with backoff and finally dead-lettered; undecodable payloads
//! are skipped so one poison message cannot wedge a partition.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod error;
pub mod router;

pub use consumer::{
    ConsumerConfig, ConsumerFramework, ConsumerStats, DeadLetter, DeadLetterSink,
    LogDeadLetterSink, MemoryDeadLetterSink,
};
pub use error::{ConsumerError, Result};
pub use router::{handler_fn, EventHandler, HandlerFn, TopicRouter};
