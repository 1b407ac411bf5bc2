use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::topic::Topic;
use crate::error::Result;

/// A message pulled from a topic subscription.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// Consumer handle owned by exactly one agent.
///
/// `receive` on a closed consumer must return [`crate::error::DaemonError::ConsumerClosed`]
/// instead of blocking forever; the shutdown protocol relies on this.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn topic(&self) -> &Topic;

    /// Block until the next message arrives or the consumer is closed.
    async fn receive(&self) -> Result<Message>;

    /// Acknowledge a processed message back to the broker.
    async fn ack(&self, msg: &Message) -> Result<()>;

    /// Close the subscription. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Broker client handle shared by all agents and the HTTP gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Subscribe to a topic under its subscription name.
    async fn subscribe(&self, topic: &Topic) -> Result<std::sync::Arc<dyn Consumer>>;

    /// Publish a payload onto a named topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Unacknowledged message count for a topic as reported by the broker.
    async fn backlog(&self, topic: &Topic) -> Result<u64>;
}
