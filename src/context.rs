//! Process-wide runtime context.
//!
//! Constructed once at startup and passed by reference into every component
//! that needs it; nothing here is a free-floating global. The consumer list
//! and session handle are only mutated during startup and shutdown, both of
//! which are serialized by the lifecycle controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::broker::{BrokerClient, Consumer, Topic, TopicSet};
use crate::session::CryptoSession;

pub struct RuntimeContext {
    broker: Arc<dyn BrokerClient>,
    session: Arc<dyn CryptoSession>,
    topics: TopicSet,
    consumers: Mutex<Vec<Arc<dyn Consumer>>>,
    session_closed: AtomicBool,
}

impl RuntimeContext {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        session: Arc<dyn CryptoSession>,
        topics: TopicSet,
    ) -> Self {
        Self {
            broker,
            session,
            topics,
            consumers: Mutex::new(Vec::new()),
            session_closed: AtomicBool::new(false),
        }
    }

    pub fn broker(&self) -> Arc<dyn BrokerClient> {
        self.broker.clone()
    }

    pub fn topic_set(&self) -> &TopicSet {
        &self.topics
    }

    /// Every topic tracked for the backlog-drain condition.
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.all().into_iter().cloned().collect()
    }

    pub fn has_crypto_session(&self) -> bool {
        self.session.has_session()
    }

    /// Close the crypto session exactly once; later calls are no-ops.
    pub fn close_crypto_session(&self) {
        if self.session_closed.swap(true, Ordering::SeqCst) {
            debug!("crypto session already closed");
            return;
        }
        if self.session.has_session() {
            self.session.close_session();
        }
    }

    pub async fn register_consumer(&self, consumer: Arc<dyn Consumer>) {
        self.consumers.lock().await.push(consumer);
    }

    pub async fn active_consumers(&self) -> Vec<Arc<dyn Consumer>> {
        self.consumers.lock().await.clone()
    }

    /// Drain the consumer list for closing. A second call returns empty,
    /// which keeps the shutdown protocol idempotent.
    pub async fn take_consumers(&self) -> Vec<Arc<dyn Consumer>> {
        std::mem::take(&mut *self.consumers.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::session::StaticKeySession;

    fn context_with_session(session: StaticKeySession) -> RuntimeContext {
        RuntimeContext::new(
            Arc::new(MemoryBroker::new()),
            Arc::new(session),
            TopicSet::new(None),
        )
    }

    #[tokio::test]
    async fn test_session_close_is_idempotent() {
        let context = context_with_session(StaticKeySession::with_key("key"));
        assert!(context.has_crypto_session());

        context.close_crypto_session();
        assert!(!context.has_crypto_session());

        // Second close must not panic or re-close
        context.close_crypto_session();
    }

    #[tokio::test]
    async fn test_take_consumers_drains_once() {
        let context = context_with_session(StaticKeySession::with_key("key"));
        let broker = context.broker();
        let topic = context.topic_set().sync.clone();
        let consumer = broker.subscribe(&topic).await.expect("subscribe");
        context.register_consumer(consumer).await;

        assert_eq!(context.active_consumers().await.len(), 1);
        assert_eq!(context.take_consumers().await.len(), 1);
        assert!(context.take_consumers().await.is_empty());
    }
}
