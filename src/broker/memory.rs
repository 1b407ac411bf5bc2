//! In-process broker used for local runs and as the test double in
//! integration tests. Backlog accounting mirrors what a real broker
//! reports: publishes increment a topic's count, acknowledgements
//! decrement it.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::info;

use super::api::{BrokerClient, Consumer, Message};
use super::topic::Topic;
use crate::config::BrokerConfig;
use crate::error::{DaemonError, Result};

struct TopicState {
    tx: mpsc::UnboundedSender<Message>,
    // Taken by the first (and only) subscriber of the topic.
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    backlog: AtomicU64,
}

impl TopicState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            backlog: AtomicU64::new(0),
        }
    }
}

pub struct MemoryBroker {
    topics: DashMap<String, Arc<TopicState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Stand-in for a real broker connection; logs the endpoints the
    /// production client would dial.
    pub fn connect(config: &BrokerConfig) -> Arc<Self> {
        info!(
            endpoint = %config.endpoint(),
            admin_endpoint = %config.admin_endpoint(),
            partition_count = config.partition_count,
            "using in-process broker"
        );
        Arc::new(Self::new())
    }

    fn topic_state(&self, name: &str) -> Arc<TopicState> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicState::new()))
            .clone()
    }

    /// Force a topic's reported backlog. Test hook for exercising the
    /// drain protocol against stubborn counts.
    pub fn set_backlog(&self, topic: &str, count: u64) {
        self.topic_state(topic).backlog.store(count, Ordering::SeqCst);
    }

    pub fn backlog_of(&self, topic: &str) -> u64 {
        self.topic_state(topic).backlog.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn subscribe(&self, topic: &Topic) -> Result<Arc<dyn Consumer>> {
        let state = self.topic_state(&topic.name);
        let rx = state.rx.lock().await.take().ok_or_else(|| {
            DaemonError::Broker(format!("topic {} already has a subscriber", topic.name))
        })?;

        let (closed_tx, _) = watch::channel(false);
        Ok(Arc::new(MemoryConsumer {
            topic: topic.clone(),
            state,
            rx: Mutex::new(rx),
            closed: closed_tx,
        }))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let state = self.topic_state(topic);
        let message = Message::new(topic, payload);
        state
            .tx
            .send(message)
            .map_err(|_| DaemonError::Broker(format!("topic {topic} is no longer receiving")))?;
        state.backlog.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn backlog(&self, topic: &Topic) -> Result<u64> {
        Ok(self.backlog_of(&topic.name))
    }
}

pub struct MemoryConsumer {
    topic: Topic,
    state: Arc<TopicState>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    closed: watch::Sender<bool>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn receive(&self) -> Result<Message> {
        if *self.closed.borrow() {
            return Err(DaemonError::ConsumerClosed);
        }

        let mut closed = self.closed.subscribe();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = closed.wait_for(|c| *c) => Err(DaemonError::ConsumerClosed),
            msg = rx.recv() => msg.ok_or(DaemonError::ConsumerClosed),
        }
    }

    async fn ack(&self, _msg: &Message) -> Result<()> {
        // Saturating: a forced backlog override may drop below real deliveries.
        let _ = self
            .state
            .backlog
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.send_replace(true);
        Ok(())
    }
}
