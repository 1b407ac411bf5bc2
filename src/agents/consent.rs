//! Consent search agent: answers consent lookup queries from its topic.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::Agent;
use crate::broker::{BrokerClient, Message, Topic};
use crate::domain::{ConsentQuery, ConsentReply, ConsentStore};
use crate::error::Result;

pub struct ConsentSearchAgent {
    broker: Arc<dyn BrokerClient>,
    topic: Topic,
    reply_topic: String,
    store: Arc<ConsentStore>,
}

impl ConsentSearchAgent {
    pub fn new(broker: Arc<dyn BrokerClient>, topic: Topic, store: Arc<ConsentStore>) -> Self {
        let reply_topic = topic.reply_name();
        Self {
            broker,
            topic,
            reply_topic,
            store,
        }
    }
}

#[async_trait]
impl Agent for ConsentSearchAgent {
    fn name(&self) -> &'static str {
        "consent-search"
    }

    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn process(&self, msg: &Message) -> Result<()> {
        let query: ConsentQuery = serde_json::from_slice(&msg.payload)?;
        let record = self.store.lookup(&query.recipient, query.channel);
        debug!(
            request_id = %query.request_id,
            recipient = %query.recipient,
            found = record.is_some(),
            "consent lookup"
        );

        let reply = ConsentReply {
            request_id: query.request_id,
            recipient: query.recipient,
            channel: query.channel,
            record,
        };
        self.broker
            .publish(&self.reply_topic, serde_json::to_vec(&reply)?)
            .await
    }
}
