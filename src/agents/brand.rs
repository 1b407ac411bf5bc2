//! Brand search agent: resolves a service provider's registered brands.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::Agent;
use crate::broker::{BrokerClient, Message, Topic};
use crate::domain::{BrandDirectory, BrandQuery, BrandReply};
use crate::error::Result;

pub struct BrandSearchAgent {
    broker: Arc<dyn BrokerClient>,
    topic: Topic,
    reply_topic: String,
    directory: Arc<BrandDirectory>,
}

impl BrandSearchAgent {
    pub fn new(broker: Arc<dyn BrokerClient>, topic: Topic, directory: Arc<BrandDirectory>) -> Self {
        let reply_topic = topic.reply_name();
        Self {
            broker,
            topic,
            reply_topic,
            directory,
        }
    }
}

#[async_trait]
impl Agent for BrandSearchAgent {
    fn name(&self) -> &'static str {
        "brand-search"
    }

    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn process(&self, msg: &Message) -> Result<()> {
        let query: BrandQuery = serde_json::from_slice(&msg.payload)?;
        let brands = self.directory.search(&query.service_provider);
        debug!(
            request_id = %query.request_id,
            service_provider = %query.service_provider,
            matches = brands.len(),
            "brand lookup"
        );

        let reply = BrandReply {
            request_id: query.request_id,
            brands,
        };
        self.broker
            .publish(&self.reply_topic, serde_json::to_vec(&reply)?)
            .await
    }
}
