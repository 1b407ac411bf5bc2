//! Sync response agent: applies consent submissions arriving in batches
//! and emits a receipt for each batch.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::Agent;
use crate::broker::{BrokerClient, Message, Topic};
use crate::domain::{ConsentRecord, ConsentStore, SyncBatch, SyncReceipt};
use crate::error::Result;

pub struct SyncResponseAgent {
    broker: Arc<dyn BrokerClient>,
    topic: Topic,
    reply_topic: String,
    store: Arc<ConsentStore>,
}

impl SyncResponseAgent {
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
impl Agent for SyncResponseAgent {
    fn name(&self) -> &'static str {
        "sync-response"
    }

    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn process(&self, msg: &Message) -> Result<()> {
        let batch: SyncBatch = serde_json::from_slice(&msg.payload)?;
        let mut accepted = 0;
        let mut rejected = 0;

        for entry in batch.entries {
            if entry.recipient.trim().is_empty() {
                rejected += 1;
                continue;
            }
            self.store.upsert(ConsentRecord {
                recipient: entry.recipient,
                channel: entry.channel,
                status: entry.status,
                source: entry.source.unwrap_or_else(|| "sync".to_string()),
                updated_at: Utc::now(),
            });
            accepted += 1;
        }

        debug!(
            request_id = %batch.request_id,
            accepted,
            rejected,
            "sync batch applied"
        );

        let receipt = SyncReceipt {
            request_id: batch.request_id,
            accepted,
            rejected,
        };
        self.broker
            .publish(&self.reply_topic, serde_json::to_vec(&receipt)?)
            .await
    }
}
