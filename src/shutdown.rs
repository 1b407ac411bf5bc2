//! Drain-then-stop shutdown protocol.
//!
//! Draining ends only when every tracked topic reports a backlog of zero
//! at the same poll; the coordinator then terminates the response pool
//! with a bounded wait, closes the consumer handles and the crypto
//! session, and declares the daemon stopped. Poll failures are logged and
//! retried under capped exponential backoff; the protocol never exits
//! with unacknowledged backlog.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::agents::ResponsePool;
use crate::config::DrainConfig;
use crate::context::RuntimeContext;
use crate::error::Result;
use crate::lifecycle::{Lifecycle, LifecycleState};

pub struct DrainCoordinator {
    context: Arc<RuntimeContext>,
    lifecycle: Arc<Lifecycle>,
    config: DrainConfig,
}

impl DrainCoordinator {
    pub fn new(context: Arc<RuntimeContext>, lifecycle: Arc<Lifecycle>, config: DrainConfig) -> Self {
        Self {
            context,
            lifecycle,
            config,
        }
    }

    /// Run the shutdown protocol to completion. Safe to call again after
    /// the daemon has stopped; the second invocation is a no-op.
    pub async fn run(&self, response_pool: &ResponsePool, pool_timeout: Duration) {
        if self.lifecycle.current() == LifecycleState::Stopped {
            info!("shutdown already complete");
            return;
        }

        self.lifecycle.advance(LifecycleState::Draining);

        self.wait_for_backlog_drain().await;
        self.lifecycle.advance(LifecycleState::Terminating);

        let clean = response_pool.shutdown(pool_timeout).await;
        if !clean {
            warn!("response pool was force-terminated");
        }

        for consumer in self.context.take_consumers().await {
            if let Err(e) = consumer.close().await {
                warn!(topic = %consumer.topic(), error = %e, "consumer close failed");
            }
        }

        self.context.close_crypto_session();

        self.lifecycle.advance(LifecycleState::Stopped);
        info!("shutdown complete");
    }

    /// Poll until every tracked topic reads a backlog of zero
    /// simultaneously.
    async fn wait_for_backlog_drain(&self) {
        let topics = self.context.topics();
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);

        loop {
            match self.remaining_backlog(&topics).await {
                Ok(0) => {
                    info!("all topic backlogs drained");
                    return;
                }
                Ok(remaining) => {
                    info!(remaining, "waiting for topic backlogs to drain");
                }
                Err(e) => {
                    warn!(error = %e, "backlog poll failed, retrying");
                }
            }

            let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4);
            tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
            backoff = std::cmp::min(backoff * 2, max_backoff);
        }
    }

    async fn remaining_backlog(&self, topics: &[crate::broker::Topic]) -> Result<u64> {
        let broker = self.context.broker();
        let mut remaining = 0;
        for topic in topics {
            remaining += broker.backlog(topic).await?;
        }
        Ok(remaining)
    }
}
