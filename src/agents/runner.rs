//! The per-agent receive loop.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{pool::ResponsePool, Agent};
use crate::broker::Consumer;
use crate::config::FailurePolicy;
use crate::error::DaemonError;
use crate::lifecycle::LifecycleState;

/// Receive messages for one agent until the lifecycle leaves the accepting
/// states or the consumer is closed.
///
/// The loop itself never processes a message; it submits the
/// process+acknowledge step to the shared response pool so a slow handler
/// cannot stall the subscription.
pub async fn run_agent_loop(
    agent: Arc<dyn Agent>,
    consumer: Arc<dyn Consumer>,
    mut lifecycle: watch::Receiver<LifecycleState>,
    response_pool: Arc<ResponsePool>,
    policy: FailurePolicy,
) {
    loop {
        if !lifecycle.borrow().accepts_messages() {
            break;
        }

        tokio::select! {
            changed = lifecycle.changed() => {
                if changed.is_err() || !lifecycle.borrow().accepts_messages() {
                    break;
                }
            }
            received = consumer.receive() => {
                match received {
                    Ok(msg) => {
                        // A drain may have started while we were waiting;
                        // received-but-unprocessed messages stay with the
                        // broker.
                        if !lifecycle.borrow().accepts_messages() {
                            break;
                        }

                        let task_agent = agent.clone();
                        let task_consumer = consumer.clone();
                        let submitted = response_pool.submit(async move {
                            handle_message(task_agent, task_consumer, msg, policy).await;
                        }).await;

                        if submitted.is_err() {
                            debug!(agent = agent.name(), "response pool closed, ending loop");
                            break;
                        }
                    }
                    Err(DaemonError::ConsumerClosed) => {
                        debug!(agent = agent.name(), "consumer closed");
                        break;
                    }
                    Err(e) => {
                        warn!(agent = agent.name(), error = %e, "receive failed, retrying");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    info!(agent = agent.name(), "agent loop exited");
}

async fn handle_message(
    agent: Arc<dyn Agent>,
    consumer: Arc<dyn Consumer>,
    msg: crate::broker::Message,
    policy: FailurePolicy,
) {
    match agent.process(&msg).await {
        Ok(()) => {
            if let Err(e) = consumer.ack(&msg).await {
                warn!(agent = agent.name(), message = %msg.id, error = %e, "acknowledge failed");
            }
        }
        Err(e) => {
            error!(agent = agent.name(), message = %msg.id, error = %e, "message processing failed");
            match policy {
                FailurePolicy::AckOnFailure => {
                    if let Err(e) = consumer.ack(&msg).await {
                        warn!(agent = agent.name(), message = %msg.id, error = %e, "acknowledge failed");
                    }
                }
                // Leave the message unacknowledged; the broker redelivers it.
                FailurePolicy::NackRedeliver => {}
            }
        }
    }
}
