//! Bounded execution pools.
//!
//! The agent pool limits how many receive loops run concurrently; the
//! response pool bounds the per-message processing fan-out so slow
//! downstream work backpressures the loops instead of piling up tasks.

use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use super::{runner, Agent};
use crate::config::{AgentConfig, FailurePolicy};
use crate::context::RuntimeContext;
use crate::error::{DaemonError, Result};
use crate::lifecycle::LifecycleState;

/// Bounded pool executing the processing+acknowledge step for every
/// received message.
pub struct ResponsePool {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl ResponsePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Submit a task, waiting for a slot if the pool is at capacity.
    /// Fails once shutdown has begun.
    pub async fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DaemonError::PoolClosed);
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DaemonError::PoolClosed)?;

        let mut tasks = self.tasks.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(DaemonError::PoolClosed);
        }

        // Reap anything already finished so the set doesn't grow unbounded.
        while let Some(Some(_)) = tasks.join_next().now_or_never() {}

        tasks.spawn(async move {
            task.await;
            drop(permit);
        });
        Ok(())
    }

    /// Orderly shutdown with a bounded wait: refuse new submissions, give
    /// in-flight tasks up to `timeout` to finish, then abort the rest.
    /// Returns true when everything finished inside the window.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;
        let deadline = Instant::now() + timeout;

        while !tasks.is_empty() {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = tasks.len(),
                        "response pool drain timed out, aborting remaining tasks"
                    );
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return false;
                }
            }
        }
        true
    }
}

/// Builds the configured agents, subscribes their consumers and launches
/// each run loop on a bounded worker slot.
pub struct AgentPool {
    context: Arc<RuntimeContext>,
    lifecycle: watch::Receiver<LifecycleState>,
    response_pool: Arc<ResponsePool>,
    slots: Arc<Semaphore>,
    policy: FailurePolicy,
    loops: JoinSet<()>,
}

impl AgentPool {
    pub fn new(
        context: Arc<RuntimeContext>,
        lifecycle: watch::Receiver<LifecycleState>,
        response_pool: Arc<ResponsePool>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            context,
            lifecycle,
            response_pool,
            slots: Arc::new(Semaphore::new(config.thread_count)),
            policy: config.failure_policy,
            loops: JoinSet::new(),
        }
    }

    /// Subscribe and launch every agent. A single failed subscription
    /// aborts the whole daemon; there is no partial-agent mode.
    pub async fn start(&mut self, agents: Vec<Arc<dyn Agent>>) -> Result<()> {
        for agent in agents {
            let topic = agent.topic().clone();
            let consumer = match self.context.broker().subscribe(&topic).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    error!(agent = agent.name(), topic = %topic, error = %e, "consumer subscription failed");
                    return Err(DaemonError::Subscribe {
                        topic: topic.name,
                        reason: e.to_string(),
                    });
                }
            };
            self.context.register_consumer(consumer.clone()).await;
            info!(agent = agent.name(), topic = %topic, "agent subscribed");

            let lifecycle = self.lifecycle.clone();
            let response_pool = self.response_pool.clone();
            let slots = self.slots.clone();
            let policy = self.policy;
            self.loops.spawn(async move {
                // Loops beyond the configured worker count queue here until
                // a slot frees up.
                let Ok(_slot) = slots.acquire_owned().await else {
                    return;
                };
                runner::run_agent_loop(agent, consumer, lifecycle, response_pool, policy).await;
            });
        }
        Ok(())
    }

    /// Wait for every run loop to exit. Loops end on their own once the
    /// lifecycle leaves the accepting states.
    pub async fn join(&mut self) {
        while self.loops.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_submit_runs_tasks() {
        let pool = ResponsePool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .expect("submit");
        }

        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_shutdown_completes_within_bounded_wait() {
        let pool = ResponsePool::new(2);
        pool.submit(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        })
        .await
        .expect("submit");

        assert!(pool.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_shutdown_force_terminates_slow_tasks() {
        let pool = ResponsePool::new(2);
        pool.submit(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
        })
        .await
        .expect("submit");

        let clean = pool.shutdown(Duration::from_millis(100)).await;
        assert!(!clean, "slow task should have been force-terminated");
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_refused() {
        let pool = ResponsePool::new(2);
        assert!(pool.shutdown(Duration::from_millis(10)).await);

        let result = pool.submit(async {}).await;
        assert!(matches!(result, Err(DaemonError::PoolClosed)));
    }
}
