//! Daemon lifecycle: the single state machine every component reads, and
//! the controller that owns its transitions.
//!
//! State only ever moves forward (Starting -> Running -> Draining ->
//! Terminating -> Stopped). Agents watch it to decide whether to keep
//! accepting messages; the HTTP gateway watches it to stop admitting
//! requests and to resolve its graceful-shutdown future.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use crate::agents::{self, AgentPool, ResponsePool};
use crate::config::AppConfig;
use crate::context::RuntimeContext;
use crate::domain::DaemonStores;
use crate::error::{DaemonError, Result};
use crate::http::{GatewayState, HttpGateway};
use crate::shutdown::DrainCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Terminating,
    Stopped,
}

impl LifecycleState {
    /// Only Running admits new business requests at the HTTP boundary.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, LifecycleState::Running)
    }

    /// Agent loops keep receiving while starting up or running.
    pub fn accepts_messages(&self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Running)
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self,
            LifecycleState::Draining | LifecycleState::Terminating | LifecycleState::Stopped
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Draining => write!(f, "draining"),
            LifecycleState::Terminating => write!(f, "terminating"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Shared handle to the lifecycle state. Transitions go through
/// [`Lifecycle::advance`]; everything else subscribes and reads.
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Starting);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Move the state forward. Backward or repeated transitions are ignored,
    /// which makes shutdown paths safe to re-enter.
    pub fn advance(&self, to: LifecycleState) -> bool {
        let mut advanced = false;
        self.tx.send_if_modified(|state| {
            if to > *state {
                info!("lifecycle: {} -> {}", state, to);
                *state = to;
                advanced = true;
                true
            } else {
                false
            }
        });
        advanced
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates startup order and owns the shutdown protocol.
pub struct LifecycleController {
    context: Arc<RuntimeContext>,
    stores: DaemonStores,
    lifecycle: Arc<Lifecycle>,
    config: AppConfig,
}

impl LifecycleController {
    pub fn new(context: Arc<RuntimeContext>, stores: DaemonStores, config: AppConfig) -> Self {
        Self {
            context,
            stores,
            lifecycle: Arc::new(Lifecycle::new()),
            config,
        }
    }

    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        self.lifecycle.clone()
    }

    /// Run the daemon to completion.
    ///
    /// Startup order is strict: panic logging, signal handling, the
    /// fail-fast session check, agents, then the HTTP gateway. A missing
    /// crypto session or a failed subscription aborts before the port is
    /// ever bound; there is no partial-agent degraded mode.
    pub async fn start(&self) -> Result<()> {
        install_panic_logger();

        let lifecycle = self.lifecycle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("termination signal received");
            lifecycle.advance(LifecycleState::Draining);
        });

        if !self.context.has_crypto_session() {
            error!("cryptographic session unavailable, aborting startup");
            return Err(DaemonError::SessionUnavailable);
        }

        let response_pool = Arc::new(ResponsePool::new(self.config.agents.response_queue_size));
        let mut agent_pool = AgentPool::new(
            self.context.clone(),
            self.lifecycle.subscribe(),
            response_pool.clone(),
            &self.config.agents,
        );
        let roster = agents::default_agents(&self.context, &self.stores);
        agent_pool.start(roster).await?;

        let state = GatewayState::new(
            self.context.clone(),
            self.stores.clone(),
            self.lifecycle.subscribe(),
            &self.config.admission,
        );
        let gateway = HttpGateway::new(&self.config.http, state);
        let listener = gateway.bind().await?;

        // Only a bound gateway may report the daemon as running
        self.lifecycle.advance(LifecycleState::Running);

        // Blocks until the lifecycle leaves Running; the listener is
        // released and in-flight HTTP requests drained before it returns.
        gateway.serve(listener).await?;

        // A gateway failure can land here without a signal; make sure the
        // shutdown protocol starts from Draining either way.
        self.lifecycle.advance(LifecycleState::Draining);

        agent_pool.join().await;

        let drain = DrainCoordinator::new(
            self.context.clone(),
            self.lifecycle.clone(),
            self.config.drain.clone(),
        );
        drain
            .run(
                &response_pool,
                Duration::from_secs(self.config.agents.pool_drain_timeout_secs),
            )
            .await;

        Ok(())
    }
}

/// Log any otherwise-uncaught panic on any thread, then fall through to
/// the previously installed hook. A panic alone does not stop the daemon.
pub fn install_panic_logger() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("uncaught panic: {panic_info}");
        previous(panic_info);
    }));
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
