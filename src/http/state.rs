use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

use super::admission::AdmissionController;
use crate::config::AdmissionConfig;
use crate::context::RuntimeContext;
use crate::domain::DaemonStores;
use crate::lifecycle::LifecycleState;

/// Shared application state for gateway handlers and middleware
#[derive(Clone)]
pub struct GatewayState {
    pub context: Arc<RuntimeContext>,
    pub stores: DaemonStores,
    pub lifecycle: watch::Receiver<LifecycleState>,
    pub admission: Arc<AdmissionController>,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(
        context: Arc<RuntimeContext>,
        stores: DaemonStores,
        lifecycle: watch::Receiver<LifecycleState>,
        admission: &AdmissionConfig,
    ) -> Self {
        Self {
            context,
            stores,
            lifecycle,
            admission: Arc::new(AdmissionController::new(admission.rule())),
            started_at: Utc::now(),
        }
    }

    /// Daemon uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
