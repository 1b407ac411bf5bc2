//! Gateway server wiring: bind the configured port, serve until the
//! lifecycle leaves Running, then release the listener after draining
//! in-flight requests.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use super::{routes, state::GatewayState};
use crate::config::HttpConfig;
use crate::error::{DaemonError, Result};

pub struct HttpGateway {
    port: u16,
    state: GatewayState,
}

impl HttpGateway {
    pub fn new(config: &HttpConfig, state: GatewayState) -> Self {
        Self {
            port: config.port,
            state,
        }
    }

    /// Bind the listening socket. Separate from [`serve`] so startup can
    /// fail before any traffic is accepted, and so tests can inject an
    /// ephemeral listener.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "gateway listening");
        Ok(listener)
    }

    /// Serve until the lifecycle starts shutting down. In-flight requests
    /// are drained and the port released before this returns.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = routes::router(self.state.clone());
        let mut lifecycle = self.state.lifecycle.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = lifecycle.wait_for(|state| state.is_shutting_down()).await;
            })
            .await
            .map_err(|e| DaemonError::Internal(format!("gateway error: {e}")))?;

        info!("gateway stopped");
        Ok(())
    }
}
