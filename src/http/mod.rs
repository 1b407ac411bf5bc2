//! HTTP gateway: admission-controlled business surface plus liveness and
//! readiness probes.

pub mod admission;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use admission::{AdmissionController, AdmissionRule, OverloadPolicy};
pub use routes::router;
pub use server::HttpGateway;
pub use state::GatewayState;
