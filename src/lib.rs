pub mod agents;
pub mod broker;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod session;
pub mod shutdown;

pub use agents::{Agent, AgentPool, ResponsePool};
pub use broker::{BrokerClient, Consumer, MemoryBroker, Message, Topic, TopicSet};
pub use config::AppConfig;
pub use context::RuntimeContext;
pub use domain::DaemonStores;
pub use error::{DaemonError, Result};
pub use http::{GatewayState, HttpGateway};
pub use lifecycle::{Lifecycle, LifecycleController, LifecycleState};
pub use session::{CryptoSession, StaticKeySession};
pub use shutdown::DrainCoordinator;
