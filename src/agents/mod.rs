//! Background agents: one per topic, each owning a consumer handle and a
//! processing loop that hands work to the shared response pool.

pub mod brand;
pub mod consent;
pub mod pool;
pub mod runner;
pub mod sync;

use async_trait::async_trait;
use std::sync::Arc;

use crate::broker::{Message, Topic};
use crate::context::RuntimeContext;
use crate::domain::DaemonStores;
use crate::error::Result;

pub use brand::BrandSearchAgent;
pub use consent::ConsentSearchAgent;
pub use pool::{AgentPool, ResponsePool};
pub use sync::SyncResponseAgent;

/// Capability implemented by every agent: consume one message, emit any
/// responses through the broker, and report the outcome.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    fn topic(&self) -> &Topic;

    async fn process(&self, msg: &Message) -> Result<()>;
}

/// The fixed agent roster for this daemon.
pub fn default_agents(context: &Arc<RuntimeContext>, stores: &DaemonStores) -> Vec<Arc<dyn Agent>> {
    let broker = context.broker();
    let topics = context.topic_set();

    vec![
        Arc::new(SyncResponseAgent::new(
            broker.clone(),
            topics.sync.clone(),
            stores.consents.clone(),
        )),
        Arc::new(ConsentSearchAgent::new(
            broker.clone(),
            topics.consent_search.clone(),
            stores.consents.clone(),
        )),
        Arc::new(BrandSearchAgent::new(
            broker,
            topics.brand_search.clone(),
            stores.brands.clone(),
        )),
    ]
}
