//! Message broker collaborator interface and the in-process implementation
//! used for local runs and tests. The production client library lives
//! outside this crate; the daemon only depends on the traits here.

pub mod api;
pub mod memory;
pub mod topic;

pub use api::{BrokerClient, Consumer, Message};
pub use memory::MemoryBroker;
pub use topic::{Topic, TopicSet};
