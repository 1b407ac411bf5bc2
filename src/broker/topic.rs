use serde::{Deserialize, Serialize};

/// A named message stream plus the subscription an agent consumes it under.
/// Immutable once assigned to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub subscription: String,
}

impl Topic {
    pub fn new(name: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscription: subscription.into(),
        }
    }

    /// Name of the stream replies for this topic are published to.
    pub fn reply_name(&self) -> String {
        format!("{}-replies", self.name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.subscription)
    }
}

/// The fixed set of topics this daemon consumes. One topic maps to
/// exactly one agent.
#[derive(Debug, Clone)]
pub struct TopicSet {
    pub sync: Topic,
    pub consent_search: Topic,
    pub brand_search: Topic,
}

impl TopicSet {
    /// Build the topic set, optionally under a namespace prefix
    /// (e.g. `consent/consent-sync`).
    pub fn new(namespace: Option<&str>) -> Self {
        let named = |base: &str| match namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}/{base}"),
            _ => base.to_string(),
        };

        Self {
            sync: Topic::new(named("consent-sync"), "sync-subscription"),
            consent_search: Topic::new(named("consent-search"), "search-subscription"),
            brand_search: Topic::new(named("brand-search"), "brand-search-subscription"),
        }
    }

    pub fn all(&self) -> [&Topic; 3] {
        [&self.sync, &self.consent_search, &self.brand_search]
    }
}
