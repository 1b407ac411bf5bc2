//! Consent-registry domain payloads and the in-memory stores backing the
//! agents. The registry content itself is deliberately small; the daemon's
//! job is admission and coordination, not consent semantics.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Communication channel a consent applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentChannel {
    Call,
    Sms,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub recipient: String,
    pub channel: ConsentChannel,
    pub status: ConsentStatus,
    /// Where the consent was collected (web form, call center, ...)
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentQuery {
    pub request_id: Uuid,
    pub recipient: String,
    pub channel: ConsentChannel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentReply {
    pub request_id: Uuid,
    pub recipient: String,
    pub channel: ConsentChannel,
    pub record: Option<ConsentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandQuery {
    pub request_id: Uuid,
    pub service_provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brand {
    pub code: String,
    pub title: String,
    pub service_provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandReply {
    pub request_id: Uuid,
    pub brands: Vec<Brand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEntry {
    pub recipient: String,
    pub channel: ConsentChannel,
    pub status: ConsentStatus,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatch {
    pub request_id: Uuid,
    pub entries: Vec<SyncEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReceipt {
    pub request_id: Uuid,
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConsentKey {
    recipient: String,
    channel: ConsentChannel,
}

/// Aggregate counters for reporting endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ConsentStats {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// In-memory consent registry shared by agents and HTTP handlers
pub struct ConsentStore {
    records: DashMap<ConsentKey, ConsentRecord>,
}

impl ConsentStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn lookup(&self, recipient: &str, channel: ConsentChannel) -> Option<ConsentRecord> {
        let key = ConsentKey {
            recipient: recipient.to_string(),
            channel,
        };
        self.records.get(&key).map(|r| r.clone())
    }

    /// Insert or replace a record. Returns true when the record is new.
    pub fn upsert(&self, record: ConsentRecord) -> bool {
        let key = ConsentKey {
            recipient: record.recipient.clone(),
            channel: record.channel,
        };
        self.records.insert(key, record).is_none()
    }

    pub fn consents_for(&self, recipient: &str) -> Vec<ConsentRecord> {
        self.records
            .iter()
            .filter(|e| e.key().recipient == recipient)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn stats(&self) -> ConsentStats {
        let mut approved = 0;
        let mut rejected = 0;
        for record in self.records.iter() {
            match record.status {
                ConsentStatus::Approved => approved += 1,
                ConsentStatus::Rejected => rejected += 1,
            }
        }
        ConsentStats {
            total: self.records.len(),
            approved,
            rejected,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ConsentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Brand directory keyed by service-provider code
pub struct BrandDirectory {
    brands: DashMap<String, Vec<Brand>>,
}

impl BrandDirectory {
    pub fn new() -> Self {
        Self {
            brands: DashMap::new(),
        }
    }

    pub fn register(&self, brand: Brand) {
        self.brands
            .entry(brand.service_provider.clone())
            .or_default()
            .push(brand);
    }

    pub fn search(&self, service_provider: &str) -> Vec<Brand> {
        self.brands
            .get(service_provider)
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn service_providers(&self) -> Vec<String> {
        let mut providers: Vec<_> = self.brands.iter().map(|e| e.key().clone()).collect();
        providers.sort();
        providers
    }

    pub fn all(&self) -> Vec<Brand> {
        self.brands
            .iter()
            .flat_map(|e| e.value().clone())
            .collect()
    }
}

impl Default for BrandDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared stores handed to agents and the HTTP gateway.
#[derive(Clone)]
pub struct DaemonStores {
    pub consents: Arc<ConsentStore>,
    pub brands: Arc<BrandDirectory>,
    pub kv: Arc<DashMap<String, String>>,
}

impl DaemonStores {
    pub fn new() -> Self {
        Self {
            consents: Arc::new(ConsentStore::new()),
            brands: Arc::new(BrandDirectory::new()),
            kv: Arc::new(DashMap::new()),
        }
    }
}

impl Default for DaemonStores {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(recipient: &str, channel: ConsentChannel, status: ConsentStatus) -> ConsentRecord {
        ConsentRecord {
            recipient: recipient.to_string(),
            channel,
            status,
            source: "web".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_and_lookup() {
        let store = ConsentStore::new();
        assert!(store.upsert(record("+905551112233", ConsentChannel::Sms, ConsentStatus::Approved)));
        assert!(!store.upsert(record("+905551112233", ConsentChannel::Sms, ConsentStatus::Rejected)));

        let found = store
            .lookup("+905551112233", ConsentChannel::Sms)
            .expect("record should exist");
        assert_eq!(found.status, ConsentStatus::Rejected);
        assert!(store.lookup("+905551112233", ConsentChannel::Email).is_none());
    }

    #[test]
    fn test_stats_counts_by_status() {
        let store = ConsentStore::new();
        store.upsert(record("a", ConsentChannel::Sms, ConsentStatus::Approved));
        store.upsert(record("b", ConsentChannel::Email, ConsentStatus::Approved));
        store.upsert(record("c", ConsentChannel::Call, ConsentStatus::Rejected));

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn test_brand_directory_search() {
        let directory = BrandDirectory::new();
        directory.register(Brand {
            code: "B1".to_string(),
            title: "Acme Retail".to_string(),
            service_provider: "SP1".to_string(),
        });
        directory.register(Brand {
            code: "B2".to_string(),
            title: "Acme Online".to_string(),
            service_provider: "SP1".to_string(),
        });

        assert_eq!(directory.search("SP1").len(), 2);
        assert!(directory.search("SP2").is_empty());
        assert_eq!(directory.service_providers(), vec!["SP1".to_string()]);
    }
}
