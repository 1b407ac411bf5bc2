use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::http::admission::{AdmissionRule, OverloadPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub agents: AgentConfig,
    pub http: HttpConfig,
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub drain: DrainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker service endpoint host
    pub host: String,
    /// Broker service endpoint port
    pub port: u16,
    /// Broker admin endpoint host (backlog statistics)
    pub admin_host: String,
    /// Broker admin endpoint port
    pub admin_port: u16,
    /// Partition count applied when topics are provisioned
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,
    /// Optional topic namespace prefix
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_partition_count() -> u32 {
    3
}

impl BrokerConfig {
    /// Service endpoint in broker URL form
    pub fn endpoint(&self) -> String {
        format!("broker://{}:{}", self.host, self.port)
    }

    /// Admin endpoint in HTTP URL form
    pub fn admin_endpoint(&self) -> String {
        format!("http://{}:{}", self.admin_host, self.admin_port)
    }
}

/// Disposition for a message whose processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Acknowledge and drop the failed message (log-and-drop)
    #[default]
    AckOnFailure,
    /// Leave the message unacknowledged so the broker redelivers it
    NackRedeliver,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Worker slots shared by the agent receive loops
    #[serde(default = "default_agent_threads")]
    pub thread_count: usize,
    /// Capacity of the shared response-execution pool
    #[serde(default = "default_response_queue_size")]
    pub response_queue_size: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Bounded wait for in-flight response tasks during shutdown
    #[serde(default = "default_pool_drain_timeout")]
    pub pool_drain_timeout_secs: u64,
}

fn default_agent_threads() -> usize {
    4
}

fn default_response_queue_size() -> usize {
    32
}

fn default_pool_drain_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Gateway listening port
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Runtime worker threads serving the daemon; defaults to one per core
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

fn default_http_port() -> u16 {
    9050
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Per-second request threshold per protected path prefix
    pub max_requests_per_sec: u32,
    /// Maximum request duration before the gateway gives up on it
    #[serde(default = "default_max_request_ms")]
    pub max_request_ms: u64,
    /// Overload policy: -1 rejects excess requests immediately, a
    /// non-negative value delays them that many milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: i64,
}

fn default_max_request_ms() -> u64 {
    60_000
}

fn default_delay_ms() -> i64 {
    -1
}

impl AdmissionConfig {
    pub fn rule(&self) -> AdmissionRule {
        let overload = if self.delay_ms < 0 {
            OverloadPolicy::Reject
        } else {
            OverloadPolicy::Delay(std::time::Duration::from_millis(self.delay_ms as u64))
        };
        AdmissionRule {
            max_requests_per_sec: self.max_requests_per_sec,
            max_request_ms: self.max_request_ms,
            overload,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrainConfig {
    /// First delay between backlog polls
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff cap; polling never stops, it only slows down to this
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Optional directory for a daily-rotated log file
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("broker.host", "localhost")?
            .set_default("broker.port", 6650)?
            .set_default("broker.admin_host", "localhost")?
            .set_default("broker.admin_port", 8080)?
            .set_default("agents.thread_count", 4)?
            .set_default("agents.response_queue_size", 32)?
            .set_default("http.port", 9050)?
            .set_default("admission.max_requests_per_sec", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g. config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CONSENTD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CONSENTD_HTTP__PORT, etc.)
            .add_source(
                Environment::with_prefix("CONSENTD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.agents.thread_count == 0 {
            errors.push("agents.thread_count must be positive".to_string());
        }

        if self.agents.response_queue_size == 0 {
            errors.push("agents.response_queue_size must be positive".to_string());
        }

        if self.admission.max_requests_per_sec == 0 {
            errors.push("admission.max_requests_per_sec must be positive".to_string());
        }

        if self.admission.delay_ms < -1 {
            errors.push("admission.delay_ms must be -1 (reject) or a delay in ms".to_string());
        }

        if self.drain.initial_backoff_ms == 0 {
            errors.push("drain.initial_backoff_ms must be positive".to_string());
        }

        if self.drain.initial_backoff_ms > self.drain.max_backoff_ms {
            errors.push("drain.initial_backoff_ms must not exceed drain.max_backoff_ms".to_string());
        }

        if self.http.port == 0 {
            errors.push("http.port must be a fixed port".to_string());
        }

        if self.http.worker_threads == Some(0) {
            errors.push("http.worker_threads must be positive when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
