//! Engine configuration
//!
//! All knobs are externally supplied: cluster endpoint, transport timeout,
//! retry ceiling, and per-collection shard/replica overrides.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the cluster, e.g. "http://localhost:9200"
    pub base_url: String,

    /// Per-request transport timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum attempts before a retryable failure becomes fatal
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cap on the linear backoff between attempts, in seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Shard count for collections without an override
    #[serde(default = "default_shards")]
    pub default_shards: u32,

    /// Replica count for collections without an override
    #[serde(default = "default_replicas")]
    pub default_replicas: u32,

    /// Per-collection shard/replica overrides, keyed by collection name
    #[serde(default)]
    pub collection_overrides: HashMap<String, TopologyOverride>,

    /// Keep-alive window for server-side cursors, e.g. "1m"
    #[serde(default = "default_cursor_keepalive")]
    pub cursor_keepalive: String,

    /// Page size used by streaming searches
    #[serde(default = "default_stream_batch_size")]
    pub stream_batch_size: usize,

    /// Sleep between background-job status polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyOverride {
    #[serde(default)]
    pub shards: Option<u32>,
    #[serde(default)]
    pub replicas: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    10
}

fn default_max_backoff_secs() -> u64 {
    5
}

fn default_shards() -> u32 {
    1
}

fn default_replicas() -> u32 {
    1
}

fn default_cursor_keepalive() -> String {
    "1m".to_string()
}

fn default_stream_batch_size() -> usize {
    500
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_backoff_secs: default_max_backoff_secs(),
            default_shards: default_shards(),
            default_replicas: default_replicas(),
            collection_overrides: HashMap::new(),
            cursor_keepalive: default_cursor_keepalive(),
            stream_batch_size: default_stream_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Shard count for a collection, honoring overrides
    pub fn shards_for(&self, collection: &str) -> u32 {
        self.collection_overrides
            .get(collection)
            .and_then(|o| o.shards)
            .unwrap_or(self.default_shards)
    }

    /// Replica count for a collection, honoring overrides
    pub fn replicas_for(&self, collection: &str) -> u32 {
        self.collection_overrides
            .get(collection)
            .and_then(|o| o.replicas)
            .unwrap_or(self.default_replicas)
    }
}
