//! Process-wide collection registry
//!
//! Built once at startup from the schema descriptors and read-only
//! afterwards; request workers look collections up without further locking
//! discipline beyond the read lock.

use crate::collection::Collection;
use crate::config::EngineConfig;
use crate::schema::SchemaDescriptor;
use crate::transport::{ClusterTransport, HttpTransport};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct CollectionRegistry {
    transport: Arc<dyn ClusterTransport>,
    config: Arc<EngineConfig>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    initialized: AtomicBool,
}

impl CollectionRegistry {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: EngineConfig, transport: Arc<dyn ClusterTransport>) -> Self {
        Self {
            transport,
            config: Arc::new(config),
            collections: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Open every collection once. Calling this a second time is a caller
    /// bug; the cache is immutable after initialization.
    pub async fn initialize(&self, descriptors: &[SchemaDescriptor]) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(Error::Config(
                "collection registry already initialized".to_string(),
            ));
        }

        for descriptor in descriptors {
            let collection = Collection::open(
                descriptor.name.clone(),
                Some(descriptor),
                Arc::clone(&self.transport),
                Arc::clone(&self.config),
            )
            .await?;
            self.collections
                .write()
                .insert(descriptor.name.clone(), collection);
        }

        info!(collections = descriptors.len(), "collection registry initialized");
        Ok(())
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_descriptor, FakeTransport};

    #[tokio::test]
    async fn test_initialize_once_and_lookup() {
        let transport = FakeTransport::new(vec![]);
        let registry = CollectionRegistry::with_transport(
            EngineConfig::new("http://localhost:9200"),
            Arc::new(transport),
        );

        registry.initialize(&[test_descriptor()]).await.unwrap();
        assert!(registry.collection("hits").is_ok());
        assert!(matches!(
            registry.collection("nope"),
            Err(Error::CollectionNotFound(_))
        ));

        let error = registry.initialize(&[]).await.unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }
}
