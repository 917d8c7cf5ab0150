//! Collections: a named binding to one document type and its index
//!
//! A `Collection` is constructed once per document-type name and reused for
//! the process lifetime. Every method delegates the actual network call to
//! the resilience executor.

pub mod registry;

use crate::config::EngineConfig;
use crate::document::{validate_key, Document, VersionToken};
use crate::executor::ExecOptions;
use crate::schema::{MappingTable, SchemaDescriptor};
use crate::transport::{ClusterRequest, ClusterTransport};
use crate::{Error, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How hard `get` should try against an eventually-consistent backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetRetry {
    /// Single attempt; a missing document is simply absent.
    None,
    /// A few short-sleep attempts, for read-your-own-write scenarios.
    Normal,
    /// Block until the document appears. Only for callers with external
    /// proof the document must exist.
    Infinite,
}

const NORMAL_GET_ATTEMPTS: u32 = 5;
const GET_RETRY_SLEEP: Duration = Duration::from_millis(200);

pub struct Collection {
    pub(crate) name: String,
    /// Alias the rest of the application addresses
    pub(crate) alias: String,
    /// Physical index the alias currently points at
    pub(crate) index: String,
    pub(crate) mapping: Option<MappingTable>,
    pub(crate) shards: u32,
    pub(crate) replicas: u32,
    pub(crate) stored_fields: Vec<String>,
    pub(crate) transport: Arc<dyn ClusterTransport>,
    pub(crate) config: Arc<EngineConfig>,
}

impl Collection {
    /// Bind a collection, creating or adopting its index as needed and
    /// growing the live mapping to cover the descriptor.
    pub async fn open(
        name: impl Into<String>,
        descriptor: Option<&SchemaDescriptor>,
        transport: Arc<dyn ClusterTransport>,
        config: Arc<EngineConfig>,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        let mapping = match descriptor {
            Some(descriptor) => Some(MappingTable::from_descriptor(descriptor)?),
            None => None,
        };
        let stored_fields = mapping
            .as_ref()
            .map(|m| m.stored_fields())
            .unwrap_or_default();
        let collection = Self {
            alias: name.clone(),
            index: format!("{}-v1", name),
            shards: config.shards_for(&name),
            replicas: config.replicas_for(&name),
            mapping,
            stored_fields,
            transport,
            config,
            name,
        };
        collection.ensure_index().await?;
        collection.grow_mapping().await?;
        Ok(Arc::new(collection))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mapping(&self) -> Option<&MappingTable> {
        self.mapping.as_ref()
    }

    fn doc_path(&self, key: &str) -> String {
        format!("/{}/_doc/{}", self.alias, key)
    }

    /// Parse one document response body into a document plus its token.
    pub(crate) fn parse_hit(&self, body: &Value) -> Result<(Document, VersionToken)> {
        let id = body["_id"]
            .as_str()
            .ok_or_else(|| Error::Cluster {
                status: 200,
                reason: "hit missing _id".to_string(),
            })?
            .to_string();
        let fields = match &body["_source"] {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let token = VersionToken::from_response(body)?;
        Ok((Document::new(id, fields), token))
    }

    /// Retrieve a document together with its version token. When the
    /// document does not exist the create sentinel is returned so the caller
    /// can issue a create-only save.
    pub async fn get(
        &self,
        key: &str,
        retry: GetRetry,
    ) -> Result<(Option<Document>, VersionToken)> {
        validate_key(key)?;
        let request = ClusterRequest::get(self.doc_path(key));
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let response = self.execute(&request, &ExecOptions::new()).await?;
            if response.body["found"].as_bool() == Some(true) {
                let (document, token) = self.parse_hit(&response.body)?;
                return Ok((Some(document), token));
            }

            match retry {
                GetRetry::None => return Ok((None, VersionToken::Create)),
                GetRetry::Normal if attempt >= NORMAL_GET_ATTEMPTS => {
                    return Ok((None, VersionToken::Create))
                }
                _ => {
                    debug!(collection = %self.name, key, attempt, "document not visible yet, retrying get");
                    tokio::time::sleep(GET_RETRY_SLEEP).await;
                }
            }
        }
    }

    /// Single-attempt fetch without version bookkeeping.
    pub async fn get_if_exists(&self, key: &str) -> Result<Option<Document>> {
        Ok(self.get(key, GetRetry::None).await?.0)
    }

    /// Fetch with read-your-own-write retries; absent is an error.
    pub async fn require(&self, key: &str) -> Result<Document> {
        match self.get(key, GetRetry::Normal).await?.0 {
            Some(document) => Ok(document),
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    /// Persist a document. Semantics depend on the token:
    /// create sentinel -> create-only write, conflict if the key exists;
    /// exists token -> conditional write, conflict if the document moved;
    /// no token -> unconditional overwrite.
    pub async fn save(
        &self,
        document: &Document,
        token: Option<&VersionToken>,
    ) -> Result<VersionToken> {
        validate_key(&document.id)?;
        let body = Value::Object(document.fields.clone());

        let request = match token {
            Some(VersionToken::Create) => {
                ClusterRequest::put(format!("/{}/_create/{}", self.alias, document.id))
                    .with_body(body)
            }
            Some(VersionToken::Exists { seq_no, primary_term }) => {
                ClusterRequest::put(self.doc_path(&document.id))
                    .with_query("if_seq_no", seq_no.to_string())
                    .with_query("if_primary_term", primary_term.to_string())
                    .with_body(body)
            }
            None => ClusterRequest::put(self.doc_path(&document.id)).with_body(body),
        };

        let options = if token.is_some() {
            ExecOptions::fail_on_conflict(&document.id)
        } else {
            ExecOptions::new()
        };
        let response = self.execute(&request, &options).await?;
        VersionToken::from_response(&response.body)
    }

    /// Idempotent delete; reports whether a document was actually removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let request = ClusterRequest::delete(self.doc_path(key));
        let response = self.execute(&request, &ExecOptions::new()).await?;
        Ok(response.body["result"].as_str() == Some("deleted"))
    }

    /// Existence check without fetching the body.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let request = ClusterRequest::head(self.doc_path(key));
        let response = self.execute(&request, &ExecOptions::new()).await?;
        Ok(response.is_success())
    }

    /// Batch read, aligned with the input keys. By default every missing key
    /// is collected into one aggregate error; pass `error_on_missing =
    /// false` to receive `None` slots instead.
    pub async fn multi_get(
        &self,
        keys: &[&str],
        error_on_missing: bool,
    ) -> Result<Vec<Option<Document>>> {
        for key in keys {
            validate_key(key)?;
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let request = ClusterRequest::post(format!("/{}/_mget", self.alias))
            .with_body(json!({ "ids": keys }));
        let response = self.execute(&request, &ExecOptions::new()).await?;

        let docs = response.body["docs"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let mut results = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for (key, doc) in keys.iter().zip(docs.iter()) {
            if doc["found"].as_bool() == Some(true) {
                let (document, _) = self.parse_hit(doc)?;
                results.push(Some(document));
            } else {
                missing.push(key.to_string());
                results.push(None);
            }
        }

        if error_on_missing && !missing.is_empty() {
            return Err(Error::MissingDocuments { keys: missing });
        }
        Ok(results)
    }

    /// Force visibility of recent writes.
    pub async fn commit(&self) -> Result<()> {
        let request = ClusterRequest::post(format!("/{}/_refresh", self.alias));
        self.execute(&request, &ExecOptions::new()).await?;
        Ok(())
    }
}
