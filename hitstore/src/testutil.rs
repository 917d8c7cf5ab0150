//! Shared test fixtures: a scripted in-memory transport and a canned
//! collection, so every component's failure paths run without a cluster.

use crate::collection::Collection;
use crate::config::EngineConfig;
use crate::schema::{MappingTable, SchemaDescriptor};
use crate::transport::{ClusterRequest, ClusterResponse, ClusterTransport};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct Inner {
    responses: Mutex<VecDeque<Result<ClusterResponse>>>,
    requests: Mutex<Vec<ClusterRequest>>,
    reconnects: AtomicU32,
}

/// Transport that replays a scripted sequence of responses and records every
/// request it sees. Once the script is exhausted it answers 200 `{}`.
#[derive(Clone)]
pub(crate) struct FakeTransport {
    inner: Arc<Inner>,
}

impl FakeTransport {
    pub fn new(responses: Vec<Result<ClusterResponse>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                reconnects: AtomicU32::new(0),
            }),
        }
    }

    pub fn ok(body: Value) -> ClusterResponse {
        ClusterResponse { status: 200, body }
    }

    pub fn status(status: u16, body: Value) -> ClusterResponse {
        ClusterResponse { status, body }
    }

    pub fn wire_error() -> Error {
        Error::Transport("connection reset by peer".to_string())
    }

    pub fn requests(&self) -> Vec<ClusterRequest> {
        self.inner.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    pub fn reconnect_count(&self) -> u32 {
        self.inner.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterTransport for FakeTransport {
    async fn send(&self, request: &ClusterRequest) -> Result<ClusterResponse> {
        self.inner.requests.lock().push(request.clone());
        match self.inner.responses.lock().pop_front() {
            Some(outcome) => outcome,
            None => Ok(Self::ok(json!({}))),
        }
    }

    async fn reconnect(&self) -> Result<()> {
        self.inner.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn test_descriptor() -> SchemaDescriptor {
    serde_json::from_value(json!({
        "name": "hits",
        "fields": {
            "title": {"type": "text", "stored": true},
            "severity": {"type": "keyword", "allowed": ["low", "medium", "high"]},
            "tags": {"type": "keyword", "multivalued": true},
            "count": {"type": "long"},
            "score": {"type": "double"},
            "created": {"type": "date"},
            "meta.owner": {"type": "keyword"}
        }
    }))
    .unwrap()
}

/// A collection wired to a fake transport, bypassing index bootstrap.
pub(crate) fn collection_with(transport: FakeTransport) -> Collection {
    Collection {
        name: "hits".to_string(),
        alias: "hits".to_string(),
        index: "hits-v1".to_string(),
        mapping: Some(MappingTable::from_descriptor(&test_descriptor()).unwrap()),
        shards: 1,
        replicas: 1,
        stored_fields: vec!["title".to_string()],
        transport: Arc::new(transport),
        config: Arc::new(EngineConfig::new("http://localhost:9200")),
    }
}
