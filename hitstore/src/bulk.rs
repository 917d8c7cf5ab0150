//! Bulk executor
//!
//! Submits a pre-built ordered batch of heterogeneous operations as one
//! round trip and reports per-item outcomes. The batch never fails
//! atomically and nothing here retries failed items; resubmission is the
//! caller's decision.

use crate::collection::Collection;
use crate::document::{validate_key, Document, VersionToken};
use crate::executor::ExecOptions;
use crate::transport::ClusterRequest;
use crate::update::script::{render, UpdateOp};
use crate::{Error, Result};
use serde_json::{json, Value};

/// One operation in a bulk batch.
#[derive(Debug, Clone)]
pub enum BulkOp {
    /// Create-only write; fails per-item if the key already exists.
    Create(Document),
    /// Unconditional overwrite.
    Index(Document),
    /// Scripted partial update.
    Update { key: String, ops: Vec<UpdateOp> },
    Delete { key: String },
}

impl BulkOp {
    fn key(&self) -> &str {
        match self {
            BulkOp::Create(doc) | BulkOp::Index(doc) => &doc.id,
            BulkOp::Update { key, .. } | BulkOp::Delete { key } => key,
        }
    }
}

/// Per-item result of a bulk submission.
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub key: String,
    pub ok: bool,
    pub status: u16,
    pub error: Option<String>,
    /// Fresh version token for successful writes, usable for follow-up
    /// conditional operations.
    pub token: Option<VersionToken>,
}

impl Collection {
    /// Submit a batch in one request. Item order is preserved in the
    /// returned outcomes.
    pub async fn bulk(&self, batch: &[BulkOp]) -> Result<Vec<BulkOutcome>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        for op in batch {
            validate_key(op.key())?;
        }

        let mut payload = String::new();
        for op in batch {
            let (action, line) = match op {
                BulkOp::Create(doc) => (
                    json!({"create": {"_id": doc.id}}),
                    Some(Value::Object(doc.fields.clone())),
                ),
                BulkOp::Index(doc) => (
                    json!({"index": {"_id": doc.id}}),
                    Some(Value::Object(doc.fields.clone())),
                ),
                BulkOp::Update { key, ops } => {
                    self.validate_ops(ops).map_err(|error| {
                        Error::Validation(format!("bulk update for '{}': {}", key, error))
                    })?;
                    (
                        json!({"update": {"_id": key}}),
                        Some(json!({"script": render(ops).to_wire()})),
                    )
                }
                BulkOp::Delete { key } => (json!({"delete": {"_id": key}}), None),
            };
            payload.push_str(&action.to_string());
            payload.push('\n');
            if let Some(line) = line {
                payload.push_str(&line.to_string());
                payload.push('\n');
            }
        }

        let request =
            ClusterRequest::post(format!("/{}/_bulk", self.alias)).with_ndjson(payload);
        let response = self.execute(&request, &ExecOptions::new()).await?;

        let items = response.body["items"].as_array().cloned().unwrap_or_default();
        let mut outcomes = Vec::with_capacity(batch.len());
        for (op, item) in batch.iter().zip(items.iter()) {
            // each item is wrapped in its action name
            let body = item
                .as_object()
                .and_then(|o| o.values().next())
                .cloned()
                .unwrap_or(Value::Null);
            let status = body["status"].as_u64().unwrap_or(0) as u16;
            let ok = (200..300).contains(&status);
            let error = body["error"]["reason"].as_str().map(|s| s.to_string());
            let token = if ok {
                VersionToken::from_response(&body).ok()
            } else {
                None
            };
            outcomes.push(BulkOutcome {
                key: op.key().to_string(),
                ok,
                status,
                error,
                token,
            });
        }
        Ok(outcomes)
    }
}
