//! Atomic updates: validation, single-document scripted updates, and
//! query-scoped bulk updates with conflict convergence.

pub mod script;

use crate::collection::Collection;
use crate::document::{validate_key, VersionToken};
use crate::executor::ExecOptions;
use crate::schema::FieldKind;
use crate::search::params::FilterClause;
use crate::search::build_bool_query;
use crate::transport::ClusterRequest;
use crate::{Error, Result};
use script::{render, UpdateOp, UpdateVerb};
use serde_json::json;
use tracing::{debug, info};

impl Collection {
    /// Reject any operation whose field path or verb does not match the
    /// schema, before anything touches the network.
    pub(crate) fn validate_ops(&self, ops: &[UpdateOp]) -> Result<()> {
        if ops.is_empty() {
            return Err(Error::Validation("no update operations supplied".to_string()));
        }
        let Some(mapping) = &self.mapping else {
            // Schemaless collections accept any path; only shape checks apply.
            return Ok(());
        };

        for op in ops {
            let field = mapping.field(&op.field).ok_or_else(|| {
                Error::Validation(format!(
                    "unknown field '{}' in collection '{}'",
                    op.field, self.name
                ))
            })?;

            let verb_ok = match field.kind {
                FieldKind::List => matches!(
                    op.verb,
                    UpdateVerb::Append
                        | UpdateVerb::AppendIfMissing
                        | UpdateVerb::Remove
                        | UpdateVerb::Delete
                ),
                FieldKind::Scalar => matches!(
                    op.verb,
                    UpdateVerb::Set
                        | UpdateVerb::Inc
                        | UpdateVerb::Dec
                        | UpdateVerb::Max
                        | UpdateVerb::Min
                        | UpdateVerb::Delete
                ),
            };
            if !verb_ok {
                return Err(Error::Validation(format!(
                    "operation {:?} is not applicable to {} field '{}'",
                    op.verb,
                    match field.kind {
                        FieldKind::List => "list",
                        FieldKind::Scalar => "scalar",
                    },
                    op.field
                )));
            }

            if op.verb == UpdateVerb::Delete
                && !op.value.is_null()
                && field.kind == FieldKind::Scalar
            {
                return Err(Error::Validation(format!(
                    "element delete on scalar field '{}'; omit the value to remove the key",
                    op.field
                )));
            }

            match op.verb {
                UpdateVerb::Inc | UpdateVerb::Dec if !field.engine_type.is_numeric() => {
                    return Err(Error::Validation(format!(
                        "operation {:?} requires a numeric field, '{}' is {:?}",
                        op.verb, op.field, field.engine_type
                    )));
                }
                UpdateVerb::Max | UpdateVerb::Min if !field.engine_type.is_ordered() => {
                    return Err(Error::Validation(format!(
                        "operation {:?} requires an ordered field, '{}' is {:?}",
                        op.verb, op.field, field.engine_type
                    )));
                }
                UpdateVerb::Set
                | UpdateVerb::Append
                | UpdateVerb::AppendIfMissing
                | UpdateVerb::Remove => field.validate_value(&op.value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Apply operations to one document as a single scripted mutation.
    /// With a token the write is conditional and a concurrent change
    /// surfaces as `VersionConflict`; without one, conflicts are retried.
    pub async fn update(
        &self,
        key: &str,
        ops: &[UpdateOp],
        token: Option<&VersionToken>,
    ) -> Result<VersionToken> {
        validate_key(key)?;
        self.validate_ops(ops)?;

        let script = render(ops);
        let mut request = ClusterRequest::post(format!("/{}/_update/{}", self.alias, key))
            .with_body(json!({ "script": script.to_wire() }));

        let options = match token {
            Some(VersionToken::Create) => {
                return Err(Error::Validation(
                    "cannot apply an update with the create sentinel; the document does not exist yet"
                        .to_string(),
                ));
            }
            Some(VersionToken::Exists { seq_no, primary_term }) => {
                request = request
                    .with_query("if_seq_no", seq_no.to_string())
                    .with_query("if_primary_term", primary_term.to_string());
                ExecOptions::fail_on_conflict(key)
            }
            None => ExecOptions::new(),
        };

        let response = self.execute(&request, &options).await?;
        VersionToken::from_response(&response.body)
    }

    /// Apply the same scripted mutation to every document matching a query,
    /// as a cluster-side background job. Conflicting documents are skipped
    /// by the job and retried by this loop until a pass completes with zero
    /// conflicts; the returned count covers all passes.
    pub async fn update_by_query(
        &self,
        query: &str,
        ops: &[UpdateOp],
        filters: &[FilterClause],
    ) -> Result<u64> {
        self.validate_ops(ops)?;
        let script = render(ops);
        let body = json!({
            "query": build_bool_query(Some(query), filters),
            "script": script.to_wire(),
        });

        let mut total_updated = 0u64;
        loop {
            let request = ClusterRequest::post(format!("/{}/_update_by_query", self.alias))
                .with_query("wait_for_completion", "false")
                .with_query("conflicts", "proceed")
                .with_query("refresh", "true")
                .with_body(body.clone());
            let response = self.execute(&request, &ExecOptions::new()).await?;
            let task_id = response.body["task"].as_str().ok_or_else(|| Error::Cluster {
                status: response.status,
                reason: "update_by_query did not return a task id".to_string(),
            })?;

            let status = self.poll_task(task_id).await?;
            total_updated += status["updated"].as_u64().unwrap_or(0);
            let conflicts = status["version_conflicts"].as_u64().unwrap_or(0);
            if conflicts == 0 {
                break;
            }
            debug!(
                collection = %self.name,
                conflicts,
                updated = total_updated,
                "update_by_query pass hit conflicts, re-running"
            );
            tokio::time::sleep(self.config.poll_interval()).await;
        }

        info!(collection = %self.name, updated = total_updated, "update_by_query converged");
        Ok(total_updated)
    }

    /// Delete every document matching a query; same convergence contract as
    /// `update_by_query`.
    pub async fn delete_by_query(&self, query: &str, filters: &[FilterClause]) -> Result<u64> {
        let body = json!({ "query": build_bool_query(Some(query), filters) });

        let mut total_deleted = 0u64;
        loop {
            let request = ClusterRequest::post(format!("/{}/_delete_by_query", self.alias))
                .with_query("wait_for_completion", "false")
                .with_query("conflicts", "proceed")
                .with_query("refresh", "true")
                .with_body(body.clone());
            let response = self.execute(&request, &ExecOptions::new()).await?;
            let task_id = response.body["task"].as_str().ok_or_else(|| Error::Cluster {
                status: response.status,
                reason: "delete_by_query did not return a task id".to_string(),
            })?;

            let status = self.poll_task(task_id).await?;
            total_deleted += status["deleted"].as_u64().unwrap_or(0);
            if status["version_conflicts"].as_u64().unwrap_or(0) == 0 {
                break;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }

        Ok(total_deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{collection_with, FakeTransport};

    fn task_started() -> crate::transport::ClusterResponse {
        FakeTransport::ok(json!({"task": "node1:42"}))
    }

    fn task_done(updated: u64, conflicts: u64) -> crate::transport::ClusterResponse {
        FakeTransport::ok(json!({
            "completed": true,
            "task": {"status": {"updated": updated, "deleted": 0, "version_conflicts": conflicts}}
        }))
    }

    #[tokio::test]
    async fn test_unknown_field_rejected_before_network() {
        let transport = FakeTransport::new(vec![]);
        let collection = collection_with(transport.clone());

        let error = collection
            .update("h1", &[UpdateOp::set("nope", json!(1))], None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_verb_field_mismatch_rejected() {
        let collection = collection_with(FakeTransport::new(vec![]));

        // APPEND on a scalar field
        let error = collection
            .update("h1", &[UpdateOp::append("severity", json!("high"))], None)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("not applicable"));

        // INC on a list field
        let error = collection
            .update("h1", &[UpdateOp::inc("tags", json!(1))], None)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("not applicable"));

        // INC on a non-numeric scalar
        let error = collection
            .update("h1", &[UpdateOp::inc("severity", json!(1))], None)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("numeric"));
    }

    #[tokio::test]
    async fn test_element_delete_requires_list_field() {
        let collection = collection_with(FakeTransport::new(vec![]));

        // removing one element only makes sense on a list
        let error = collection
            .update("h1", &[UpdateOp::delete("severity", json!("high"))], None)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("element delete"));

        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(
            json!({"_seq_no": 1, "_primary_term": 1}),
        ))]);
        let collection = collection_with(transport.clone());
        collection
            .update("h1", &[UpdateOp::delete("tags", json!("stale"))], None)
            .await
            .unwrap();
        let body = transport.requests()[0].body.as_ref().unwrap().clone();
        assert!(body["script"]["source"].as_str().unwrap().contains("indexOf"));
    }

    #[tokio::test]
    async fn test_enum_constraint_checked_on_set() {
        let collection = collection_with(FakeTransport::new(vec![]));
        let error = collection
            .update("h1", &[UpdateOp::set("severity", json!("urgent"))], None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_with_token_is_conditional() {
        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(
            json!({"_seq_no": 5, "_primary_term": 1, "result": "updated"}),
        ))]);
        let collection = collection_with(transport.clone());

        let token = VersionToken::Exists { seq_no: 4, primary_term: 1 };
        let next = collection
            .update("h1", &[UpdateOp::inc("count", json!(1))], Some(&token))
            .await
            .unwrap();
        assert_eq!(next, VersionToken::Exists { seq_no: 5, primary_term: 1 });

        let request = &transport.requests()[0];
        assert_eq!(request.path, "/hits/_update/h1");
        assert!(request.query.contains(&("if_seq_no".to_string(), "4".to_string())));
        assert_eq!(request.body.as_ref().unwrap()["script"]["lang"], "painless");
    }

    #[tokio::test]
    async fn test_update_with_create_sentinel_rejected() {
        let collection = collection_with(FakeTransport::new(vec![]));
        let error = collection
            .update("h1", &[UpdateOp::inc("count", json!(1))], Some(&VersionToken::Create))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_by_query_converges_after_conflicts() {
        let transport = FakeTransport::new(vec![
            Ok(task_started()),
            Ok(task_done(7, 3)),
            Ok(task_started()),
            Ok(task_done(2, 1)),
            Ok(task_started()),
            Ok(task_done(1, 0)),
        ]);
        let collection = collection_with(transport.clone());

        let updated = collection
            .update_by_query("severity:high", &[UpdateOp::inc("count", json!(1))], &[])
            .await
            .unwrap();
        assert_eq!(updated, 10);

        let submits = transport
            .requests()
            .iter()
            .filter(|r| r.path.ends_with("_update_by_query"))
            .count();
        assert_eq!(submits, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_by_query_counts_deletions() {
        let transport = FakeTransport::new(vec![
            Ok(task_started()),
            Ok(FakeTransport::ok(json!({
                "completed": true,
                "task": {"status": {"deleted": 4, "version_conflicts": 0}}
            }))),
        ]);
        let collection = collection_with(transport);

        let deleted = collection.delete_by_query("severity:low", &[]).await.unwrap();
        assert_eq!(deleted, 4);
    }
}
