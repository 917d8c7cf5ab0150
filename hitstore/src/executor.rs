//! Resilience executor
//!
//! Single choke point for every cluster call. Classifies each failure into
//! a small enum and drives an explicit retry state machine: linear backoff
//! capped at `max_backoff_secs`, a hard attempt ceiling, and accumulation of
//! partial `updated`/`deleted` counts across conflict retries so progress is
//! never lost from the final result.

use crate::collection::Collection;
use crate::transport::{ClusterRequest, ClusterResponse};
use crate::{Error, Result};
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// What a failed attempt means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The target index does not exist; recreate it and retry.
    IndexMissing,
    /// A concurrent writer changed the document under us.
    VersionConflict,
    /// Timeout, transport failure, or auth failure; reconnect and retry.
    Reconnect,
    /// Cluster throttling (429).
    Busy,
    /// Writes blocked cluster-side (403).
    WriteBlocked,
    /// Cluster not ready to serve (503).
    NotReady,
    /// Unknown failure; propagate immediately, never retry.
    Fatal,
}

/// Classify a non-success response. Pure so failure-path behavior is
/// testable without a cluster.
pub fn classify(status: u16, error_type: Option<&str>) -> FailureClass {
    match (status, error_type) {
        (_, Some("index_not_found_exception")) => FailureClass::IndexMissing,
        (409, _) | (_, Some("version_conflict_engine_exception")) => FailureClass::VersionConflict,
        (401, _) | (408, _) => FailureClass::Reconnect,
        (429, _) => FailureClass::Busy,
        (403, _) => FailureClass::WriteBlocked,
        (503, _) => FailureClass::NotReady,
        _ => FailureClass::Fatal,
    }
}

/// Classify a transport-level error (the request never produced a response).
pub fn classify_transport(error: &Error) -> FailureClass {
    match error {
        Error::Http(_) | Error::Transport(_) => FailureClass::Reconnect,
        _ => FailureClass::Fatal,
    }
}

/// Per-call retry bookkeeping.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempts: u32,
    pub updated: u64,
    pub deleted: u64,
    /// Most recent failure, kept for the exhausted-retries error.
    pub last_error: Option<String>,
}

impl RetryState {
    /// Linear backoff: one second per attempt, capped.
    pub fn backoff(&self, max_backoff_secs: u64) -> Duration {
        Duration::from_secs((self.attempts as u64).min(max_backoff_secs))
    }

    /// Fold partial progress from a conflicted attempt into the tally.
    pub fn absorb_counts(&mut self, body: &Value) {
        if let Some(updated) = body["updated"].as_u64() {
            self.updated += updated;
        }
        if let Some(deleted) = body["deleted"].as_u64() {
            self.deleted += deleted;
        }
    }

    /// Merge the tally into the final successful response body. A non-zero
    /// tally is reported even when the final body omits the count keys.
    pub fn merge_into(&self, body: &mut Value) {
        if self.updated == 0 && self.deleted == 0 {
            return;
        }
        if let Some(object) = body.as_object_mut() {
            if self.updated > 0 || object.contains_key("updated") {
                let updated = object.get("updated").and_then(Value::as_u64).unwrap_or(0);
                object.insert("updated".to_string(), Value::from(updated + self.updated));
            }
            if self.deleted > 0 || object.contains_key("deleted") {
                let deleted = object.get("deleted").and_then(Value::as_u64).unwrap_or(0);
                object.insert("deleted".to_string(), Value::from(deleted + self.deleted));
            }
        }
    }
}

/// Per-call executor options.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// When set, a version conflict aborts immediately with a typed error
    /// naming this document key instead of being retried.
    pub conflict_key: Option<String>,
    /// Recreate a missing index before retrying. Lifecycle operations turn
    /// this off to avoid recursing into themselves.
    pub recreate_missing: bool,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self {
            conflict_key: None,
            recreate_missing: true,
        }
    }

    pub fn fail_on_conflict(key: impl Into<String>) -> Self {
        Self {
            conflict_key: Some(key.into()),
            recreate_missing: true,
        }
    }

    pub fn no_recreate() -> Self {
        Self {
            conflict_key: None,
            recreate_missing: false,
        }
    }
}

/// Jittered micro-delay applied before surfacing a version conflict, to
/// de-synchronize competing writers that would otherwise retry in lockstep.
async fn conflict_jitter() {
    let micros = rand::thread_rng().gen_range(1_000..50_000);
    tokio::time::sleep(Duration::from_micros(micros)).await;
}

impl Collection {
    /// Execute one cluster request with classification and retries. Every
    /// network call in the engine funnels through here.
    pub(crate) async fn execute(
        &self,
        request: &ClusterRequest,
        options: &ExecOptions,
    ) -> Result<ClusterResponse> {
        let mut state = RetryState::default();

        loop {
            state.attempts += 1;
            if state.attempts > self.config.max_retries {
                let last_error = state
                    .last_error
                    .take()
                    .unwrap_or_else(|| format!("{} {}", request.method, request.path));
                return Err(Error::RetriesExhausted {
                    attempts: state.attempts - 1,
                    last_error,
                });
            }

            let outcome = self.transport.send(request).await;
            let response = match outcome {
                Ok(response) => response,
                Err(error) => match classify_transport(&error) {
                    FailureClass::Reconnect => {
                        warn!(
                            path = %request.path,
                            attempt = state.attempts,
                            error = %error,
                            "transport failure, reconnecting"
                        );
                        state.last_error = Some(error.to_string());
                        self.transport.reconnect().await?;
                        tokio::time::sleep(state.backoff(self.config.max_backoff_secs)).await;
                        continue;
                    }
                    _ => return Err(error),
                },
            };

            if response.is_success() {
                let mut response = response;
                state.merge_into(&mut response.body);
                return Ok(response);
            }

            // A plain 404 on a document path is a negative lookup, not a
            // failure; only the index-missing error type is retryable.
            if response.status == 404 && response.error_type().is_none() {
                return Ok(response);
            }

            state.last_error = Some(format!("status {}: {}", response.status, response.reason()));

            match classify(response.status, response.error_type()) {
                FailureClass::IndexMissing => {
                    if !options.recreate_missing {
                        return Err(Error::Cluster {
                            status: response.status,
                            reason: response.reason(),
                        });
                    }
                    debug!(collection = %self.name, "index missing, recreating before retry");
                    // boxed: recreation issues cluster calls back through here
                    Box::pin(self.ensure_index()).await?;
                }
                FailureClass::VersionConflict => {
                    if let Some(key) = &options.conflict_key {
                        conflict_jitter().await;
                        return Err(Error::VersionConflict {
                            collection: self.name.clone(),
                            key: key.clone(),
                        });
                    }
                    state.absorb_counts(&response.body);
                    debug!(
                        collection = %self.name,
                        attempt = state.attempts,
                        updated = state.updated,
                        deleted = state.deleted,
                        "version conflict absorbed, retrying"
                    );
                    tokio::time::sleep(state.backoff(self.config.max_backoff_secs)).await;
                }
                FailureClass::Reconnect => {
                    warn!(
                        path = %request.path,
                        status = response.status,
                        "reconnecting after transport-level response"
                    );
                    self.transport.reconnect().await?;
                    tokio::time::sleep(state.backoff(self.config.max_backoff_secs)).await;
                }
                FailureClass::Busy | FailureClass::WriteBlocked | FailureClass::NotReady => {
                    debug!(
                        path = %request.path,
                        status = response.status,
                        attempt = state.attempts,
                        "cluster unavailable, backing off"
                    );
                    tokio::time::sleep(state.backoff(self.config.max_backoff_secs)).await;
                }
                FailureClass::Fatal => {
                    return Err(Error::Cluster {
                        status: response.status,
                        reason: response.reason(),
                    });
                }
            }
        }
    }
}
