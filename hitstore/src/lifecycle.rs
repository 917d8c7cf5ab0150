//! Schema and index lifecycle
//!
//! Index bootstrap, online schema growth, and shard/replica/reindex
//! migrations. Every multi-index step re-checks existence before acting, so
//! a procedure interrupted halfway resumes safely instead of corrupting the
//! topology. The alias stays valid throughout; readers never see a gap.

use crate::collection::Collection;
use crate::executor::ExecOptions;
use crate::schema::wire_properties;
use crate::transport::ClusterRequest;
use crate::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Increment applied when the total-field ceiling blocks a mapping update.
const FIELD_LIMIT_INCREMENT: u64 = 1_000;
const DEFAULT_FIELD_LIMIT: u64 = 1_000;

const TASK_POLL_TIMEOUT: &str = "10s";
const HEALTH_POLL_TIMEOUT: &str = "30s";

impl Collection {
    pub(crate) async fn index_exists(&self, name: &str) -> Result<bool> {
        let request = ClusterRequest::head(format!("/{}", name));
        let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
        Ok(response.is_success())
    }

    /// Physical index the collection alias points at, if the alias exists.
    pub(crate) async fn alias_target(&self) -> Result<Option<String>> {
        let request = ClusterRequest::get(format!("/_alias/{}", self.alias));
        let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
        if !response.is_success() {
            return Ok(None);
        }
        Ok(response
            .body
            .as_object()
            .and_then(|o| o.keys().next())
            .cloned())
    }

    async fn create_index(&self, name: &str, with_mappings: bool) -> Result<()> {
        let mut body = json!({
            "settings": {
                "number_of_shards": self.shards,
                "number_of_replicas": self.replicas,
            }
        });
        if with_mappings {
            if let Some(mapping) = &self.mapping {
                body["mappings"] = mapping.wire_mappings();
            }
        }
        let request = ClusterRequest::put(format!("/{}", name)).with_body(body);
        match self.execute(&request, &ExecOptions::no_recreate()).await {
            Ok(_) => Ok(()),
            // lost a creation race or resuming a partial bootstrap
            Err(error @ Error::Cluster { .. }) => {
                if self.index_exists(name).await? {
                    Ok(())
                } else {
                    Err(error)
                }
            }
            Err(error) => Err(error),
        }
    }

    async fn update_aliases(&self, actions: Vec<Value>) -> Result<()> {
        let request =
            ClusterRequest::post("/_aliases").with_body(json!({ "actions": actions }));
        self.execute(&request, &ExecOptions::no_recreate()).await?;
        Ok(())
    }

    /// Make sure the physical index exists and the alias resolves. Called at
    /// collection construction and again by the executor whenever a call
    /// fails with index-missing.
    pub(crate) async fn ensure_index(&self) -> Result<()> {
        if !self.index_exists(&self.index).await? {
            if self.index_exists(&self.alias).await? && self.alias_target().await?.is_none() {
                // An old-style bare index occupies the alias name; adopt it.
                self.adopt_bare_index().await?;
            } else {
                info!(collection = %self.name, index = %self.index, "creating index");
                self.create_index(&self.index, true).await?;
            }
        }
        if self.alias_target().await?.is_none() {
            self.update_aliases(vec![
                json!({"add": {"index": self.index, "alias": self.alias}}),
            ])
            .await?;
        }
        Ok(())
    }

    /// Clone a legacy bare index (named like the alias) into the versioned
    /// index and retarget the name atomically: the clone gains the alias in
    /// the same call that deletes the old index.
    async fn adopt_bare_index(&self) -> Result<()> {
        info!(collection = %self.name, "adopting bare index under alias name");
        self.set_index_settings(&self.alias, json!({"index.blocks.write": true}))
            .await?;
        if !self.index_exists(&self.index).await? {
            let request =
                ClusterRequest::post(format!("/{}/_clone/{}", self.alias, self.index));
            match self.execute(&request, &ExecOptions::no_recreate()).await {
                Ok(_) => {}
                Err(error @ Error::Cluster { .. }) => {
                    if !self.index_exists(&self.index).await? {
                        return Err(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }
        self.wait_for_green(&self.index).await?;
        self.update_aliases(vec![
            json!({"remove_index": {"index": self.alias}}),
            json!({"add": {"index": self.index, "alias": self.alias}}),
        ])
        .await?;
        self.set_index_settings(&self.index, json!({"index.blocks.write": null}))
            .await
    }

    /// Diff the descriptor against the live mapping and add any missing
    /// fields incrementally. If the total-field ceiling blocks the update,
    /// raise it by a fixed increment and retry once.
    pub(crate) async fn grow_mapping(&self) -> Result<()> {
        let Some(mapping) = &self.mapping else {
            return Ok(());
        };

        let live = self.live_mappings().await?;
        let missing = mapping.missing_from(&live);
        if missing.is_empty() {
            return Ok(());
        }
        debug!(
            collection = %self.name,
            fields = missing.len(),
            "growing live mapping"
        );

        let body = wire_properties(missing.into_iter());
        let request =
            ClusterRequest::put(format!("/{}/_mapping", self.alias)).with_body(body.clone());
        match self.execute(&request, &ExecOptions::new()).await {
            Ok(_) => Ok(()),
            Err(Error::Cluster { reason, .. }) if reason.contains("Limit of total fields") => {
                let limit = self.current_field_limit().await? + FIELD_LIMIT_INCREMENT;
                warn!(collection = %self.name, limit, "raising total-field ceiling");
                self.set_index_settings(
                    &self.alias,
                    json!({"index.mapping.total_fields.limit": limit}),
                )
                .await?;
                let retry =
                    ClusterRequest::put(format!("/{}/_mapping", self.alias)).with_body(body);
                self.execute(&retry, &ExecOptions::new()).await?;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn live_mappings(&self) -> Result<Value> {
        let request = ClusterRequest::get(format!("/{}/_mapping", self.alias));
        let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
        Ok(response
            .body
            .as_object()
            .and_then(|o| o.values().next())
            .map(|entry| entry["mappings"].clone())
            .unwrap_or(Value::Null))
    }

    async fn current_field_limit(&self) -> Result<u64> {
        let request = ClusterRequest::get(format!("/{}/_settings", self.alias));
        let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
        let limit = response
            .body
            .as_object()
            .and_then(|o| o.values().next())
            .and_then(|entry| {
                entry["settings"]["index"]["mapping"]["total_fields"]["limit"].as_str()
            })
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_FIELD_LIMIT);
        Ok(limit)
    }

    async fn set_index_settings(&self, index: &str, settings: Value) -> Result<()> {
        let request =
            ClusterRequest::put(format!("/{}/_settings", index)).with_body(settings);
        self.execute(&request, &ExecOptions::no_recreate()).await?;
        Ok(())
    }

    /// Cluster-wide write block used while shard topology is in motion.
    async fn set_cluster_write_block(&self, blocked: bool) -> Result<()> {
        let value = if blocked { json!(true) } else { Value::Null };
        let request = ClusterRequest::put("/_all/_settings")
            .with_body(json!({"index.blocks.write": value}));
        self.execute(&request, &ExecOptions::no_recreate()).await?;
        Ok(())
    }

    async fn wait_for_green(&self, index: &str) -> Result<()> {
        loop {
            let request = ClusterRequest::get(format!("/_cluster/health/{}", index))
                .with_query("wait_for_status", "green")
                .with_query("timeout", HEALTH_POLL_TIMEOUT);
            let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
            if response.body["status"].as_str() == Some("green") {
                return Ok(());
            }
            debug!(index, "waiting for green health");
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Poll a background job to completion and return its status block.
    /// Each poll blocks server-side for a bounded window; the job itself is
    /// never cancelled from here.
    pub(crate) async fn poll_task(&self, task_id: &str) -> Result<Value> {
        loop {
            let request = ClusterRequest::get(format!("/_tasks/{}", task_id))
                .with_query("wait_for_completion", "true")
                .with_query("timeout", TASK_POLL_TIMEOUT);
            let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
            if response.body["completed"].as_bool() == Some(true) {
                return Ok(response.body["task"]["status"].clone());
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn current_shard_count(&self) -> Result<u32> {
        let request = ClusterRequest::get(format!("/{}/_settings", self.index));
        let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
        response
            .body
            .as_object()
            .and_then(|o| o.values().next())
            .and_then(|entry| entry["settings"]["index"]["number_of_shards"].as_str())
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| Error::Lifecycle(format!("cannot read shard count of '{}'", self.index)))
    }

    async fn pick_data_node(&self) -> Result<Option<String>> {
        let request = ClusterRequest::get("/_nodes");
        let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
        let node = response.body["nodes"].as_object().and_then(|nodes| {
            nodes.values().find_map(|node| {
                let is_data = node["roles"]
                    .as_array()
                    .map(|roles| roles.iter().any(|r| r.as_str() == Some("data")))
                    .unwrap_or(false);
                if is_data {
                    node["name"].as_str().map(|s| s.to_string())
                } else {
                    None
                }
            })
        });
        Ok(node)
    }

    /// Destroy and recreate the collection's index.
    pub async fn wipe(&self) -> Result<()> {
        info!(collection = %self.name, "wiping collection");
        if self.index_exists(&self.index).await? {
            let request = ClusterRequest::delete(format!("/{}", self.index));
            self.execute(&request, &ExecOptions::no_recreate()).await?;
        }
        self.ensure_index().await?;
        self.grow_mapping().await
    }

    /// Change the replica count in place and wait for the cluster to settle.
    /// Replica topology is dynamic; no data movement beyond re-replication
    /// is needed.
    pub async fn fix_replicas(&self, target: u32) -> Result<()> {
        info!(collection = %self.name, target, "fixing replica count");
        self.set_index_settings(&self.index, json!({"number_of_replicas": target}))
            .await?;
        self.wait_for_green(&self.index).await
    }

    /// Migrate the collection to a new primary shard count without downtime:
    /// block writes, clone the live index aside, retarget the alias to the
    /// clone while dropping the old index, shrink or split the clone back
    /// into the original name, then clean up and unblock. Interrupting this
    /// anywhere and re-running continues from where it stopped.
    pub async fn fix_shards(&self, target: u32) -> Result<()> {
        if target == 0 {
            return Err(Error::Config("shard count must be positive".to_string()));
        }
        let current = self.current_shard_count().await?;
        if current == target {
            return Ok(());
        }
        let shrinking = target < current;
        if shrinking && current % target != 0 {
            return Err(Error::Lifecycle(format!(
                "cannot shrink {} shards into {}: not a divisor",
                current, target
            )));
        }
        if !shrinking && target % current != 0 {
            return Err(Error::Lifecycle(format!(
                "cannot split {} shards into {}: not a multiple",
                current, target
            )));
        }

        info!(collection = %self.name, current, target, "fixing shard count");
        let temp = format!("{}-fix", self.index);

        self.set_cluster_write_block(true).await?;

        if !self.index_exists(&temp).await? {
            let request = ClusterRequest::post(format!("/{}/_clone/{}", self.index, temp));
            self.execute(&request, &ExecOptions::no_recreate()).await?;
        }
        self.wait_for_green(&temp).await?;

        if shrinking {
            // shrink requires every shard copy on one node
            if let Some(node) = self.pick_data_node().await? {
                self.set_index_settings(
                    &temp,
                    json!({"index.routing.allocation.require._name": node}),
                )
                .await?;
                self.wait_for_green(&temp).await?;
            }
        }

        if self.alias_target().await?.as_deref() == Some(self.index.as_str()) {
            self.update_aliases(vec![
                json!({"add": {"index": temp, "alias": self.alias}}),
                json!({"remove_index": {"index": self.index}}),
            ])
            .await?;
        }

        if !self.index_exists(&self.index).await? {
            self.set_index_settings(&temp, json!({"index.blocks.write": true}))
                .await?;
            let verb = if shrinking { "_shrink" } else { "_split" };
            let request = ClusterRequest::post(format!("/{}/{}/{}", temp, verb, self.index))
                .with_body(json!({
                    "settings": {
                        "index.number_of_shards": target,
                        "index.number_of_replicas": self.replicas,
                    }
                }));
            self.execute(&request, &ExecOptions::no_recreate()).await?;
        }
        self.wait_for_green(&self.index).await?;

        if self.alias_target().await?.as_deref() == Some(temp.as_str()) {
            self.update_aliases(vec![
                json!({"add": {"index": self.index, "alias": self.alias}}),
                json!({"remove_index": {"index": temp}}),
            ])
            .await?;
        }

        // restore replica count and routing, then unblock
        self.set_index_settings(
            &self.index,
            json!({
                "number_of_replicas": self.replicas,
                "index.routing.allocation.require._name": null,
                "index.blocks.write": null,
            }),
        )
        .await?;
        self.set_cluster_write_block(false).await?;

        info!(collection = %self.name, target, "shard fix complete");
        Ok(())
    }

    /// Migrate documents onto the current descriptor mapping via a shadow
    /// index: writes move to the shadow while the old index stays readable,
    /// documents are copied by a cluster-side job, then the shadow is
    /// swapped back under the original name.
    pub async fn reindex(&self) -> Result<()> {
        let shadow = format!("{}-reindex", self.index);
        info!(collection = %self.name, shadow = %shadow, "reindexing");

        if !self.index_exists(&shadow).await? {
            self.create_index(&shadow, true).await?;
        }

        // shadow takes writes; the old index remains readable
        self.update_aliases(vec![
            json!({"add": {"index": shadow, "alias": self.alias, "is_write_index": true}}),
            json!({"add": {"index": self.index, "alias": self.alias, "is_write_index": false}}),
        ])
        .await?;

        let request = ClusterRequest::post("/_reindex")
            .with_query("wait_for_completion", "false")
            .with_body(json!({
                "source": {"index": self.index},
                "dest": {"index": shadow},
            }));
        let response = self.execute(&request, &ExecOptions::no_recreate()).await?;
        if let Some(task_id) = response.body["task"].as_str() {
            self.poll_task(task_id).await?;
        }

        // swap the shadow back under the original name
        if self.index_exists(&self.index).await? {
            self.update_aliases(vec![json!({"remove_index": {"index": self.index}})])
                .await?;
        }
        self.set_index_settings(&shadow, json!({"index.blocks.write": true}))
            .await?;
        if !self.index_exists(&self.index).await? {
            let request = ClusterRequest::post(format!("/{}/_clone/{}", shadow, self.index));
            self.execute(&request, &ExecOptions::no_recreate()).await?;
        }
        self.wait_for_green(&self.index).await?;
        self.update_aliases(vec![
            json!({"add": {"index": self.index, "alias": self.alias}}),
            json!({"remove_index": {"index": shadow}}),
        ])
        .await?;
        self.set_index_settings(&self.index, json!({"index.blocks.write": null}))
            .await?;

        info!(collection = %self.name, "reindex complete");
        Ok(())
    }
}
