//! Server-side cursor (scroll context) management
//!
//! A cursor is a server-side resource: whoever opens one must advance it to
//! exhaustion or close it explicitly. Every call path here closes a cursor
//! proactively the moment it is known to be drained.

use crate::collection::Collection;
use crate::executor::ExecOptions;
use crate::transport::{ClusterRequest, ClusterResponse};
use crate::Result;
use serde_json::{json, Value};
use tracing::{debug, warn};

impl Collection {
    /// Run the first page of a cursor-backed search.
    pub(crate) async fn open_cursor(&self, body: Value) -> Result<ClusterResponse> {
        let request = ClusterRequest::post(format!("/{}/_search", self.alias))
            .with_query("scroll", self.config.cursor_keepalive.clone())
            .with_body(body);
        self.execute(&request, &ExecOptions::new()).await
    }

    /// Fetch the next page for an open cursor.
    pub(crate) async fn advance_cursor(&self, cursor: &str) -> Result<ClusterResponse> {
        let request = ClusterRequest::post("/_search/scroll").with_body(json!({
            "scroll": self.config.cursor_keepalive,
            "scroll_id": cursor,
        }));
        self.execute(&request, &ExecOptions::new()).await
    }

    /// Release a cursor's server-side resources. Failures are logged and
    /// swallowed; the context expires on its own after the keep-alive.
    pub async fn close_cursor(&self, cursor: &str) {
        let request =
            ClusterRequest::delete("/_search/scroll").with_body(json!({ "scroll_id": [cursor] }));
        match self.execute(&request, &ExecOptions::no_recreate()).await {
            Ok(_) => debug!(collection = %self.name, "cursor closed"),
            Err(error) => {
                warn!(collection = %self.name, error = %error, "failed to close cursor")
            }
        }
    }
}
