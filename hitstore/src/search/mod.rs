//! Search: boolean queries, pagination, aggregations, and streaming
//!
//! Facet, histogram, stats, and grouped searches all share the same boolean
//! query plus filter plumbing and differ only in aggregation shape.

pub mod cursor;
pub mod params;

use crate::collection::Collection;
use crate::document::Document;
use crate::executor::ExecOptions;
use crate::schema::EngineType;
use crate::transport::ClusterRequest;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use futures::Stream;
use params::{
    FacetRequest, FilterClause, GroupRequest, HistogramInterval, HistogramRequest, SearchParams,
    CURSOR_START,
};
use serde_json::{json, Map, Value};
use std::pin::Pin;

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub offset: usize,
    pub rows: usize,
    pub total: u64,
    pub items: Vec<Document>,
    /// Token for the next page of a deep-paging search; absent once the
    /// cursor is exhausted (it has already been closed by then).
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBucket {
    pub key: Value,
    /// Bucket start for date histograms, decoded from the epoch-millis key
    pub timestamp: Option<DateTime<Utc>>,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStats {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub sum: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub key: Value,
    pub hits: Vec<Document>,
}

/// Flat matches and matched sequences from a pattern-language search.
#[derive(Debug, Clone)]
pub struct PatternMatches {
    pub events: Vec<Document>,
    pub sequences: Vec<Vec<Document>>,
}

/// Boolean query shared by search, counting, aggregations, and the
/// query-scoped update/delete paths: the query string as a must clause,
/// every filter as an independent filter clause.
pub(crate) fn build_bool_query(query: Option<&str>, filters: &[FilterClause]) -> Value {
    let must = match query {
        Some(q) if !q.is_empty() && q != "*" => {
            json!([{ "query_string": { "query": q } }])
        }
        _ => json!([{ "match_all": {} }]),
    };

    let filter: Vec<Value> = filters
        .iter()
        .map(|clause| match clause {
            FilterClause::Term { field, value } => json!({ "term": { (field): value } }),
            FilterClause::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), gte.clone());
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), lte.clone());
                }
                json!({ "range": { (field): bounds } })
            }
            FilterClause::Exists { field } => json!({ "exists": { "field": field } }),
        })
        .collect();

    json!({ "bool": { "must": must, "filter": filter } })
}

/// A search hit carries no sequence/term pair; parse leniently.
fn parse_search_hit(hit: &Value) -> Document {
    let id = hit["_id"].as_str().unwrap_or_default().to_string();
    let fields = match &hit["_source"] {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    Document::new(id, fields)
}

fn parse_hits(body: &Value) -> Vec<Document> {
    body["hits"]["hits"]
        .as_array()
        .map(|hits| hits.iter().map(parse_search_hit).collect())
        .unwrap_or_default()
}

fn total_hits(body: &Value) -> u64 {
    body["hits"]["total"]["value"].as_u64().unwrap_or(0)
}

impl Collection {
    /// Request body shared by paged and cursor-backed searches.
    fn build_search_body(&self, search: &SearchParams) -> Value {
        let mut body = Map::new();
        body.insert(
            "query".to_string(),
            build_bool_query(search.query.as_deref(), &search.filters),
        );
        body.insert("size".to_string(), json!(search.rows()));

        if !search.sort.is_empty() {
            let sort: Vec<Value> = search
                .sort
                .iter()
                .map(|s| json!({ (&s.field): { "order": s.order.wire_name() } }))
                .collect();
            body.insert("sort".to_string(), json!(sort));
        }

        let projection = search
            .fields
            .clone()
            .unwrap_or_else(|| self.stored_fields.clone());
        if !projection.is_empty() {
            body.insert("_source".to_string(), json!(projection));
        }

        if let Some(timeout) = search.timeout_secs {
            body.insert("timeout".to_string(), json!(format!("{}s", timeout)));
        }

        Value::Object(body)
    }

    /// Run one search page. With a cursor in the parameters this opens or
    /// advances a deep-paging cursor; the cursor is closed automatically as
    /// soon as a short page shows it is exhausted.
    pub async fn search(&self, search: &SearchParams) -> Result<SearchResult> {
        let rows = search.rows();

        let response = match search.cursor.as_deref() {
            None => {
                let mut body = self.build_search_body(search);
                body["from"] = json!(search.offset);
                let request =
                    ClusterRequest::post(format!("/{}/_search", self.alias)).with_body(body);
                self.execute(&request, &ExecOptions::new()).await?
            }
            Some(CURSOR_START) => self.open_cursor(self.build_search_body(search)).await?,
            Some(cursor) => self.advance_cursor(cursor).await?,
        };

        let items = parse_hits(&response.body);
        let next_cursor = if search.cursor.is_some() {
            let cursor_id = response.body["_scroll_id"].as_str().map(|s| s.to_string());
            match cursor_id {
                Some(id) if items.len() < rows => {
                    self.close_cursor(&id).await;
                    None
                }
                other => other,
            }
        } else {
            None
        };

        Ok(SearchResult {
            offset: search.offset,
            rows,
            total: total_hits(&response.body),
            items,
            next_cursor,
        })
    }

    /// Lazily stream every match, paging through a cursor internally in
    /// fixed-size batches. The stream must be drained (or the underlying
    /// cursor closed) to release server-side resources; it closes the cursor
    /// itself the moment the last page is seen.
    pub fn stream_search(
        &self,
        search: SearchParams,
    ) -> Pin<Box<dyn Stream<Item = Result<Document>> + Send + '_>> {
        let batch = self.config.stream_batch_size;
        Box::pin(async_stream::try_stream! {
            let mut page = SearchParams { cursor: None, ..search };
            page.rows = Some(batch);
            let body = self.build_search_body(&page);

            let mut response = self.open_cursor(body).await?;
            loop {
                let items = parse_hits(&response.body);
                let cursor = response.body["_scroll_id"].as_str().map(|s| s.to_string());
                let drained = items.len() < batch;

                for document in items {
                    yield document;
                }

                let Some(cursor) = cursor else { break };
                if drained {
                    self.close_cursor(&cursor).await;
                    break;
                }
                response = self.advance_cursor(&cursor).await?;
            }
        })
    }

    /// Match count without fetching hits.
    pub async fn count(&self, search: &SearchParams) -> Result<u64> {
        let body = json!({
            "query": build_bool_query(search.query.as_deref(), &search.filters)
        });
        let request = ClusterRequest::post(format!("/{}/_count", self.alias)).with_body(body);
        let response = self.execute(&request, &ExecOptions::new()).await?;
        Ok(response.body["count"].as_u64().unwrap_or(0))
    }

    /// Run one aggregation next to the shared boolean query, with hits
    /// suppressed.
    async fn aggregate(&self, search: &SearchParams, name: &str, agg: Value) -> Result<Value> {
        let body = json!({
            "query": build_bool_query(search.query.as_deref(), &search.filters),
            "size": 0,
            "aggregations": { (name): agg },
        });
        let request = ClusterRequest::post(format!("/{}/_search", self.alias)).with_body(body);
        let response = self.execute(&request, &ExecOptions::new()).await?;
        Ok(response.body["aggregations"][name].clone())
    }

    /// Term buckets for one field.
    pub async fn facet(
        &self,
        facet: &FacetRequest,
        search: &SearchParams,
    ) -> Result<Vec<FacetBucket>> {
        let agg = json!({ "terms": { "field": facet.field, "size": facet.size } });
        let result = self.aggregate(search, "facet", agg).await?;
        Ok(result["buckets"]
            .as_array()
            .map(|buckets| {
                buckets
                    .iter()
                    .map(|b| FacetBucket {
                        value: match &b["key"] {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        },
                        count: b["doc_count"].as_u64().unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Bucketed counts over a numeric or date field. The bucket shape must
    /// agree with the field's mapped type and stay under the bucket ceiling.
    pub async fn histogram(
        &self,
        histogram: &HistogramRequest,
        search: &SearchParams,
    ) -> Result<Vec<HistogramBucket>> {
        histogram.validate()?;

        if let Some(field) = self.mapping.as_ref().and_then(|m| m.field(&histogram.field)) {
            match (&histogram.interval, field.engine_type) {
                (HistogramInterval::Calendar(_), EngineType::Date) => {}
                (HistogramInterval::Numeric { .. }, t) if t.is_numeric() => {}
                (HistogramInterval::Calendar(_), t) => {
                    return Err(Error::Config(format!(
                        "calendar histogram requires a date field, '{}' is {:?}",
                        histogram.field, t
                    )));
                }
                (HistogramInterval::Numeric { .. }, t) => {
                    return Err(Error::Config(format!(
                        "numeric histogram requires a numeric field, '{}' is {:?}",
                        histogram.field, t
                    )));
                }
            }
        }

        let agg = match &histogram.interval {
            HistogramInterval::Numeric { interval, min, max } => json!({
                "histogram": {
                    "field": histogram.field,
                    "interval": interval,
                    "extended_bounds": { "min": min, "max": max },
                }
            }),
            HistogramInterval::Calendar(unit) => json!({
                "date_histogram": {
                    "field": histogram.field,
                    "calendar_interval": unit,
                }
            }),
        };

        let dated = matches!(histogram.interval, HistogramInterval::Calendar(_));
        let result = self.aggregate(search, "histogram", agg).await?;
        Ok(result["buckets"]
            .as_array()
            .map(|buckets| {
                buckets
                    .iter()
                    .map(|b| HistogramBucket {
                        key: b["key"].clone(),
                        timestamp: if dated {
                            b["key"]
                                .as_i64()
                                .and_then(|millis| DateTime::<Utc>::from_timestamp_millis(millis))
                        } else {
                            None
                        },
                        count: b["doc_count"].as_u64().unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Numeric summary statistics for one field.
    pub async fn stats(&self, field: &str, search: &SearchParams) -> Result<FieldStats> {
        let agg = json!({ "stats": { "field": field } });
        let result = self.aggregate(search, "stats", agg).await?;
        Ok(FieldStats {
            count: result["count"].as_u64().unwrap_or(0),
            min: result["min"].as_f64(),
            max: result["max"].as_f64(),
            avg: result["avg"].as_f64(),
            sum: result["sum"].as_f64(),
        })
    }

    /// Field-collapsed search: one group per distinct value, each carrying
    /// up to `group_limit` inner hits.
    pub async fn grouped_search(
        &self,
        group: &GroupRequest,
        search: &SearchParams,
    ) -> Result<Vec<Group>> {
        group.validate()?;

        let mut body = self.build_search_body(search);
        body["collapse"] = json!({
            "field": group.field,
            "inner_hits": { "name": "group", "size": group.group_limit },
        });
        let request = ClusterRequest::post(format!("/{}/_search", self.alias)).with_body(body);
        let response = self.execute(&request, &ExecOptions::new()).await?;

        let groups = response.body["hits"]["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .map(|hit| {
                        let top = parse_search_hit(hit);
                        let key = top.get(&group.field).cloned().unwrap_or(Value::Null);
                        let inner = hit["inner_hits"]["group"]["hits"]["hits"]
                            .as_array()
                            .map(|h| h.iter().map(parse_search_hit).collect())
                            .unwrap_or_else(|| vec![top]);
                        Group { key, hits: inner }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(groups)
    }

    /// Expression/sequence search in the engine's event-correlation
    /// language, returning both flat matches and matched sequences.
    pub async fn raw_pattern_search(
        &self,
        pattern: &str,
        search: &SearchParams,
    ) -> Result<PatternMatches> {
        let mut body = Map::new();
        body.insert("query".to_string(), json!(pattern));
        body.insert("size".to_string(), json!(search.rows()));
        if !search.filters.is_empty() {
            body.insert(
                "filter".to_string(),
                build_bool_query(None, &search.filters),
            );
        }

        let request = ClusterRequest::post(format!("/{}/_eql/search", self.alias))
            .with_body(Value::Object(body));
        let response = self.execute(&request, &ExecOptions::new()).await?;

        let events = response.body["hits"]["events"]
            .as_array()
            .map(|events| events.iter().map(parse_search_hit).collect())
            .unwrap_or_default();
        let sequences = response.body["hits"]["sequences"]
            .as_array()
            .map(|sequences| {
                sequences
                    .iter()
                    .map(|s| {
                        s["events"]
                            .as_array()
                            .map(|events| events.iter().map(parse_search_hit).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(PatternMatches { events, sequences })
    }

    /// Every document key matching the parameters, paged through a cursor.
    pub async fn keys(&self, search: &SearchParams) -> Result<Vec<String>> {
        let batch = self.config.stream_batch_size;
        let mut page = SearchParams { cursor: None, ..search.clone() };
        page.rows = Some(batch);
        let mut body = self.build_search_body(&page);
        body["_source"] = json!(false);

        let mut keys = Vec::new();
        let mut response = self.open_cursor(body).await?;
        loop {
            let hits = response.body["hits"]["hits"].as_array().cloned().unwrap_or_default();
            let cursor = response.body["_scroll_id"].as_str().map(|s| s.to_string());
            for hit in &hits {
                if let Some(id) = hit["_id"].as_str() {
                    keys.push(id.to_string());
                }
            }
            let Some(cursor) = cursor else { break };
            if hits.len() < batch {
                self.close_cursor(&cursor).await;
                break;
            }
            response = self.advance_cursor(&cursor).await?;
        }
        Ok(keys)
    }

    /// Flattened field paths of the live mapping.
    pub async fn fields(&self) -> Result<Vec<String>> {
        let request = ClusterRequest::get(format!("/{}/_mapping", self.alias));
        let response = self.execute(&request, &ExecOptions::new()).await?;
        let mappings = response
            .body
            .as_object()
            .and_then(|o| o.values().next())
            .map(|entry| entry["mappings"].clone())
            .unwrap_or(Value::Null);
        Ok(crate::schema::live_field_paths(&mappings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{collection_with, FakeTransport};
    use futures::TryStreamExt;
    use params::SortSpec;

    fn hit(id: &str) -> Value {
        json!({"_id": id, "_source": {"title": id}})
    }

    fn page(ids: &[&str], cursor: Option<&str>, total: u64) -> Value {
        let mut body = json!({
            "hits": {
                "total": {"value": total},
                "hits": ids.iter().map(|id| hit(id)).collect::<Vec<_>>(),
            }
        });
        if let Some(cursor) = cursor {
            body["_scroll_id"] = json!(cursor);
        }
        body
    }

    #[test]
    fn test_bool_query_shape() {
        let query = build_bool_query(
            Some("severity:high"),
            &[
                FilterClause::term("severity", json!("high")),
                FilterClause::range("score", Some(json!(0.5)), None),
                FilterClause::exists("created"),
            ],
        );
        assert_eq!(query["bool"]["must"][0]["query_string"]["query"], "severity:high");
        assert_eq!(query["bool"]["filter"][0]["term"]["severity"], "high");
        assert_eq!(query["bool"]["filter"][1]["range"]["score"]["gte"], 0.5);
        assert_eq!(query["bool"]["filter"][2]["exists"]["field"], "created");

        let match_all = build_bool_query(None, &[]);
        assert!(match_all["bool"]["must"][0]["match_all"].is_object());
    }

    #[test]
    fn test_search_body_projection_defaults_to_stored_fields() {
        let collection = collection_with(FakeTransport::new(vec![]));
        let body = collection.build_search_body(&SearchParams::new().with_rows(5));
        assert_eq!(body["_source"], json!(["title"]));
        assert_eq!(body["size"], 5);
    }

    #[test]
    fn test_search_body_sort_and_timeout() {
        let collection = collection_with(FakeTransport::new(vec![]));
        let params = SearchParams::new()
            .with_sort(SortSpec::desc("created"))
            .with_timeout_secs(3);
        let body = collection.build_search_body(&params);
        assert_eq!(body["sort"][0]["created"]["order"], "desc");
        assert_eq!(body["timeout"], "3s");
    }

    #[tokio::test]
    async fn test_plain_search_uses_from() {
        let transport =
            FakeTransport::new(vec![Ok(FakeTransport::ok(page(&["h1", "h2"], None, 12)))]);
        let collection = collection_with(transport.clone());

        let result = collection
            .search(&SearchParams::new().with_offset(10).with_rows(2))
            .await
            .unwrap();
        assert_eq!(result.total, 12);
        assert_eq!(result.offset, 10);
        assert_eq!(result.items.len(), 2);
        assert!(result.next_cursor.is_none());

        let request = &transport.requests()[0];
        assert_eq!(request.body.as_ref().unwrap()["from"], 10);
    }

    #[tokio::test]
    async fn test_cursor_opens_and_closes_on_short_page() {
        let transport = FakeTransport::new(vec![
            Ok(FakeTransport::ok(page(&["h1", "h2"], Some("c1"), 3))),
            Ok(FakeTransport::ok(page(&["h3"], Some("c2"), 3))),
            Ok(FakeTransport::ok(json!({}))), // close
        ]);
        let collection = collection_with(transport.clone());

        let first = collection
            .search(&SearchParams::new().with_rows(2).with_cursor(CURSOR_START))
            .await
            .unwrap();
        assert_eq!(first.next_cursor.as_deref(), Some("c1"));

        let second = collection
            .search(&SearchParams::new().with_rows(2).with_cursor("c1"))
            .await
            .unwrap();
        assert!(second.next_cursor.is_none());

        let requests = transport.requests();
        assert!(requests[0].query.iter().any(|(k, _)| k == "scroll"));
        assert_eq!(requests[1].path, "/_search/scroll");
        assert_eq!(requests[2].path, "/_search/scroll");
        assert_eq!(requests[2].method, reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn test_stream_search_drains_all_pages_without_duplicates() {
        // stream batch is 500; two full-page responses would exceed the
        // fixture, so script one short page after one exact-size page.
        let full: Vec<String> = (0..500).map(|i| format!("h{}", i)).collect();
        let full_refs: Vec<&str> = full.iter().map(|s| s.as_str()).collect();
        let transport = FakeTransport::new(vec![
            Ok(FakeTransport::ok(page(&full_refs, Some("c1"), 501))),
            Ok(FakeTransport::ok(page(&["tail"], Some("c2"), 501))),
            Ok(FakeTransport::ok(json!({}))), // close
        ]);
        let collection = collection_with(transport.clone());

        let documents: Vec<Document> = collection
            .stream_search(SearchParams::new())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(documents.len(), 501);
        let mut ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 501);

        // final request must be the cursor close
        let requests = transport.requests();
        assert_eq!(requests.last().unwrap().method, reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn test_facet_parses_buckets() {
        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(json!({
            "aggregations": {"facet": {"buckets": [
                {"key": "high", "doc_count": 9},
                {"key": "low", "doc_count": 2},
            ]}}
        })))]);
        let collection = collection_with(transport);

        let buckets = collection
            .facet(&FacetRequest::new("severity", 10), &SearchParams::new())
            .await
            .unwrap();
        assert_eq!(
            buckets,
            vec![
                FacetBucket { value: "high".to_string(), count: 9 },
                FacetBucket { value: "low".to_string(), count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_histogram_interval_must_match_field_type() {
        let collection = collection_with(FakeTransport::new(vec![]));

        let error = collection
            .histogram(
                &HistogramRequest::numeric("created", 1.0, 0.0, 10.0),
                &SearchParams::new(),
            )
            .await
            .unwrap_err();
        assert!(error.to_string().contains("numeric histogram requires"));

        let error = collection
            .histogram(&HistogramRequest::calendar("score", "day"), &SearchParams::new())
            .await
            .unwrap_err();
        assert!(error.to_string().contains("calendar histogram requires"));
    }

    #[tokio::test]
    async fn test_date_histogram_uses_calendar_interval() {
        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(json!({
            "aggregations": {"histogram": {"buckets": [
                {"key": 1700000000000i64, "doc_count": 4},
            ]}}
        })))]);
        let collection = collection_with(transport.clone());

        let buckets = collection
            .histogram(&HistogramRequest::calendar("created", "day"), &SearchParams::new())
            .await
            .unwrap();
        assert_eq!(buckets[0].count, 4);
        assert_eq!(
            buckets[0].timestamp,
            DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000)
        );

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(
            body["aggregations"]["histogram"]["date_histogram"]["calendar_interval"],
            "day"
        );
        assert_eq!(body["size"], 0);
    }

    #[tokio::test]
    async fn test_stats_parses_summary() {
        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(json!({
            "aggregations": {"stats": {"count": 3, "min": 1.0, "max": 9.0, "avg": 4.0, "sum": 12.0}}
        })))]);
        let collection = collection_with(transport);

        let stats = collection.stats("score", &SearchParams::new()).await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.max, Some(9.0));
    }

    #[tokio::test]
    async fn test_grouped_search_caps_and_parses_inner_hits() {
        let collection = collection_with(FakeTransport::new(vec![]));
        let error = collection
            .grouped_search(&GroupRequest::new("severity", 1000), &SearchParams::new())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Config(_)));

        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(json!({
            "hits": {"total": {"value": 2}, "hits": [{
                "_id": "h1",
                "_source": {"severity": "high"},
                "inner_hits": {"group": {"hits": {"hits": [hit("h1"), hit("h2")]}}}
            }]}
        })))]);
        let collection = collection_with(transport.clone());
        let groups = collection
            .grouped_search(&GroupRequest::new("severity", 5), &SearchParams::new())
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, json!("high"));
        assert_eq!(groups[0].hits.len(), 2);

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["collapse"]["inner_hits"]["size"], 5);
    }

    #[tokio::test]
    async fn test_raw_pattern_search_returns_events_and_sequences() {
        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(json!({
            "hits": {
                "events": [hit("e1")],
                "sequences": [{"events": [hit("s1"), hit("s2")]}],
            }
        })))]);
        let collection = collection_with(transport.clone());

        let matches = collection
            .raw_pattern_search("process where severity == \"high\"", &SearchParams::new())
            .await
            .unwrap();
        assert_eq!(matches.events.len(), 1);
        assert_eq!(matches.sequences[0].len(), 2);
        assert_eq!(transport.requests()[0].path, "/hits/_eql/search");
    }

    #[tokio::test]
    async fn test_keys_disables_source() {
        let transport =
            FakeTransport::new(vec![Ok(FakeTransport::ok(page(&["h1", "h2"], Some("c1"), 2)))]);
        let collection = collection_with(transport.clone());

        let keys = collection.keys(&SearchParams::new()).await.unwrap();
        assert_eq!(keys, vec!["h1", "h2"]);
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["_source"], json!(false));
    }

    #[tokio::test]
    async fn test_fields_flattens_live_mapping() {
        let transport = FakeTransport::new(vec![Ok(FakeTransport::ok(json!({
            "hits-v1": {"mappings": {"properties": {
                "title": {"type": "text"},
                "meta": {"properties": {"owner": {"type": "keyword"}}},
            }}}
        })))]);
        let collection = collection_with(transport);

        let fields = collection.fields().await.unwrap();
        assert_eq!(fields, vec!["meta.owner".to_string(), "title".to_string()]);
    }
}
