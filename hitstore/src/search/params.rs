//! Search parameters
//!
//! An immutable set of recognized options. Raw option maps coming from the
//! application boundary are parsed strictly: an unrecognized key is a
//! configuration error, never silently ignored.

use crate::{Error, Result};
use serde_json::{Map, Value};

/// Ceiling on per-group inner hits for grouped searches.
pub const MAX_GROUP_SIZE: usize = 100;

/// Ceiling on the number of buckets a histogram may request.
pub const MAX_HISTOGRAM_BUCKETS: u64 = 10_000;

const DEFAULT_ROWS: usize = 10;

/// Cursor request that opens a fresh server-side cursor.
pub const CURSOR_START: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn wire_name(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Desc }
    }

    /// Parse "field", "field asc" or "field desc".
    fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split_whitespace();
        let field = parts
            .next()
            .ok_or_else(|| Error::Config("empty sort spec".to_string()))?
            .to_string();
        let order = match parts.next() {
            None | Some("asc") => SortOrder::Asc,
            Some("desc") => SortOrder::Desc,
            Some(other) => {
                return Err(Error::Config(format!("unknown sort order '{}'", other)));
            }
        };
        Ok(Self { field, order })
    }
}

/// One independent filter clause, ANDed with the query string.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Term { field: String, value: Value },
    Range { field: String, gte: Option<Value>, lte: Option<Value> },
    Exists { field: String },
}

impl FilterClause {
    pub fn term(field: impl Into<String>, value: Value) -> Self {
        FilterClause::Term { field: field.into(), value }
    }

    pub fn range(field: impl Into<String>, gte: Option<Value>, lte: Option<Value>) -> Self {
        FilterClause::Range { field: field.into(), gte, lte }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        FilterClause::Exists { field: field.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Query string in the engine's pattern language; None matches all
    pub query: Option<String>,
    pub offset: usize,
    pub rows: Option<usize>,
    pub sort: Vec<SortSpec>,
    /// Field projection; None means the collection's stored fields
    pub fields: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub filters: Vec<FilterClause>,
    /// Deep-paging cursor: `CURSOR_START` opens one, otherwise a token from
    /// the previous page
    pub cursor: Option<String>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_filter(mut self, filter: FilterClause) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn rows(&self) -> usize {
        self.rows.unwrap_or(DEFAULT_ROWS)
    }

    /// Parse a raw option map from the application boundary. Recognized
    /// keys: q, offset, rows, sort, fields, timeout, cursor.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let mut params = SearchParams::new();
        for (key, value) in options {
            match key.as_str() {
                "q" => {
                    params.query = Some(
                        value
                            .as_str()
                            .ok_or_else(|| Error::Config("'q' must be a string".to_string()))?
                            .to_string(),
                    );
                }
                "offset" => {
                    params.offset = value
                        .as_u64()
                        .ok_or_else(|| Error::Config("'offset' must be an integer".to_string()))?
                        as usize;
                }
                "rows" => {
                    params.rows = Some(value.as_u64().ok_or_else(|| {
                        Error::Config("'rows' must be an integer".to_string())
                    })? as usize);
                }
                "sort" => {
                    let raw = value
                        .as_str()
                        .ok_or_else(|| Error::Config("'sort' must be a string".to_string()))?;
                    for spec in raw.split(',') {
                        params.sort.push(SortSpec::parse(spec.trim())?);
                    }
                }
                "fields" => {
                    let list = value
                        .as_array()
                        .ok_or_else(|| Error::Config("'fields' must be an array".to_string()))?;
                    let mut fields = Vec::with_capacity(list.len());
                    for item in list {
                        fields.push(
                            item.as_str()
                                .ok_or_else(|| {
                                    Error::Config("'fields' entries must be strings".to_string())
                                })?
                                .to_string(),
                        );
                    }
                    params.fields = Some(fields);
                }
                "timeout" => {
                    params.timeout_secs = Some(value.as_u64().ok_or_else(|| {
                        Error::Config("'timeout' must be an integer".to_string())
                    })?);
                }
                "cursor" => {
                    params.cursor = Some(
                        value
                            .as_str()
                            .ok_or_else(|| Error::Config("'cursor' must be a string".to_string()))?
                            .to_string(),
                    );
                }
                other => {
                    return Err(Error::Config(format!(
                        "unrecognized search option '{}'",
                        other
                    )));
                }
            }
        }
        Ok(params)
    }
}

/// A facet (term-bucket) request.
#[derive(Debug, Clone)]
pub struct FacetRequest {
    pub field: String,
    pub size: usize,
}

impl FacetRequest {
    pub fn new(field: impl Into<String>, size: usize) -> Self {
        Self { field: field.into(), size }
    }
}

/// Histogram bucket spacing. Numeric histograms carry explicit bounds so the
/// bucket count can be validated before the query is issued; date histograms
/// use a calendar unit.
#[derive(Debug, Clone)]
pub enum HistogramInterval {
    Numeric { interval: f64, min: f64, max: f64 },
    Calendar(String),
}

#[derive(Debug, Clone)]
pub struct HistogramRequest {
    pub field: String,
    pub interval: HistogramInterval,
}

const CALENDAR_UNITS: &[&str] = &[
    "minute", "hour", "day", "week", "month", "quarter", "year",
];

impl HistogramRequest {
    pub fn numeric(field: impl Into<String>, interval: f64, min: f64, max: f64) -> Self {
        Self {
            field: field.into(),
            interval: HistogramInterval::Numeric { interval, min, max },
        }
    }

    pub fn calendar(field: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            interval: HistogramInterval::Calendar(unit.into()),
        }
    }

    /// Reject oversized or malformed bucket requests before any network
    /// call.
    pub fn validate(&self) -> Result<()> {
        match &self.interval {
            HistogramInterval::Numeric { interval, min, max } => {
                if *interval <= 0.0 {
                    return Err(Error::Config(format!(
                        "histogram interval for '{}' must be positive",
                        self.field
                    )));
                }
                if max < min {
                    return Err(Error::Config(format!(
                        "histogram bounds for '{}' are inverted",
                        self.field
                    )));
                }
                let buckets = ((max - min) / interval).ceil() as u64;
                if buckets > MAX_HISTOGRAM_BUCKETS {
                    return Err(Error::Config(format!(
                        "histogram on '{}' would produce {} buckets, limit is {}",
                        self.field, buckets, MAX_HISTOGRAM_BUCKETS
                    )));
                }
            }
            HistogramInterval::Calendar(unit) => {
                if !CALENDAR_UNITS.contains(&unit.as_str()) {
                    return Err(Error::Config(format!(
                        "unknown calendar interval '{}' for '{}'",
                        unit, self.field
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A grouped-search request: field collapse with capped per-group hits.
#[derive(Debug, Clone)]
pub struct GroupRequest {
    pub field: String,
    pub group_limit: usize,
}

impl GroupRequest {
    pub fn new(field: impl Into<String>, group_limit: usize) -> Self {
        Self { field: field.into(), group_limit }
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_limit == 0 || self.group_limit > MAX_GROUP_SIZE {
            return Err(Error::Config(format!(
                "group limit {} for '{}' outside 1..={}",
                self.group_limit, self.field, MAX_GROUP_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unrecognized_option_is_config_error() {
        let options = json!({"q": "severity:high", "bogus": 1});
        let error = SearchParams::from_options(options.as_object().unwrap()).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
        assert!(error.to_string().contains("bogus"));
    }

    #[test]
    fn test_parse_full_option_map() {
        let options = json!({
            "q": "severity:high",
            "offset": 20,
            "rows": 50,
            "sort": "created desc, title",
            "fields": ["title", "severity"],
            "timeout": 5,
            "cursor": "*"
        });
        let params = SearchParams::from_options(options.as_object().unwrap()).unwrap();
        assert_eq!(params.query.as_deref(), Some("severity:high"));
        assert_eq!(params.offset, 20);
        assert_eq!(params.rows(), 50);
        assert_eq!(params.sort[0], SortSpec::desc("created"));
        assert_eq!(params.sort[1], SortSpec::asc("title"));
        assert_eq!(params.cursor.as_deref(), Some(CURSOR_START));
    }

    #[test]
    fn test_bad_sort_order_rejected() {
        let options = json!({"sort": "created sideways"});
        assert!(SearchParams::from_options(options.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_histogram_bucket_ceiling() {
        let ok = HistogramRequest::numeric("score", 1.0, 0.0, 100.0);
        assert!(ok.validate().is_ok());

        let oversized = HistogramRequest::numeric("score", 0.001, 0.0, 100.0);
        let error = oversized.validate().unwrap_err();
        assert!(error.to_string().contains("limit"));

        assert!(HistogramRequest::numeric("score", -1.0, 0.0, 10.0).validate().is_err());
        assert!(HistogramRequest::calendar("created", "day").validate().is_ok());
        assert!(HistogramRequest::calendar("created", "fortnight").validate().is_err());
    }

    #[test]
    fn test_group_limit_cap() {
        assert!(GroupRequest::new("severity", 10).validate().is_ok());
        assert!(GroupRequest::new("severity", 0).validate().is_err());
        assert!(GroupRequest::new("severity", MAX_GROUP_SIZE + 1).validate().is_err());
    }
}
