//! Schema descriptors and the flattened mapping table
//!
//! The descriptor arrives from the type-system collaborator. It is dispatched
//! once, at collection construction, into a flat path -> descriptor table so
//! update validation and result shaping never reflect over the raw schema.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Storage type of a field in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Keyword,
    Text,
    Long,
    Double,
    Bool,
    Date,
    Object,
}

impl EngineType {
    pub fn wire_name(&self) -> &'static str {
        match self {
            EngineType::Keyword => "keyword",
            EngineType::Text => "text",
            EngineType::Long => "long",
            EngineType::Double => "double",
            EngineType::Bool => "boolean",
            EngineType::Date => "date",
            EngineType::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, EngineType::Long | EngineType::Double)
    }

    /// Types with a total order usable by MAX/MIN updates.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            EngineType::Long | EngineType::Double | EngineType::Date | EngineType::Keyword
        )
    }
}

/// One field as declared by the schema collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub engine_type: EngineType,
    #[serde(default = "default_true")]
    pub indexed: bool,
    #[serde(default)]
    pub stored: bool,
    #[serde(default)]
    pub multivalued: bool,
    /// Optional validation regex for string values
    #[serde(default)]
    pub pattern: Option<String>,
    /// Optional closed set of allowed string values
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

/// The full schema for one collection, keyed by dotted field path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub fields: BTreeMap<String, FieldSpec>,
}

/// Scalar vs. list shape of a field. The declared shape always wins over
/// whatever shape a payload happens to arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    List,
}

/// Flattened, pre-compiled view of one field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub path: String,
    pub kind: FieldKind,
    pub engine_type: EngineType,
    pub indexed: bool,
    pub stored: bool,
    pub pattern: Option<Regex>,
    pub allowed: Option<Vec<String>>,
}

impl FieldDescriptor {
    /// Check a single scalar value against the declared type and any
    /// pattern/enum constraint.
    pub fn validate_value(&self, value: &Value) -> Result<()> {
        if value.is_array() {
            return Err(Error::Validation(format!(
                "field '{}' is {}, got an array value",
                self.path,
                if self.kind == FieldKind::List { "a list; pass elements individually" } else { "scalar" }
            )));
        }
        if let Some(text) = value.as_str() {
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(text) {
                    return Err(Error::Validation(format!(
                        "value '{}' for field '{}' does not match pattern '{}'",
                        text, self.path, pattern
                    )));
                }
            }
            if let Some(allowed) = &self.allowed {
                if !allowed.iter().any(|a| a == text) {
                    return Err(Error::Validation(format!(
                        "value '{}' for field '{}' is not one of {:?}",
                        text, self.path, allowed
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Flat path -> descriptor table for one collection.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    fields: BTreeMap<String, FieldDescriptor>,
}

impl MappingTable {
    pub fn from_descriptor(descriptor: &SchemaDescriptor) -> Result<Self> {
        let mut fields = BTreeMap::new();
        for (path, spec) in &descriptor.fields {
            let pattern = match &spec.pattern {
                Some(raw) => Some(Regex::new(raw).map_err(|e| {
                    Error::Config(format!("bad validation pattern for field '{}': {}", path, e))
                })?),
                None => None,
            };
            fields.insert(
                path.clone(),
                FieldDescriptor {
                    path: path.clone(),
                    kind: if spec.multivalued { FieldKind::List } else { FieldKind::Scalar },
                    engine_type: spec.engine_type,
                    indexed: spec.indexed,
                    stored: spec.stored,
                    pattern,
                    allowed: spec.allowed.clone(),
                },
            );
        }
        Ok(Self { fields })
    }

    pub fn field(&self, path: &str) -> Option<&FieldDescriptor> {
        self.fields.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields returned by default in search results.
    pub fn stored_fields(&self) -> Vec<String> {
        self.fields
            .values()
            .filter(|f| f.stored)
            .map(|f| f.path.clone())
            .collect()
    }

    /// Render the wire mapping body, nesting dotted paths into object
    /// properties.
    pub fn wire_mappings(&self) -> Value {
        wire_properties(self.fields.values())
    }

    /// Descriptor fields absent from a live wire mapping. These are the
    /// fields the lifecycle manager must add incrementally.
    pub fn missing_from(&self, live_mappings: &Value) -> Vec<&FieldDescriptor> {
        let mut live_paths = Vec::new();
        flatten_live(&live_mappings["properties"], String::new(), &mut live_paths);
        self.fields
            .values()
            .filter(|f| !live_paths.iter().any(|p| p == &f.path))
            .collect()
    }
}

/// Wire mapping body for a set of fields, nesting dotted paths.
pub fn wire_properties<'a>(fields: impl IntoIterator<Item = &'a FieldDescriptor>) -> Value {
    let mut root = Map::new();
    for descriptor in fields {
        let leaf = json!({
            "type": descriptor.engine_type.wire_name(),
            "index": descriptor.indexed,
        });
        insert_nested(&mut root, &descriptor.path, leaf);
    }
    json!({ "properties": root })
}

fn insert_nested(root: &mut Map<String, Value>, path: &str, leaf: Value) {
    match path.split_once('.') {
        None => {
            root.insert(path.to_string(), leaf);
        }
        Some((head, rest)) => {
            let entry = root
                .entry(head.to_string())
                .or_insert_with(|| json!({"properties": {}}));
            if entry["properties"].as_object().is_none() {
                entry["properties"] = json!({});
            }
            if let Some(children) = entry["properties"].as_object_mut() {
                insert_nested(children, rest, leaf);
            }
        }
    }
}

fn flatten_live(properties: &Value, prefix: String, out: &mut Vec<String>) {
    let Some(object) = properties.as_object() else {
        return;
    };
    for (name, body) in object {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        if body["properties"].is_object() {
            flatten_live(&body["properties"], path, out);
        } else {
            out.push(path);
        }
    }
}

/// Flatten a live wire mapping into its leaf field paths.
pub fn live_field_paths(live_mappings: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    flatten_live(&live_mappings["properties"], String::new(), &mut paths);
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> SchemaDescriptor {
        serde_json::from_value(json!({
            "name": "hits",
            "fields": {
                "title": {"type": "text", "stored": true},
                "severity": {"type": "keyword", "allowed": ["low", "medium", "high"]},
                "tags": {"type": "keyword", "multivalued": true},
                "meta.score": {"type": "double"},
                "created": {"type": "date"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_flattening_and_kinds() {
        let table = MappingTable::from_descriptor(&descriptor()).unwrap();
        assert_eq!(table.field("tags").unwrap().kind, FieldKind::List);
        assert_eq!(table.field("severity").unwrap().kind, FieldKind::Scalar);
        assert!(table.field("meta.score").is_some());
        assert!(table.field("unknown").is_none());
        assert_eq!(table.stored_fields(), vec!["title".to_string()]);
    }

    #[test]
    fn test_wire_mappings_nest_dotted_paths() {
        let table = MappingTable::from_descriptor(&descriptor()).unwrap();
        let wire = table.wire_mappings();
        assert_eq!(wire["properties"]["meta"]["properties"]["score"]["type"], "double");
        assert_eq!(wire["properties"]["created"]["type"], "date");
    }

    #[test]
    fn test_missing_from_live_mapping() {
        let table = MappingTable::from_descriptor(&descriptor()).unwrap();
        let live = json!({
            "properties": {
                "title": {"type": "text"},
                "meta": {"properties": {"score": {"type": "double"}}}
            }
        });
        let missing: Vec<&str> = table.missing_from(&live).iter().map(|f| f.path.as_str()).collect();
        assert_eq!(missing, vec!["created", "severity", "tags"]);
    }

    #[test]
    fn test_enum_validation() {
        let table = MappingTable::from_descriptor(&descriptor()).unwrap();
        let field = table.field("severity").unwrap();
        assert!(field.validate_value(&json!("high")).is_ok());
        assert!(field.validate_value(&json!("urgent")).is_err());
    }

    #[test]
    fn test_declared_shape_wins_over_payload_shape() {
        let table = MappingTable::from_descriptor(&descriptor()).unwrap();
        // severity is declared scalar; an array payload is rejected outright
        let error = table
            .field("severity")
            .unwrap()
            .validate_value(&json!(["high"]))
            .unwrap_err();
        assert!(error.to_string().contains("scalar"));
    }
}
