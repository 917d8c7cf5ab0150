//! Documents and optimistic-concurrency version tokens

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A document stored in a collection: a string key plus named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Look up a field by (possibly dotted) path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

/// Opaque optimistic-concurrency handle.
///
/// `Create` is the sentinel for "the document does not exist yet"; saving
/// with it demands a create-only write. `Exists` pins a write to the exact
/// state the document was read at. A token is single-use: every successful
/// write issues a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionToken {
    Create,
    Exists { seq_no: u64, primary_term: u64 },
}

const CREATE_SENTINEL: &str = "create";

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionToken::Create => write!(f, "{}", CREATE_SENTINEL),
            VersionToken::Exists { seq_no, primary_term } => {
                write!(f, "{}:{}", seq_no, primary_term)
            }
        }
    }
}

impl FromStr for VersionToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == CREATE_SENTINEL {
            return Ok(VersionToken::Create);
        }
        let (seq, term) = s
            .split_once(':')
            .ok_or_else(|| Error::Validation(format!("malformed version token '{}'", s)))?;
        let seq_no = seq
            .parse()
            .map_err(|_| Error::Validation(format!("malformed version token '{}'", s)))?;
        let primary_term = term
            .parse()
            .map_err(|_| Error::Validation(format!("malformed version token '{}'", s)))?;
        Ok(VersionToken::Exists { seq_no, primary_term })
    }
}

impl VersionToken {
    /// Extract the token issued by a write or read response.
    pub(crate) fn from_response(body: &Value) -> Result<Self> {
        let seq_no = body["_seq_no"].as_u64();
        let primary_term = body["_primary_term"].as_u64();
        match (seq_no, primary_term) {
            (Some(seq_no), Some(primary_term)) => Ok(VersionToken::Exists { seq_no, primary_term }),
            _ => Err(Error::Cluster {
                status: 200,
                reason: "response missing sequence/term pair".to_string(),
            }),
        }
    }
}

/// Document keys are used in URL paths and cursor bookkeeping; whitespace is
/// never allowed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("document key must not be empty".to_string()));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!(
            "document key '{}' must not contain whitespace",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_round_trip() {
        let token = VersionToken::Exists { seq_no: 42, primary_term: 3 };
        assert_eq!(token.to_string(), "42:3");
        assert_eq!("42:3".parse::<VersionToken>().unwrap(), token);
        assert_eq!("create".parse::<VersionToken>().unwrap(), VersionToken::Create);
    }

    #[test]
    fn test_token_rejects_garbage() {
        assert!("".parse::<VersionToken>().is_err());
        assert!("42".parse::<VersionToken>().is_err());
        assert!("a:b".parse::<VersionToken>().is_err());
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_key("hit-42").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("hit 42").is_err());
        assert!(validate_key("hit\t42").is_err());
    }

    #[test]
    fn test_nested_field_lookup() {
        let mut fields = Map::new();
        fields.insert("meta".to_string(), json!({"severity": "high"}));
        let doc = Document::new("h1", fields);
        assert_eq!(doc.get("meta.severity"), Some(&json!("high")));
        assert_eq!(doc.get("meta.missing"), None);
    }
}
