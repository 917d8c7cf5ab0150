//! Scripted-update AST and renderer
//!
//! Update operations are compiled into one server-side script so the
//! mutation is applied atomically, never read-modify-write from the client.
//! The renderer is pure and unit-tested without a cluster; values travel in
//! the params map, never spliced into source text.

use serde_json::{json, Map, Value};
use std::fmt::Write;

/// One typed update operation: verb, field path, value.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub verb: UpdateVerb,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateVerb {
    Set,
    Inc,
    Dec,
    Append,
    AppendIfMissing,
    Remove,
    Delete,
    Max,
    Min,
}

impl UpdateOp {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Set, field: field.into(), value }
    }

    pub fn inc(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Inc, field: field.into(), value }
    }

    pub fn dec(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Dec, field: field.into(), value }
    }

    pub fn append(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Append, field: field.into(), value }
    }

    pub fn append_if_missing(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::AppendIfMissing, field: field.into(), value }
    }

    pub fn remove(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Remove, field: field.into(), value }
    }

    /// Delete a field. A null value removes the whole key; a non-null value
    /// removes that single element from a list field.
    pub fn delete(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Delete, field: field.into(), value }
    }

    pub fn max(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Max, field: field.into(), value }
    }

    pub fn min(field: impl Into<String>, value: Value) -> Self {
        Self { verb: UpdateVerb::Min, field: field.into(), value }
    }
}

/// A rendered server-side script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub lang: String,
    pub source: String,
    pub params: Map<String, Value>,
}

impl Script {
    pub fn to_wire(&self) -> Value {
        json!({
            "lang": self.lang,
            "source": self.source,
            "params": self.params,
        })
    }
}

/// Bracketed source accessor for a dotted field path.
fn source_expr(field: &str) -> String {
    let mut expr = String::from("ctx._source");
    for part in field.split('.') {
        write!(expr, "['{}']", part).unwrap();
    }
    expr
}

/// Accessor for the container holding the last path segment, plus that
/// segment. Used by DELETE, which removes a map key.
fn parent_expr(field: &str) -> (String, String) {
    match field.rsplit_once('.') {
        Some((parent, leaf)) => (source_expr(parent), leaf.to_string()),
        None => ("ctx._source".to_string(), field.to_string()),
    }
}

/// Comparison expression honoring the value's type: numbers order with `<`,
/// everything else with `compareTo`.
fn ordering_expr(target: &str, param: &str, invert: bool) -> String {
    let operator = if invert { ">" } else { "<" };
    let compare = if invert { "> 0" } else { "< 0" };
    // Numeric comparison is resolved at render time by the caller passing a
    // numeric param; painless handles both through these shapes.
    format!(
        "({target} instanceof Number ? {target} {operator} params.{param} : {target}.compareTo(params.{param}) {compare})",
        target = target,
        operator = operator,
        param = param,
        compare = compare,
    )
}

/// Compile a list of operations into one script. Statement order follows the
/// input order; the whole script applies as a single indivisible mutation.
pub fn render(ops: &[UpdateOp]) -> Script {
    let mut source = String::new();
    let mut params = Map::new();

    for (index, op) in ops.iter().enumerate() {
        let param = format!("p{}", index);
        let target = source_expr(&op.field);

        match op.verb {
            UpdateVerb::Set => {
                write!(source, "{} = params.{}; ", target, param).unwrap();
            }
            UpdateVerb::Inc => {
                write!(
                    source,
                    "if ({t} == null) {{ {t} = params.{p}; }} else {{ {t} += params.{p}; }} ",
                    t = target,
                    p = param
                )
                .unwrap();
            }
            UpdateVerb::Dec => {
                write!(
                    source,
                    "if ({t} == null) {{ {t} = 0 - params.{p}; }} else {{ {t} -= params.{p}; }} ",
                    t = target,
                    p = param
                )
                .unwrap();
            }
            UpdateVerb::Append => {
                write!(
                    source,
                    "if ({t} == null) {{ {t} = []; }} {t}.add(params.{p}); ",
                    t = target,
                    p = param
                )
                .unwrap();
            }
            UpdateVerb::AppendIfMissing => {
                write!(
                    source,
                    "if ({t} == null) {{ {t} = []; }} if (!{t}.contains(params.{p})) {{ {t}.add(params.{p}); }} ",
                    t = target,
                    p = param
                )
                .unwrap();
            }
            UpdateVerb::Remove => {
                write!(
                    source,
                    "if ({t} != null) {{ int idx{i} = {t}.indexOf(params.{p}); if (idx{i} >= 0) {{ {t}.remove(idx{i}); }} }} ",
                    t = target,
                    p = param,
                    i = index
                )
                .unwrap();
            }
            UpdateVerb::Delete => {
                if op.value.is_null() {
                    let (parent, leaf) = parent_expr(&op.field);
                    write!(source, "{}.remove('{}'); ", parent, leaf).unwrap();
                } else {
                    write!(
                        source,
                        "if ({t} != null) {{ int idx{i} = {t}.indexOf(params.{p}); if (idx{i} >= 0) {{ {t}.remove(idx{i}); }} }} ",
                        t = target,
                        p = param,
                        i = index
                    )
                    .unwrap();
                }
            }
            UpdateVerb::Max => {
                let compare = ordering_expr(&target, &param, false);
                write!(
                    source,
                    "if ({t} == null || {c}) {{ {t} = params.{p}; }} ",
                    t = target,
                    c = compare,
                    p = param
                )
                .unwrap();
            }
            UpdateVerb::Min => {
                let compare = ordering_expr(&target, &param, true);
                write!(
                    source,
                    "if ({t} == null || {c}) {{ {t} = params.{p}; }} ",
                    t = target,
                    c = compare,
                    p = param
                )
                .unwrap();
            }
        }

        if op.verb != UpdateVerb::Delete || !op.value.is_null() {
            params.insert(param, op.value.clone());
        }
    }

    Script {
        lang: "painless".to_string(),
        source: source.trim_end().to_string(),
        params,
    }
}
