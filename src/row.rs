//! Generic rows and the argument map that shapes queries.
//!
//! A [`Row`] is an insertion-ordered column → value map. An [`ArgMap`] is the
//! same shape, except keys starting with the reserved prefix are directives
//! (`_limit`, `_orderby`, ...) rather than equality filters.

use crate::error::CrudError;
use serde_json::Value;
use std::collections::HashMap;

/// Column name → scalar value. Result rows may also hold embedded nested rows.
pub type Row = serde_json::Map<String, Value>;

pub const DEFAULT_ARG_PREFIX: &str = "_";

/// Reserved argument keys, without their prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Non-negative row cap.
    Limit,
    /// Column to order by.
    OrderBy,
    /// `true` for ascending, `false` for descending.
    Order,
    /// Restrict to the table itself, excluding inheriting tables.
    Only,
    /// Embed rows referenced by foreign key. Value ignored.
    Nested,
    /// Column whose generated value INSERT should hand back.
    Returning,
}

impl Directive {
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Limit => "limit",
            Directive::OrderBy => "orderby",
            Directive::Order => "order",
            Directive::Only => "only",
            Directive::Nested => "nested",
            Directive::Returning => "returning",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArgMap {
    prefix: String,
    entries: Row,
}

impl Default for ArgMap {
    fn default() -> Self {
        ArgMap::new()
    }
}

impl ArgMap {
    pub fn new() -> Self {
        ArgMap::with_prefix(DEFAULT_ARG_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        ArgMap {
            prefix: prefix.into(),
            entries: Row::new(),
        }
    }

    /// Query-string pairs arrive as text; they are kept as strings and the
    /// database coerces them to the column type.
    pub fn from_query(prefix: impl Into<String>, params: HashMap<String, String>) -> Self {
        let mut args = ArgMap::with_prefix(prefix);
        let mut params: Vec<_> = params.into_iter().collect();
        params.sort();
        for (k, v) in params {
            args.entries.insert(k, Value::String(v));
        }
        args
    }

    /// Treat every key of `row` as an argument (filters, and directives if prefixed).
    pub fn from_row(prefix: impl Into<String>, row: Row) -> Self {
        ArgMap {
            prefix: prefix.into(),
            entries: row,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn set(&mut self, directive: Directive, value: impl Into<Value>) -> &mut Self {
        let key = self.key_for(directive);
        self.entries.insert(key, value.into());
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with_directive(mut self, directive: Directive, value: impl Into<Value>) -> Self {
        self.set(directive, value);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key_for(&self, directive: Directive) -> String {
        format!("{}{}", self.prefix, directive.name())
    }

    pub fn is_reserved(&self, key: &str) -> bool {
        !self.prefix.is_empty() && key.starts_with(&self.prefix)
    }

    /// Equality filters in insertion order.
    pub fn filters(&self) -> impl Iterator<Item = (&String, &Value)> + '_ {
        self.entries.iter().filter(move |(k, _)| !self.is_reserved(k))
    }

    pub fn filter_count(&self) -> usize {
        self.filters().count()
    }

    pub fn has(&self, directive: Directive) -> bool {
        self.get(directive).is_some()
    }

    /// With an empty prefix nothing is reserved, so no directive is ever set.
    pub fn get(&self, directive: Directive) -> Option<&Value> {
        if self.prefix.is_empty() {
            return None;
        }
        self.entries.get(&self.key_for(directive))
    }

    /// Directive value in its text form; a JSON null counts as absent.
    pub fn text(&self, directive: Directive) -> Option<String> {
        self.get(directive).and_then(value_text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Text rendering of a value as the database would receive it. `None` for null.
pub fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

/// Request bodies may be a single object or an array of objects.
pub fn rows_from_json(body: Value) -> Result<Vec<Row>, CrudError> {
    match body {
        Value::Object(m) => Ok(vec![m]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(m) => Ok(m),
                other => Err(CrudError::MissingData(format!(
                    "expected a JSON object in array, got {}",
                    json_type_name(&other)
                ))),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(CrudError::MissingData(format!(
            "body must be a JSON object or array of objects, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
