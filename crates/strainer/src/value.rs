//! Filter values and the value normalization pipeline.
//!
//! Raw request strings are decoded into [`FilterValue`]s, then normalized
//! against a filter's [`IgnoreList`] before a strategy sees them.

use serde::{Deserialize, Serialize};

/// A decoded, filter-ready value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Explicit null (only reachable through defaults or definitions).
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// List of values (delimited strings or array parameters).
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Decode a raw request string.
    ///
    /// A string containing `delimiter` becomes a list of strings, `"true"` and
    /// `"false"` become booleans, anything else stays a string.
    pub fn decode(raw: &str, delimiter: char) -> Self {
        if raw.is_empty() {
            return FilterValue::String(String::new());
        }
        if raw.contains(delimiter) {
            return FilterValue::List(
                raw.split(delimiter)
                    .map(|part| FilterValue::String(part.to_string()))
                    .collect(),
            );
        }
        match raw {
            "true" => FilterValue::Boolean(true),
            "false" => FilterValue::Boolean(false),
            _ => FilterValue::String(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FilterValue::List(_))
    }

    /// Text form for scalar values; `None` for null and lists.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FilterValue::Null | FilterValue::List(_) => None,
            FilterValue::Boolean(b) => Some(b.to_string()),
            FilterValue::Integer(i) => Some(i.to_string()),
            FilterValue::Float(f) => Some(f.to_string()),
            FilterValue::String(s) => Some(s.clone()),
        }
    }

    /// Flatten into scalar values, depth first.
    pub fn scalars(&self) -> Vec<FilterValue> {
        match self {
            FilterValue::List(items) => items.iter().flat_map(FilterValue::scalars).collect(),
            other => vec![other.clone()],
        }
    }

    /// Positional values: list items as-is, a scalar as a single element.
    pub fn items(&self) -> Vec<FilterValue> {
        match self {
            FilterValue::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FilterValue::Null => "null",
            FilterValue::Boolean(_) => "boolean",
            FilterValue::Integer(_) => "integer",
            FilterValue::Float(_) => "float",
            FilterValue::String(_) => "string",
            FilterValue::List(_) => "list",
        }
    }

    /// Whether a string value carries a `%` or `*` wildcard marker.
    pub fn has_wildcard(&self) -> bool {
        matches!(self, FilterValue::String(s) if s.contains('%') || s.contains('*'))
    }

    /// Type-coercing comparison used by loose ignore-lists.
    ///
    /// Numeric forms compare numerically, null equals the empty string and
    /// booleans compare by their `true`/`false` text. Lists never match.
    pub fn loosely_equals(&self, other: &FilterValue) -> bool {
        if self.is_list() || other.is_list() {
            return false;
        }
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        self.loose_text() == other.loose_text()
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            FilterValue::Integer(i) => Some(*i as f64),
            FilterValue::Float(f) => Some(*f),
            FilterValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    fn loose_text(&self) -> String {
        self.as_text().unwrap_or_default()
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterValue::Null => f.write_str("null"),
            FilterValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            scalar => f.write_str(&scalar.loose_text()),
        }
    }
}

/// Values a filter treats as "not supplied".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IgnoreList {
    values: Vec<FilterValue>,
    strict: bool,
}

impl IgnoreList {
    /// Add values, flattening nested lists.
    pub fn extend<I>(&mut self, values: I)
    where
        I: IntoIterator,
        I::Item: Into<FilterValue>,
    {
        for value in values {
            self.values.extend(value.into().scalars());
        }
    }

    /// Switch to exact (same variant, same value) matching.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[FilterValue] {
        &self.values
    }

    pub fn contains(&self, value: &FilterValue) -> bool {
        self.values.iter().any(|ignored| {
            if self.strict {
                ignored == value
            } else {
                ignored.loosely_equals(value)
            }
        })
    }

    /// Normalize a value for filtering.
    ///
    /// Ignored scalars become absent. Lists are normalized element-wise,
    /// dropping ignored elements; a list left empty is absent.
    pub fn normalize(&self, value: &FilterValue) -> Option<FilterValue> {
        match value {
            FilterValue::List(items) => {
                let kept: Vec<FilterValue> =
                    items.iter().filter_map(|item| self.normalize(item)).collect();
                (!kept.is_empty()).then_some(FilterValue::List(kept))
            }
            scalar if self.contains(scalar) => None,
            scalar => Some(scalar.clone()),
        }
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
