//! Request parameter source.
//!
//! Decodes the four parameter groups (filter, sort, include, fields) out of
//! a URL query string, or lets callers build them directly.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::value::FilterValue;

/// Requested fields, grouped by owning table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    /// Un-qualified fields, applied to the root entity.
    pub root: Vec<String>,
    /// Table-qualified fields, keyed by table (or relation) name.
    pub tables: BTreeMap<String, Vec<String>>,
}

impl FieldMap {
    pub fn is_empty(&self) -> bool {
        self.root.is_empty() && self.tables.is_empty()
    }

    /// Add a `column` or `table.column` entry.
    pub fn push(&mut self, entry: &str) {
        match entry.rsplit_once('.') {
            Some((table, column)) => self.push_to(table, column),
            None => self.root.push(entry.to_string()),
        }
    }

    /// Add a column to a named group, keeping only the part after the last `.`.
    pub fn push_to(&mut self, table: &str, column: &str) {
        let column = column.rsplit('.').next().unwrap_or(column);
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(column.to_string());
    }
}

/// Decoded request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    pub filters: BTreeMap<String, FilterValue>,
    pub sorts: Vec<String>,
    pub includes: Vec<String>,
    pub fields: FieldMap,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an `application/x-www-form-urlencoded` query string.
    ///
    /// Parameters outside the four configured groups are ignored.
    pub fn parse(query: &str, config: &Config) -> Self {
        let names = &config.parameters;
        let delimiters = &config.delimiters;
        let mut params = Self::default();

        for pair in query.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(raw_key);
            let value = decode_component(raw_value);
            let (base, segments) = split_key(&key);

            if base == names.filter {
                let Some(name) = segments.first().filter(|name| !name.is_empty()) else {
                    continue;
                };
                let decoded = FilterValue::decode(&value, delimiters.filter);
                if segments.get(1).is_some_and(|s| s.is_empty()) {
                    match params.filters.get_mut(*name) {
                        Some(FilterValue::List(items)) => items.push(decoded),
                        _ => {
                            params
                                .filters
                                .insert(name.to_string(), FilterValue::List(vec![decoded]));
                        }
                    }
                } else {
                    params.filters.insert(name.to_string(), decoded);
                }
            } else if base == names.sort {
                params.sorts.extend(split_list(&value, delimiters.sort));
            } else if base == names.include {
                params.includes.extend(split_list(&value, delimiters.include));
            } else if base == names.fields {
                match segments.first().filter(|table| !table.is_empty()) {
                    Some(table) => {
                        for column in split_list(&value, delimiters.fields) {
                            params.fields.push_to(table, &column);
                        }
                    }
                    None => {
                        for entry in split_list(&value, delimiters.fields) {
                            params.fields.push(&entry);
                        }
                    }
                }
            }
        }

        params
    }

    pub fn with_filter(mut self, name: &str, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(name.to_string(), value.into());
        self
    }

    /// Add a sort directive (`name` or `-name`).
    pub fn with_sort(mut self, sort: &str) -> Self {
        self.sorts.push(sort.to_string());
        self
    }

    pub fn with_include(mut self, include: &str) -> Self {
        self.includes.push(include.to_string());
        self
    }

    /// Add a `column` or `table.column` field.
    pub fn with_field(mut self, entry: &str) -> Self {
        self.fields.push(entry);
        self
    }

    /// Add `columns` to the `table` field group.
    pub fn with_fields<I, S>(mut self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            self.fields.push_to(table, column.as_ref());
        }
        self
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }
}

/// Percent-decode one component; `+` is a space. Invalid UTF-8 is kept raw.
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.replace('+', " "))
}

/// Split `filter[name][]` into `("filter", ["name", ""])`.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    let base = &key[..open];
    let segments = key[open..]
        .split('[')
        .skip(1)
        .map(|segment| segment.strip_suffix(']').unwrap_or(segment))
        .collect();
    (base, segments)
}

fn split_list(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
