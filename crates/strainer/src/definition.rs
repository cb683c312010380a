//! Declarative endpoint definitions.
//!
//! An endpoint's allow-lists can be written as JSON or YAML and turned into
//! a [`QueryResolver`]. Callback and custom strategies only exist in code.
//!
//! ```yaml
//! filters:
//!   - name                       # partial
//!   - name: status
//!     kind: exact
//!     ignore: ["", all]
//!     default: active
//!   - name: age
//!     kind: operator
//!     operator: greater_than_or_equal
//! sorts: [name, -created_at]
//! default_sorts: [-created_at]
//! includes:
//!   - posts
//!   - name: postsCount
//!     kind: count
//!     relation: posts
//! fields: [id, name, posts.title]
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::allowed::{
    AllowedFilter, AllowedInclude, AllowedSort, FilterOperator, FilterStrategy, ScopeLookup,
};
use crate::config::Config;
use crate::error::{QueryError, QueryResult};
use crate::resolver::QueryResolver;
use crate::scope::Boolean;
use crate::value::FilterValue;

/// Allow-lists for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointDefinition {
    /// Root entity the endpoint queries.
    pub entity: Option<String>,
    pub filters: Vec<Entry<FilterDefinition>>,
    pub sorts: Vec<Entry<SortDefinition>>,
    pub default_sorts: Vec<Entry<SortDefinition>>,
    pub includes: Vec<Entry<IncludeDefinition>>,
    pub fields: Vec<String>,
    /// Overrides the configured unknown-filter policy.
    pub ignore_unknown_filters: Option<bool>,
}

/// A bare name or a full definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry<T> {
    Name(String),
    Full(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Exact,
    #[default]
    Partial,
    BeginsWithStrict,
    EndsWithStrict,
    Operator,
    BelongsTo,
    Scope,
    Trashed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: FilterKind,
    #[serde(default)]
    pub internal_name: Option<String>,
    #[serde(default)]
    pub operator: Option<FilterOperator>,
    #[serde(default)]
    pub boolean: Option<Boolean>,
    /// `default: null` is a real default; an absent key is no default.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<FilterValue>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub ignore: Vec<FilterValue>,
    #[serde(default)]
    pub strict_ignore: bool,
    #[serde(default = "enabled")]
    pub relation_constraint: bool,
    #[serde(default)]
    pub lookups: Vec<ScopeLookup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortDefinition {
    /// A leading `-` makes the default direction descending.
    pub name: String,
    #[serde(default)]
    pub internal_name: Option<String>,
    /// `asc` or `desc`.
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeKind {
    #[default]
    Relationship,
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: IncludeKind,
    /// Relation to load or count; defaults to the name.
    #[serde(default)]
    pub relation: Option<String>,
}

fn enabled() -> bool {
    true
}

fn present<'de, D>(deserializer: D) -> Result<Option<FilterValue>, D::Error>
where
    D: Deserializer<'de>,
{
    FilterValue::deserialize(deserializer).map(Some)
}

impl EndpointDefinition {
    /// Parse a definition document (YAML is a superset of JSON).
    pub fn from_yaml(source: &str) -> QueryResult<Self> {
        serde_yml::from_str(source).map_err(|e| QueryError::InvalidDefinition(e.to_string()))
    }

    pub fn from_json(source: &str) -> QueryResult<Self> {
        serde_json::from_str(source).map_err(|e| QueryError::InvalidDefinition(e.to_string()))
    }

    /// Build a resolver using the default configuration.
    pub fn into_resolver(self) -> QueryResult<QueryResolver> {
        self.into_resolver_with(Config::default())
    }

    /// Build a resolver on top of `config`.
    pub fn into_resolver_with(self, config: Config) -> QueryResult<QueryResolver> {
        let config = match self.ignore_unknown_filters {
            Some(ignore) => config.with_ignore_unknown_filters(ignore),
            None => config,
        };

        let filters = self
            .filters
            .into_iter()
            .map(|entry| match entry {
                Entry::Name(name) => Ok(AllowedFilter::partial(&name)),
                Entry::Full(definition) => definition.build(),
            })
            .collect::<QueryResult<Vec<_>>>()?;
        let sorts = build_sorts(self.sorts)?;
        let default_sorts = build_sorts(self.default_sorts)?;
        let includes = self.includes.into_iter().map(|entry| match entry {
            Entry::Name(name) => AllowedInclude::relationship(&name),
            Entry::Full(definition) => definition.build(),
        });

        Ok(QueryResolver::new()
            .with_config(config)
            .allowed_filters(filters)
            .allowed_sorts(sorts)
            .default_sorts(default_sorts)
            .allowed_includes(includes)
            .allowed_fields(self.fields))
    }
}

impl FilterDefinition {
    pub fn build(self) -> QueryResult<AllowedFilter> {
        if self.operator.is_some() && self.kind != FilterKind::Operator {
            return Err(QueryError::InvalidDefinition(format!(
                "filter `{}`: `operator` is only valid for operator filters",
                self.name
            )));
        }
        if !self.lookups.is_empty() && self.kind != FilterKind::Scope {
            return Err(QueryError::InvalidDefinition(format!(
                "filter `{}`: `lookups` is only valid for scope filters",
                self.name
            )));
        }

        let name = self.name.as_str();
        let mut filter = match self.kind {
            FilterKind::Exact => AllowedFilter::exact(name),
            FilterKind::Partial => AllowedFilter::partial(name),
            FilterKind::BeginsWithStrict => AllowedFilter::begins_with_strict(name),
            FilterKind::EndsWithStrict => AllowedFilter::ends_with_strict(name),
            FilterKind::Operator => {
                let operator = self.operator.ok_or_else(|| {
                    QueryError::InvalidDefinition(format!(
                        "filter `{name}`: operator filters need an `operator`"
                    ))
                })?;
                AllowedFilter::operator(name, operator)
            }
            FilterKind::BelongsTo => AllowedFilter::belongs_to(name),
            FilterKind::Scope => AllowedFilter::new(
                name,
                FilterStrategy::Scope {
                    lookups: self.lookups,
                },
            ),
            FilterKind::Trashed => AllowedFilter::new(name, FilterStrategy::Trashed),
        };

        if let Some(internal_name) = &self.internal_name {
            filter = filter.internal_name(internal_name);
        }
        if let Some(boolean) = self.boolean {
            filter = filter.boolean(boolean);
        }
        if !self.relation_constraint {
            filter = filter.without_relation_constraint();
        }
        if let Some(default) = self.default {
            filter = filter.default(default);
        }
        if let Some(nullable) = self.nullable {
            filter = filter.nullable(nullable);
        }
        if !self.ignore.is_empty() {
            filter = filter.ignore(self.ignore);
        }
        if self.strict_ignore {
            filter = filter.strict_ignore();
        }
        Ok(filter)
    }
}

impl SortDefinition {
    pub fn build(self) -> QueryResult<AllowedSort> {
        let mut sort = AllowedSort::field(&self.name);
        if let Some(internal_name) = &self.internal_name {
            sort = sort.internal_name(internal_name);
        }
        if let Some(direction) = &self.direction {
            sort = sort.default_direction(direction)?;
        }
        Ok(sort)
    }
}

impl IncludeDefinition {
    pub fn build(self) -> AllowedInclude {
        let relation = self.relation.as_deref().unwrap_or(&self.name);
        match self.kind {
            IncludeKind::Relationship => AllowedInclude::relationship_as(&self.name, relation),
            IncludeKind::Count => AllowedInclude::count_as(&self.name, relation),
        }
    }
}

fn build_sorts(entries: Vec<Entry<SortDefinition>>) -> QueryResult<Vec<AllowedSort>> {
    entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Name(name) => Ok(AllowedSort::field(&name)),
            Entry::Full(definition) => definition.build(),
        })
        .collect()
}
