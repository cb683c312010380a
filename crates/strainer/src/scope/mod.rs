//! The relational query interface the resolver drives.
//!
//! [`QueryScope`] is what filters, sorts, includes and field selections
//! mutate. It accumulates predicates, ordering, eager loads and column
//! selection for one entity, and opens nested existence scopes for related
//! entities. [`sql::SqlScope`] is the sea-query backed implementation.

pub mod sql;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QueryResult;
use crate::value::FilterValue;

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Comparison applied by a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// SQL `LIKE`; the value is used as the pattern verbatim.
    Like,
    /// `LIKE` against the lowercased column with a lowercased pattern.
    LikeCaseInsensitive,
}

/// How a clause combines with the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boolean {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse one of the two canonical tokens, `asc` or `desc`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn is_descending(self) -> bool {
        self == Self::Desc
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soft-delete visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedMode {
    /// Include soft-deleted rows.
    With,
    /// Only soft-deleted rows.
    Only,
    /// Exclude soft-deleted rows (the default).
    #[default]
    Without,
}

impl TrashedMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "with" => Some(Self::With),
            "only" => Some(Self::Only),
            "without" => Some(Self::Without),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// To-one; the foreign key lives on the owning entity.
    BelongsTo,
    /// To-one; the foreign key lives on the related entity.
    HasOne,
    /// To-many; the foreign key lives on the related entity.
    HasMany,
}

impl RelationKind {
    pub fn is_to_one(self) -> bool {
        matches!(self, Self::BelongsTo | Self::HasOne)
    }
}

/// Introspected facts about a relation accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    pub kind: RelationKind,
    pub target_table: String,
    /// For `BelongsTo`, the column on the owning entity; otherwise the
    /// column on the related entity.
    pub foreign_key: String,
}

// ---------------------------------------------------------------------------
// The query interface
// ---------------------------------------------------------------------------

/// Callback that builds the contents of a nested scope.
pub type ScopeBuilder<'a> = dyn FnMut(&mut dyn QueryScope) -> QueryResult<()> + 'a;

/// A mutable query over one entity.
pub trait QueryScope {
    /// Table name (or alias) this scope's columns are qualified with.
    fn table(&self) -> &str;

    /// Relation accessor `name` on this scope's entity, if any.
    fn relation(&self, name: &str) -> Option<RelationInfo>;

    fn has_relation(&self, name: &str) -> bool {
        self.relation(name).is_some()
    }

    /// Qualify a bare column with this scope's table (or alias).
    ///
    /// Already-dotted names are returned untouched.
    fn qualify_column(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.table(), column)
        }
    }

    fn where_compare(
        &mut self,
        boolean: Boolean,
        column: &str,
        comparison: Comparison,
        value: &FilterValue,
    ) -> QueryResult<()>;

    /// `column IN (values)`, or `NOT IN` when `negated`.
    fn where_in(
        &mut self,
        boolean: Boolean,
        column: &str,
        values: &[FilterValue],
        negated: bool,
    ) -> QueryResult<()>;

    /// Parenthesized group of clauses built by `build`.
    fn where_group(&mut self, boolean: Boolean, build: &mut ScopeBuilder<'_>) -> QueryResult<()>;

    /// Existence scope: at least one related row through `relation` matches
    /// the clauses built by `build`. The `EXISTS` clause joins the earlier
    /// clauses with `boolean`.
    fn where_has(
        &mut self,
        boolean: Boolean,
        relation: &str,
        build: &mut ScopeBuilder<'_>,
    ) -> QueryResult<()>;

    /// Invoke a named scope registered on this scope's entity.
    fn call_scope(&mut self, name: &str, args: &[ScopeArg]) -> QueryResult<()>;

    fn with_trashed(&mut self, mode: TrashedMode) -> QueryResult<()>;

    fn order_by(&mut self, column: &str, direction: SortDirection) -> QueryResult<()>;

    /// Eager-load a relation path, optionally restricted to `columns`.
    fn eager_load(&mut self, relation: &str, columns: Option<Vec<String>>) -> QueryResult<()>;

    /// Materialize the number of related rows as `<relation>_count`.
    fn with_count(&mut self, relation: &str) -> QueryResult<()>;

    fn select_columns(&mut self, columns: Vec<String>) -> QueryResult<()>;
}

// ---------------------------------------------------------------------------
// Named scopes and lookups
// ---------------------------------------------------------------------------

/// Positional argument passed to a named scope.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeArg {
    Value(FilterValue),
    /// A related entity resolved by primary key before invocation.
    Entity {
        entity: String,
        key: FilterValue,
        record: serde_json::Value,
    },
}

impl ScopeArg {
    /// The raw value, or the lookup key for resolved entities.
    pub fn value(&self) -> &FilterValue {
        match self {
            ScopeArg::Value(value) => value,
            ScopeArg::Entity { key, .. } => key,
        }
    }

    pub fn record(&self) -> Option<&serde_json::Value> {
        match self {
            ScopeArg::Value(_) => None,
            ScopeArg::Entity { record, .. } => Some(record),
        }
    }
}

/// A named business-rule predicate registered on an entity.
pub trait ScopeHandler: Send + Sync {
    fn apply(&self, scope: &mut dyn QueryScope, args: &[ScopeArg]) -> QueryResult<()>;
}

impl<F> ScopeHandler for F
where
    F: Fn(&mut dyn QueryScope, &[ScopeArg]) -> QueryResult<()> + Send + Sync,
{
    fn apply(&self, scope: &mut dyn QueryScope, args: &[ScopeArg]) -> QueryResult<()> {
        self(scope, args)
    }
}

/// Finds an entity record by primary key.
pub trait EntityLookup: Send + Sync {
    fn find(&self, entity: &str, key: &FilterValue) -> QueryResult<Option<serde_json::Value>>;
}

impl<F> EntityLookup for F
where
    F: Fn(&str, &FilterValue) -> QueryResult<Option<serde_json::Value>> + Send + Sync,
{
    fn find(&self, entity: &str, key: &FilterValue) -> QueryResult<Option<serde_json::Value>> {
        self(entity, key)
    }
}

/// Lookup over records held in memory, keyed by entity name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InMemoryLookup {
    #[serde(flatten)]
    records: HashMap<String, EntityRecords>,
}

#[derive(Debug, Clone, Deserialize)]
struct EntityRecords {
    #[serde(default = "default_primary_key")]
    primary_key: String,
    rows: Vec<serde_json::Value>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        mut self,
        entity: &str,
        primary_key: &str,
        rows: Vec<serde_json::Value>,
    ) -> Self {
        self.records.insert(
            entity.to_string(),
            EntityRecords {
                primary_key: primary_key.to_string(),
                rows,
            },
        );
        self
    }
}

impl EntityLookup for InMemoryLookup {
    fn find(&self, entity: &str, key: &FilterValue) -> QueryResult<Option<serde_json::Value>> {
        let Some(records) = self.records.get(entity) else {
            return Ok(None);
        };
        let found = records.rows.iter().find(|row| {
            row.get(&records.primary_key)
                .and_then(|id| serde_json::from_value::<FilterValue>(id.clone()).ok())
                .is_some_and(|id| id.loosely_equals(key))
        });
        Ok(found.cloned())
    }
}
