//! Allow-listed filters and their strategies.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::relation::{self, PropertyPath, ResolutionContext};
use crate::scope::{Boolean, Comparison, QueryScope, ScopeArg, TrashedMode};
use crate::value::{FilterValue, IgnoreList, escape_like_wildcards};

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Comparison used by operator filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Chosen per value: `LIKE` when the value carries `%` or `*`, else `=`.
    Dynamic,
    #[default]
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl FilterOperator {
    pub fn is_dynamic(self) -> bool {
        self == Self::Dynamic
    }

    /// Comparison and operand for one scalar value.
    ///
    /// The dynamic operator turns `*` into the SQL `%` wildcard.
    pub fn resolve(self, value: &FilterValue) -> (Comparison, FilterValue) {
        let comparison = match self {
            Self::Dynamic => {
                return match value {
                    FilterValue::String(s) if value.has_wildcard() => {
                        (Comparison::Like, FilterValue::String(s.replace('*', "%")))
                    }
                    _ => (Comparison::Equal, value.clone()),
                };
            }
            Self::Equal => Comparison::Equal,
            Self::NotEqual => Comparison::NotEqual,
            Self::LessThan => Comparison::LessThan,
            Self::LessThanOrEqual => Comparison::LessThanOrEqual,
            Self::GreaterThan => Comparison::GreaterThan,
            Self::GreaterThanOrEqual => Comparison::GreaterThanOrEqual,
        };
        (comparison, value.clone())
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Caller-supplied filter logic.
pub trait FilterHandler: Send + Sync {
    fn apply(&self, scope: &mut dyn QueryScope, value: &FilterValue, property: &str)
    -> QueryResult<()>;
}

impl<F> FilterHandler for F
where
    F: Fn(&mut dyn QueryScope, &FilterValue, &str) -> QueryResult<()> + Send + Sync,
{
    fn apply(
        &self,
        scope: &mut dyn QueryScope,
        value: &FilterValue,
        property: &str,
    ) -> QueryResult<()> {
        self(scope, value, property)
    }
}

/// Scope argument at `position` is the primary key of `entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeLookup {
    pub position: usize,
    pub entity: String,
}

#[derive(Clone)]
pub enum FilterStrategy {
    Exact,
    Partial,
    BeginsWithStrict,
    EndsWithStrict,
    Operator {
        operator: FilterOperator,
        boolean: Boolean,
    },
    BelongsTo,
    Scope {
        lookups: Vec<ScopeLookup>,
    },
    Trashed,
    Callback(Arc<dyn FilterHandler>),
}

impl fmt::Debug for FilterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("Exact"),
            Self::Partial => f.write_str("Partial"),
            Self::BeginsWithStrict => f.write_str("BeginsWithStrict"),
            Self::EndsWithStrict => f.write_str("EndsWithStrict"),
            Self::Operator { operator, boolean } => f
                .debug_struct("Operator")
                .field("operator", operator)
                .field("boolean", boolean)
                .finish(),
            Self::BelongsTo => f.write_str("BelongsTo"),
            Self::Scope { lookups } => f.debug_struct("Scope").field("lookups", lookups).finish(),
            Self::Trashed => f.write_str("Trashed"),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

// ---------------------------------------------------------------------------
// AllowedFilter
// ---------------------------------------------------------------------------

/// One allow-listed filter.
#[derive(Debug, Clone)]
pub struct AllowedFilter {
    name: String,
    internal_name: String,
    strategy: FilterStrategy,
    relation_constraint: bool,
    default: Option<FilterValue>,
    nullable: bool,
    ignored: IgnoreList,
}

impl AllowedFilter {
    pub fn new(name: &str, strategy: FilterStrategy) -> Self {
        Self {
            name: name.to_string(),
            internal_name: name.to_string(),
            strategy,
            relation_constraint: true,
            default: None,
            nullable: false,
            ignored: IgnoreList::default(),
        }
    }

    /// Equality, or `IN` for lists.
    pub fn exact(name: &str) -> Self {
        Self::new(name, FilterStrategy::Exact)
    }

    /// Case-insensitive substring match; lists match any element.
    pub fn partial(name: &str) -> Self {
        Self::new(name, FilterStrategy::Partial)
    }

    pub fn begins_with_strict(name: &str) -> Self {
        Self::new(name, FilterStrategy::BeginsWithStrict)
    }

    pub fn ends_with_strict(name: &str) -> Self {
        Self::new(name, FilterStrategy::EndsWithStrict)
    }

    pub fn operator(name: &str, operator: FilterOperator) -> Self {
        Self::new(
            name,
            FilterStrategy::Operator {
                operator,
                boolean: Boolean::And,
            },
        )
    }

    /// Filter on a to-one relation by related key.
    pub fn belongs_to(name: &str) -> Self {
        Self::new(name, FilterStrategy::BelongsTo)
    }

    /// Call the named scope `name` with the value as positional arguments.
    pub fn scope(name: &str) -> Self {
        Self::new(
            name,
            FilterStrategy::Scope {
                lookups: Vec::new(),
            },
        )
    }

    /// Soft-delete visibility switch named `trashed`.
    pub fn trashed() -> Self {
        Self::new("trashed", FilterStrategy::Trashed)
    }

    pub fn callback<H>(name: &str, handler: H) -> Self
    where
        H: FilterHandler + 'static,
    {
        Self::new(name, FilterStrategy::Callback(Arc::new(handler)))
    }

    pub fn internal_name(mut self, internal_name: &str) -> Self {
        self.internal_name = internal_name.to_string();
        self
    }

    /// Treat dotted names as literal columns instead of relation paths.
    pub fn without_relation_constraint(mut self) -> Self {
        self.relation_constraint = false;
        self
    }

    /// Value used when the request supplies nothing (or only ignored
    /// values). A null default makes the filter nullable.
    pub fn default(mut self, value: impl Into<FilterValue>) -> Self {
        let value = value.into();
        if value.is_null() {
            self.nullable = true;
        }
        self.default = Some(value);
        self
    }

    pub fn unset_default(mut self) -> Self {
        self.default = None;
        self
    }

    /// Accept null as a real filter value.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Values treated as "not supplied". Repeated calls merge.
    pub fn ignore<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FilterValue>,
    {
        self.ignored.extend(values);
        self
    }

    /// Match ignored values by exact type and value.
    pub fn strict_ignore(mut self) -> Self {
        self.ignored.set_strict(true);
        self
    }

    /// Combinator for operator filters.
    pub fn boolean(mut self, boolean: Boolean) -> Self {
        if let FilterStrategy::Operator { boolean: current, .. } = &mut self.strategy {
            *current = boolean;
        }
        self
    }

    /// Resolve scope argument `position` to an `entity` record by key.
    pub fn lookup(mut self, position: usize, entity: &str) -> Self {
        if let FilterStrategy::Scope { lookups } = &mut self.strategy {
            lookups.push(ScopeLookup {
                position,
                entity: entity.to_string(),
            });
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self) -> &str {
        &self.internal_name
    }

    pub fn strategy(&self) -> &FilterStrategy {
        &self.strategy
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Option<&FilterValue> {
        self.default.as_ref()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn ignored(&self) -> &IgnoreList {
        &self.ignored
    }

    pub fn is_for_filter(&self, name: &str) -> bool {
        self.name == name
    }

    /// The value to filter with, given the raw request value.
    ///
    /// Ignored values count as absent; absent falls back to the default.
    /// Null is only kept for nullable filters.
    pub fn resolve_value(&self, raw: Option<&FilterValue>) -> Option<FilterValue> {
        let value = raw
            .and_then(|value| self.ignored.normalize(value))
            .or_else(|| self.default.clone())?;
        if value.is_null() && !self.nullable {
            return None;
        }
        Some(value)
    }

    /// Apply with an already resolved value.
    ///
    /// Columns visited by an earlier filter sharing `ctx` are resolved again.
    pub fn apply(
        &self,
        scope: &mut dyn QueryScope,
        ctx: &mut ResolutionContext,
        value: &FilterValue,
    ) -> QueryResult<()> {
        debug!(
            filter = %self.name,
            property = %self.internal_name,
            value = %value,
            "applying filter"
        );
        ctx.clear_visited();
        self.apply_to_property(scope, ctx, &self.internal_name, value)
    }

    fn apply_to_property(
        &self,
        scope: &mut dyn QueryScope,
        ctx: &mut ResolutionContext,
        property: &str,
        value: &FilterValue,
    ) -> QueryResult<()> {
        if self.follows_relations()
            && let PropertyPath::Related { relations, leaf } =
                relation::resolve(scope, ctx, property)
        {
            return relation::constrain(
                scope,
                ctx,
                self.combinator(),
                &relations,
                leaf,
                self.qualifies_leaf(),
                &mut |nested: &mut dyn QueryScope, ctx: &mut ResolutionContext, column: &str| {
                    self.apply_to_property(nested, ctx, column, value)
                },
            );
        }
        self.apply_strategy(scope, ctx, property, value)
    }

    /// How the outermost clause joins the clauses before it.
    fn combinator(&self) -> Boolean {
        match self.strategy {
            FilterStrategy::Operator { boolean, .. } => boolean,
            _ => Boolean::And,
        }
    }

    fn follows_relations(&self) -> bool {
        match self.strategy {
            FilterStrategy::BelongsTo => true,
            FilterStrategy::Trashed | FilterStrategy::Callback(_) => false,
            _ => self.relation_constraint,
        }
    }

    /// Scopes and belongs-to relations are names, not columns.
    fn qualifies_leaf(&self) -> bool {
        !matches!(
            self.strategy,
            FilterStrategy::Scope { .. } | FilterStrategy::BelongsTo
        )
    }

    fn apply_strategy(
        &self,
        scope: &mut dyn QueryScope,
        ctx: &mut ResolutionContext,
        property: &str,
        value: &FilterValue,
    ) -> QueryResult<()> {
        match &self.strategy {
            FilterStrategy::Exact => {
                let column = scope.qualify_column(property);
                match value {
                    FilterValue::List(_) => {
                        scope.where_in(Boolean::And, &column, &value.scalars(), false)
                    }
                    _ => scope.where_compare(Boolean::And, &column, Comparison::Equal, value),
                }
            }
            FilterStrategy::Partial => {
                like_any(scope, property, value, Comparison::LikeCaseInsensitive, |v| {
                    format!("%{v}%")
                })
            }
            FilterStrategy::BeginsWithStrict => {
                like_any(scope, property, value, Comparison::Like, |v| format!("{v}%"))
            }
            FilterStrategy::EndsWithStrict => {
                like_any(scope, property, value, Comparison::Like, |v| format!("%{v}"))
            }
            FilterStrategy::Operator { operator, boolean } => {
                apply_operator(scope, property, value, *operator, *boolean)
            }
            FilterStrategy::BelongsTo => apply_belongs_to(scope, property, value),
            FilterStrategy::Scope { lookups } => {
                let args = scope_args(ctx, lookups, value)?;
                scope.call_scope(property, &args)
            }
            FilterStrategy::Trashed => {
                match value.as_text().as_deref().and_then(TrashedMode::parse) {
                    Some(mode) => scope.with_trashed(mode),
                    None => {
                        debug!(filter = %self.name, value = %value, "unrecognised trashed value");
                        Ok(())
                    }
                }
            }
            FilterStrategy::Callback(handler) => handler.apply(scope, value, property),
        }
    }
}

impl From<&str> for AllowedFilter {
    fn from(name: &str) -> Self {
        Self::partial(name)
    }
}

impl From<String> for AllowedFilter {
    fn from(name: String) -> Self {
        Self::partial(&name)
    }
}

/// `LIKE` against an escaped pattern; lists match any element.
fn like_any<P>(
    scope: &mut dyn QueryScope,
    property: &str,
    value: &FilterValue,
    comparison: Comparison,
    pattern: P,
) -> QueryResult<()>
where
    P: Fn(&str) -> String,
{
    let column = scope.qualify_column(property);
    let patterns: Vec<FilterValue> = value
        .scalars()
        .iter()
        .map(|v| FilterValue::String(pattern(&escape_like_wildcards(&v.to_string()))))
        .collect();

    match (value, patterns.as_slice()) {
        (FilterValue::List(_), _) => {
            scope.where_group(Boolean::And, &mut |group: &mut dyn QueryScope| -> QueryResult<()> {
                for p in &patterns {
                    group.where_compare(Boolean::Or, &column, comparison, p)?;
                }
                Ok(())
            })
        }
        (_, [single]) => scope.where_compare(Boolean::And, &column, comparison, single),
        _ => Ok(()),
    }
}

fn apply_operator(
    scope: &mut dyn QueryScope,
    property: &str,
    value: &FilterValue,
    operator: FilterOperator,
    boolean: Boolean,
) -> QueryResult<()> {
    let column = scope.qualify_column(property);
    let FilterValue::List(_) = value else {
        let (comparison, operand) = operator.resolve(value);
        return scope.where_compare(boolean, &column, comparison, &operand);
    };

    let values = value.scalars();
    match operator {
        FilterOperator::Equal => scope.where_in(boolean, &column, &values, false),
        FilterOperator::NotEqual => scope.where_in(boolean, &column, &values, true),
        _ => scope.where_group(boolean, &mut |group: &mut dyn QueryScope| -> QueryResult<()> {
            for v in &values {
                let (comparison, operand) = operator.resolve(v);
                group.where_compare(Boolean::Or, &column, comparison, &operand)?;
            }
            Ok(())
        }),
    }
}

/// Constrain the foreign key of a to-one relation, or a plain column when
/// `property` is not one.
fn apply_belongs_to(
    scope: &mut dyn QueryScope,
    property: &str,
    value: &FilterValue,
) -> QueryResult<()> {
    let column = match scope.relation(property) {
        Some(info) if info.kind == crate::scope::RelationKind::BelongsTo => {
            scope.qualify_column(&info.foreign_key)
        }
        _ => scope.qualify_column(property),
    };
    match value {
        FilterValue::List(_) => scope.where_in(Boolean::And, &column, &value.scalars(), false),
        _ => scope.where_compare(Boolean::And, &column, Comparison::Equal, value),
    }
}

/// Positional scope arguments, with configured positions looked up by key.
fn scope_args(
    ctx: &ResolutionContext,
    lookups: &[ScopeLookup],
    value: &FilterValue,
) -> QueryResult<Vec<ScopeArg>> {
    value
        .items()
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            let Some(lookup) = lookups.iter().find(|l| l.position == position) else {
                return Ok(ScopeArg::Value(item));
            };
            let finder = ctx.lookup().ok_or_else(|| QueryError::LookupUnavailable {
                entity: lookup.entity.clone(),
            })?;
            match finder.find(&lookup.entity, &item)? {
                Some(record) => Ok(ScopeArg::Entity {
                    entity: lookup.entity.clone(),
                    key: item,
                    record,
                }),
                None => Err(QueryError::InvalidFilterValue {
                    value: item.to_string(),
                    value_type: item.type_name().to_string(),
                }),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Allow-list of filters. Lookup is by exact name; the first registration
/// of a name wins.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    filters: Vec<AllowedFilter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, filter: impl Into<AllowedFilter>) {
        self.filters.push(filter.into());
    }

    pub fn get(&self, name: &str) -> Option<&AllowedFilter> {
        self.filters.iter().find(|f| f.is_for_filter(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllowedFilter> {
        self.filters.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply filter `name` with a raw request value (`None` when absent).
    ///
    /// Returns whether a constraint was applied.
    pub fn apply(
        &self,
        name: &str,
        scope: &mut dyn QueryScope,
        ctx: &mut ResolutionContext,
        raw: Option<&FilterValue>,
    ) -> QueryResult<bool> {
        let Some(filter) = self.get(name) else {
            return Ok(false);
        };
        match filter.resolve_value(raw) {
            Some(value) => {
                filter.apply(scope, ctx, &value)?;
                Ok(true)
            }
            None => {
                debug!(filter = %name, "no value after normalization; skipped");
                Ok(false)
            }
        }
    }
}

impl<F: Into<AllowedFilter>> FromIterator<F> for FilterRegistry {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().map(Into::into).collect(),
        }
    }
}
