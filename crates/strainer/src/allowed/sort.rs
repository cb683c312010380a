//! Allow-listed sorts.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::scope::{QueryScope, SortDirection};

/// Caller-supplied ordering logic.
pub trait SortHandler: Send + Sync {
    fn apply(&self, scope: &mut dyn QueryScope, descending: bool, property: &str)
    -> QueryResult<()>;
}

impl<F> SortHandler for F
where
    F: Fn(&mut dyn QueryScope, bool, &str) -> QueryResult<()> + Send + Sync,
{
    fn apply(
        &self,
        scope: &mut dyn QueryScope,
        descending: bool,
        property: &str,
    ) -> QueryResult<()> {
        self(scope, descending, property)
    }
}

#[derive(Clone)]
pub enum SortStrategy {
    /// Order by the column directly.
    Field,
    Custom(Arc<dyn SortHandler>),
}

impl fmt::Debug for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field => f.write_str("Field"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// One allow-listed sort.
///
/// A leading `-` on the name is stripped and makes the default direction
/// descending.
#[derive(Debug, Clone)]
pub struct AllowedSort {
    name: String,
    internal_name: String,
    strategy: SortStrategy,
    default_direction: SortDirection,
}

impl AllowedSort {
    pub fn new(name: &str, strategy: SortStrategy) -> Self {
        let (name, default_direction) = match name.strip_prefix('-') {
            Some(stripped) => (stripped, SortDirection::Desc),
            None => (name, SortDirection::Asc),
        };
        Self {
            name: name.to_string(),
            internal_name: name.to_string(),
            strategy,
            default_direction,
        }
    }

    pub fn field(name: &str) -> Self {
        Self::new(name, SortStrategy::Field)
    }

    pub fn custom<H>(name: &str, handler: H) -> Self
    where
        H: SortHandler + 'static,
    {
        Self::new(name, SortStrategy::Custom(Arc::new(handler)))
    }

    pub fn internal_name(mut self, internal_name: &str) -> Self {
        self.internal_name = internal_name.to_string();
        self
    }

    /// Override the default direction with `asc` or `desc`.
    pub fn default_direction(mut self, direction: &str) -> QueryResult<Self> {
        self.default_direction = SortDirection::parse(direction)
            .ok_or_else(|| QueryError::InvalidSortDirection(direction.to_string()))?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self) -> &str {
        &self.internal_name
    }

    pub fn direction(&self) -> SortDirection {
        self.default_direction
    }

    pub fn is_for_sort(&self, name: &str) -> bool {
        self.name == name
    }

    /// Apply in `direction`, or the default direction when `None`.
    pub fn apply(
        &self,
        scope: &mut dyn QueryScope,
        direction: Option<SortDirection>,
    ) -> QueryResult<()> {
        let direction = direction.unwrap_or(self.default_direction);
        debug!(sort = %self.name, property = %self.internal_name, %direction, "applying sort");
        match &self.strategy {
            SortStrategy::Field => {
                let column = scope.qualify_column(&self.internal_name);
                scope.order_by(&column, direction)
            }
            SortStrategy::Custom(handler) => {
                handler.apply(scope, direction.is_descending(), &self.internal_name)
            }
        }
    }
}

impl From<&str> for AllowedSort {
    fn from(name: &str) -> Self {
        Self::field(name)
    }
}

impl From<String> for AllowedSort {
    fn from(name: String) -> Self {
        Self::field(&name)
    }
}

/// Allow-list of sorts; first registration of a name wins.
#[derive(Debug, Clone, Default)]
pub struct SortRegistry {
    sorts: Vec<AllowedSort>,
}

impl SortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sort: impl Into<AllowedSort>) {
        self.sorts.push(sort.into());
    }

    pub fn get(&self, name: &str) -> Option<&AllowedSort> {
        self.sorts.iter().find(|s| s.is_for_sort(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllowedSort> {
        self.sorts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.sorts.is_empty()
    }

    /// Apply a request sort directive (`name` or `-name`).
    ///
    /// Unknown names are ignored; returns whether a sort was applied.
    pub fn apply(&self, directive: &str, scope: &mut dyn QueryScope) -> QueryResult<bool> {
        let (name, direction) = match directive.strip_prefix('-') {
            Some(name) => (name, SortDirection::Desc),
            None => (directive, SortDirection::Asc),
        };
        let Some(sort) = self.get(name) else {
            debug!(sort = %name, "sort not allowed; ignored");
            return Ok(false);
        };
        sort.apply(scope, Some(direction))?;
        Ok(true)
    }
}

impl<S: Into<AllowedSort>> FromIterator<S> for SortRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            sorts: iter.into_iter().map(Into::into).collect(),
        }
    }
}
