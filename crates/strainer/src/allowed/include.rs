//! Allow-listed includes: eager loads and relation counts.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::QueryResult;
use crate::scope::QueryScope;

/// Caller-supplied include logic.
pub trait IncludeHandler: Send + Sync {
    fn apply(&self, scope: &mut dyn QueryScope, include: &str) -> QueryResult<()>;
}

impl<F> IncludeHandler for F
where
    F: Fn(&mut dyn QueryScope, &str) -> QueryResult<()> + Send + Sync,
{
    fn apply(&self, scope: &mut dyn QueryScope, include: &str) -> QueryResult<()> {
        self(scope, include)
    }
}

#[derive(Clone)]
pub enum IncludeStrategy {
    /// Eager-load the relation path.
    Relationship(String),
    /// Count the related rows into `<relation>_count`.
    Count(String),
    Custom(Arc<dyn IncludeHandler>),
}

impl fmt::Debug for IncludeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relationship(relation) => f.debug_tuple("Relationship").field(relation).finish(),
            Self::Count(relation) => f.debug_tuple("Count").field(relation).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllowedInclude {
    name: String,
    strategy: IncludeStrategy,
}

impl AllowedInclude {
    pub fn relationship(name: &str) -> Self {
        Self::relationship_as(name, name)
    }

    /// Include `name` by eager-loading `relation`.
    pub fn relationship_as(name: &str, relation: &str) -> Self {
        Self {
            name: name.to_string(),
            strategy: IncludeStrategy::Relationship(relation.to_string()),
        }
    }

    /// Include `name` by counting the relation of the same name.
    pub fn count(name: &str) -> Self {
        Self::count_as(name, name)
    }

    pub fn count_as(name: &str, relation: &str) -> Self {
        Self {
            name: name.to_string(),
            strategy: IncludeStrategy::Count(relation.to_string()),
        }
    }

    pub fn custom<H>(name: &str, handler: H) -> Self
    where
        H: IncludeHandler + 'static,
    {
        Self {
            name: name.to_string(),
            strategy: IncludeStrategy::Custom(Arc::new(handler)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &IncludeStrategy {
        &self.strategy
    }

    pub fn is_for_include(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn apply(&self, scope: &mut dyn QueryScope) -> QueryResult<()> {
        debug!(include = %self.name, strategy = ?self.strategy, "applying include");
        match &self.strategy {
            IncludeStrategy::Relationship(relation) => scope.eager_load(relation, None),
            IncludeStrategy::Count(relation) => scope.with_count(relation),
            IncludeStrategy::Custom(handler) => handler.apply(scope, &self.name),
        }
    }
}

impl From<&str> for AllowedInclude {
    fn from(name: &str) -> Self {
        Self::relationship(name)
    }
}

impl From<String> for AllowedInclude {
    fn from(name: String) -> Self {
        Self::relationship(&name)
    }
}

/// Allow-list of includes. Unknown include names are dropped silently.
#[derive(Debug, Clone, Default)]
pub struct IncludeRegistry {
    includes: Vec<AllowedInclude>,
}

impl IncludeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, include: impl Into<AllowedInclude>) {
        self.includes.push(include.into());
    }

    pub fn get(&self, name: &str) -> Option<&AllowedInclude> {
        self.includes.iter().find(|i| i.is_for_include(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllowedInclude> {
        self.includes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty()
    }

    /// Apply a requested include; returns whether it was allowed.
    pub fn apply(&self, name: &str, scope: &mut dyn QueryScope) -> QueryResult<bool> {
        let Some(include) = self.get(name) else {
            debug!(include = %name, "include not allowed; dropped");
            return Ok(false);
        };
        include.apply(scope)?;
        Ok(true)
    }
}

impl<I: Into<AllowedInclude>> FromIterator<I> for IncludeRegistry {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Self {
            includes: iter.into_iter().map(Into::into).collect(),
        }
    }
}
