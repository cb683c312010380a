//! Query resolution driver.
//!
//! Matches decoded request parameters against the configured allow-lists
//! and applies the permitted ones to a [`QueryScope`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::allowed::{
    AllowedFilter, AllowedInclude, AllowedSort, FieldRegistry, FilterRegistry, IncludeRegistry,
    SortRegistry,
};
use crate::config::Config;
use crate::error::{QueryError, QueryResult};
use crate::relation::ResolutionContext;
use crate::request::RequestParams;
use crate::scope::{EntityLookup, QueryScope};

/// What a resolution pass applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Filters that produced a constraint.
    pub filters: Vec<String>,
    /// Applied sort directives, defaults included.
    pub sorts: Vec<String>,
    pub includes: Vec<String>,
    /// Unknown filters dropped because the configuration allows it.
    pub ignored_filters: Vec<String>,
    pub default_sorts_applied: bool,
}

/// Allow-lists plus configuration. Read-only once built, so one resolver
/// can serve any number of requests.
#[derive(Clone, Default)]
pub struct QueryResolver {
    config: Config,
    filters: FilterRegistry,
    sorts: SortRegistry,
    default_sorts: Vec<AllowedSort>,
    includes: IncludeRegistry,
    fields: FieldRegistry,
    lookup: Option<Arc<dyn EntityLookup>>,
}

impl QueryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Plain names become partial filters.
    pub fn allowed_filters<I>(mut self, filters: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AllowedFilter>,
    {
        for filter in filters {
            self.filters.register(filter);
        }
        self
    }

    /// Plain names become field sorts.
    pub fn allowed_sorts<I>(mut self, sorts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AllowedSort>,
    {
        for sort in sorts {
            self.sorts.register(sort);
        }
        self
    }

    /// Sorts applied only when the request has no sort directive at all.
    pub fn default_sorts<I>(mut self, sorts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AllowedSort>,
    {
        self.default_sorts.extend(sorts.into_iter().map(Into::into));
        self
    }

    /// Plain names become relationship includes.
    pub fn allowed_includes<I>(mut self, includes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AllowedInclude>,
    {
        for include in includes {
            self.includes.register(include);
        }
        self
    }

    pub fn allowed_fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        for field in fields {
            self.fields.register(field);
        }
        self
    }

    /// Entity lookup used by scope filters with key arguments.
    pub fn with_lookup(mut self, lookup: Arc<dyn EntityLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn sorts(&self) -> &SortRegistry {
        &self.sorts
    }

    pub fn includes(&self) -> &IncludeRegistry {
        &self.includes
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Decode `query` with this resolver's configuration and resolve it.
    pub fn resolve_query(
        &self,
        query: &str,
        scope: &mut dyn QueryScope,
    ) -> QueryResult<Resolution> {
        let request = RequestParams::parse(query, &self.config);
        self.resolve(&request, scope)
    }

    /// Apply `request` to `scope`.
    ///
    /// Unknown filters are rejected before the scope is touched unless the
    /// configuration ignores them.
    pub fn resolve(
        &self,
        request: &RequestParams,
        scope: &mut dyn QueryScope,
    ) -> QueryResult<Resolution> {
        let mut resolution = Resolution::default();

        let unknown: Vec<String> = request
            .filter_names()
            .filter(|name| !self.filters.contains(name))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            if !self.config.ignore_unknown_filters {
                return Err(QueryError::UnknownFilterRequested {
                    unknown,
                    allowed: self.filters.names(),
                });
            }
            warn!(filters = ?unknown, "ignoring filters that are not allowed");
            resolution.ignored_filters = unknown;
        }

        for name in &request.includes {
            if self.includes.apply(name, scope)? {
                resolution.includes.push(name.clone());
            }
        }

        self.fields.apply(&request.fields, scope)?;

        let mut ctx = ResolutionContext::new().with_lookup(self.lookup.clone());
        let mut seen = HashSet::new();
        for filter in self.filters.iter() {
            if !seen.insert(filter.name()) {
                continue;
            }
            let raw = request.filters.get(filter.name());
            if self.filters.apply(filter.name(), scope, &mut ctx, raw)? {
                resolution.filters.push(filter.name().to_string());
            }
        }

        if request.sorts.is_empty() {
            if !self.default_sorts.is_empty() {
                debug!(count = self.default_sorts.len(), "applying default sorts");
                resolution.default_sorts_applied = true;
            }
            for sort in &self.default_sorts {
                sort.apply(scope, None)?;
                let directive = if sort.direction().is_descending() {
                    format!("-{}", sort.name())
                } else {
                    sort.name().to_string()
                };
                resolution.sorts.push(directive);
            }
        } else {
            for directive in &request.sorts {
                if self.sorts.apply(directive, scope)? {
                    resolution.sorts.push(directive.clone());
                }
            }
        }

        Ok(resolution)
    }
}

impl fmt::Debug for QueryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResolver")
            .field("config", &self.config)
            .field("filters", &self.filters)
            .field("sorts", &self.sorts)
            .field("default_sorts", &self.default_sorts)
            .field("includes", &self.includes)
            .field("fields", &self.fields)
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Entity, Schema};
    use crate::scope::sql::SqlScope;

    fn users() -> SqlScope {
        let schema = Schema::new()
            .with_entity(Entity::new("users", "users").has_many("posts", "posts", "user_id"))
            .with_entity(Entity::new("posts", "posts"));
        SqlScope::new(Arc::new(schema), "users").unwrap()
    }

    #[test]
    fn unknown_filter_fails_before_mutating_scope() {
        let resolver = QueryResolver::new().allowed_filters([AllowedFilter::exact("name")]);
        let request = RequestParams::new()
            .with_filter("name", "Ada")
            .with_filter("password", "x");
        let mut scope = users();

        let err = resolver.resolve(&request, &mut scope).unwrap_err();
        match err {
            QueryError::UnknownFilterRequested { unknown, allowed } => {
                assert_eq!(unknown, vec!["password"]);
                assert_eq!(allowed, vec!["name"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!scope.to_sql().unwrap().contains("WHERE"));
    }

    #[test]
    fn ignored_unknown_filters_are_reported() {
        let resolver = QueryResolver::new()
            .with_config(Config::default().with_ignore_unknown_filters(true))
            .allowed_filters([AllowedFilter::exact("name")]);
        let request = RequestParams::new()
            .with_filter("name", "Ada")
            .with_filter("password", "x");
        let mut scope = users();

        let resolution = resolver.resolve(&request, &mut scope).unwrap();
        assert_eq!(resolution.filters, vec!["name"]);
        assert_eq!(resolution.ignored_filters, vec!["password"]);
        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#""users"."name" = 'Ada'"#), "{sql}");
        assert!(!sql.contains("password"), "{sql}");
    }

    #[test]
    fn duplicate_registration_applies_once() {
        let resolver = QueryResolver::new().allowed_filters([
            AllowedFilter::exact("name"),
            AllowedFilter::partial("name"),
        ]);
        let mut scope = users();
        let resolution = resolver
            .resolve(&RequestParams::new().with_filter("name", "Ada"), &mut scope)
            .unwrap();

        assert_eq!(resolution.filters, vec!["name"]);
        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#""users"."name" = 'Ada'"#), "{sql}");
        assert!(!sql.contains("LIKE"), "{sql}");
    }

    #[test]
    fn default_filter_applies_without_request_value() {
        let resolver = QueryResolver::new()
            .allowed_filters([AllowedFilter::exact("status").default("active")]);
        let mut scope = users();
        let resolution = resolver.resolve(&RequestParams::new(), &mut scope).unwrap();

        assert_eq!(resolution.filters, vec!["status"]);
        assert!(scope.to_sql().unwrap().contains(r#""users"."status" = 'active'"#));
    }

    #[test]
    fn resolve_query_uses_configured_names() {
        let mut config = Config::default();
        config.parameters.filter = "where".to_string();
        let resolver = QueryResolver::new()
            .with_config(config)
            .allowed_filters([AllowedFilter::exact("name")]);
        let mut scope = users();

        resolver
            .resolve_query("where[name]=Ada&filter[secret]=1", &mut scope)
            .unwrap();
        assert!(scope.to_sql().unwrap().contains(r#""users"."name" = 'Ada'"#));
    }

    #[test]
    fn includes_are_reported() {
        let resolver = QueryResolver::new().allowed_includes(["posts"]);
        let mut scope = users();
        let resolution = resolver
            .resolve(
                &RequestParams::new().with_include("posts").with_include("secrets"),
                &mut scope,
            )
            .unwrap();
        assert_eq!(resolution.includes, vec!["posts"]);
    }
}
