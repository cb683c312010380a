//! Relation path resolution.
//!
//! A dotted property such as `posts.comments.author.name` is split into a
//! relation chain (`posts`, `comments`, `author`) and a leaf (`name`). The
//! chain is entered one existence scope per hop, and the leaf is applied to
//! the innermost scope. Qualified leaf columns are recorded in the
//! [`ResolutionContext`] so re-entering a strategy with an already rewritten
//! column does not resolve it again. The record only lives for one filter.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::QueryResult;
use crate::scope::{Boolean, EntityLookup, QueryScope};

/// Per-resolution state threaded through every strategy.
///
/// The lookup is shared by the whole pass; the visited set is cleared
/// before each filter is applied.
#[derive(Default)]
pub struct ResolutionContext {
    visited: HashSet<String>,
    lookup: Option<Arc<dyn EntityLookup>>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup(mut self, lookup: Option<Arc<dyn EntityLookup>>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn lookup(&self) -> Option<&Arc<dyn EntityLookup>> {
        self.lookup.as_ref()
    }

    pub fn is_visited(&self, property: &str) -> bool {
        self.visited.contains(property)
    }

    pub fn mark_visited(&mut self, property: &str) {
        self.visited.insert(property.to_string());
    }

    pub fn clear_visited(&mut self) {
        self.visited.clear();
    }
}

impl std::fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("visited", &self.visited)
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

/// Outcome of resolving a property against a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyPath<'a> {
    /// A (possibly dotted) column on the current scope.
    Column(&'a str),
    /// A relation chain followed by a leaf on the last related entity.
    Related { relations: Vec<&'a str>, leaf: &'a str },
}

/// Decide whether `property` names a column on `scope` or a path through
/// one of its relations.
pub fn resolve<'a>(
    scope: &dyn QueryScope,
    ctx: &ResolutionContext,
    property: &'a str,
) -> PropertyPath<'a> {
    let Some((head, leaf)) = property.rsplit_once('.') else {
        return PropertyPath::Column(property);
    };
    if ctx.is_visited(property) {
        return PropertyPath::Column(property);
    }
    let relations: Vec<&str> = head.split('.').collect();
    if !relations.first().is_some_and(|first| scope.has_relation(first)) {
        return PropertyPath::Column(property);
    }
    PropertyPath::Related { relations, leaf }
}

/// Enter `relations` one existence scope per hop and call `apply` on the
/// innermost scope with the leaf.
///
/// The outermost `EXISTS` joins the existing clauses with `boolean`; inner
/// hops are conjunctive. With `qualify` set the leaf is qualified with the
/// innermost scope's table first. The leaf handed to `apply` is marked
/// visited.
pub fn constrain<F>(
    scope: &mut dyn QueryScope,
    ctx: &mut ResolutionContext,
    boolean: Boolean,
    relations: &[&str],
    leaf: &str,
    qualify: bool,
    apply: &mut F,
) -> QueryResult<()>
where
    F: FnMut(&mut dyn QueryScope, &mut ResolutionContext, &str) -> QueryResult<()>,
{
    let Some((relation, rest)) = relations.split_first() else {
        let column = if qualify {
            scope.qualify_column(leaf)
        } else {
            leaf.to_string()
        };
        ctx.mark_visited(&column);
        return apply(scope, ctx, &column);
    };

    tracing::trace!(relation = %relation, leaf = %leaf, "entering relation scope");
    scope.where_has(boolean, relation, &mut |nested: &mut dyn QueryScope| -> QueryResult<()> {
        constrain(nested, &mut *ctx, Boolean::And, rest, leaf, qualify, &mut *apply)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Entity, Schema};
    use crate::scope::Comparison;
    use crate::scope::sql::SqlScope;

    fn scope() -> SqlScope {
        let schema = Schema::new()
            .with_entity(Entity::new("users", "users").has_many("posts", "posts", "user_id"))
            .with_entity(Entity::new("posts", "posts").has_many("comments", "comments", "post_id"))
            .with_entity(Entity::new("comments", "comments"));
        SqlScope::new(Arc::new(schema), "users").unwrap()
    }

    #[test]
    fn plain_column() {
        let scope = scope();
        let ctx = ResolutionContext::new();
        assert_eq!(resolve(&scope, &ctx, "name"), PropertyPath::Column("name"));
    }

    #[test]
    fn dotted_non_relation_is_literal_column() {
        let scope = scope();
        let ctx = ResolutionContext::new();
        assert_eq!(
            resolve(&scope, &ctx, "meta.name"),
            PropertyPath::Column("meta.name")
        );
    }

    #[test]
    fn relation_chain_splits_on_last_dot() {
        let scope = scope();
        let ctx = ResolutionContext::new();
        assert_eq!(
            resolve(&scope, &ctx, "posts.comments.body"),
            PropertyPath::Related {
                relations: vec!["posts", "comments"],
                leaf: "body"
            }
        );
    }

    #[test]
    fn visited_property_is_not_resolved_again() {
        let scope = scope();
        let mut ctx = ResolutionContext::new();
        ctx.mark_visited("posts.title");
        assert_eq!(
            resolve(&scope, &ctx, "posts.title"),
            PropertyPath::Column("posts.title")
        );
    }

    #[test]
    fn cleared_context_resolves_relation_again() {
        let scope = scope();
        let mut ctx = ResolutionContext::new();
        ctx.mark_visited("posts.title");
        ctx.clear_visited();
        assert_eq!(
            resolve(&scope, &ctx, "posts.title"),
            PropertyPath::Related {
                relations: vec!["posts"],
                leaf: "title"
            }
        );
    }

    #[test]
    fn constrain_nests_one_scope_per_hop() {
        let mut scope = scope();
        let mut ctx = ResolutionContext::new();
        let mut seen = Vec::new();

        constrain(
            &mut scope,
            &mut ctx,
            Boolean::And,
            &["posts", "comments"],
            "body",
            true,
            &mut |nested: &mut dyn QueryScope, _: &mut ResolutionContext, column: &str| {
                seen.push(column.to_string());
                nested.where_compare(Boolean::And, column, Comparison::Equal, &"x".into())
            },
        )
        .unwrap();

        assert_eq!(seen, vec!["comments.body"]);
        assert!(ctx.is_visited("comments.body"));

        let sql = scope.to_sql().unwrap();
        assert_eq!(sql.matches("EXISTS").count(), 2, "{sql}");
        assert!(sql.contains(r#""comments"."body" = 'x'"#), "{sql}");
    }

    #[test]
    fn constrain_without_qualify_passes_bare_leaf() {
        let mut scope = scope();
        let mut ctx = ResolutionContext::new();
        let mut seen = String::new();

        constrain(
            &mut scope,
            &mut ctx,
            Boolean::And,
            &["posts"],
            "published",
            false,
            &mut |_: &mut dyn QueryScope, _: &mut ResolutionContext, column: &str| {
                seen = column.to_string();
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(seen, "published");
    }
}
