//! sea-query backed [`QueryScope`] rendering PostgreSQL.
//!
//! Existence scopes become correlated `EXISTS (SELECT 1 ...)` subqueries,
//! one per relation hop. Relation counts become correlated `COUNT(*)`
//! subqueries in the select list. Eager loads are recorded and turned into
//! batched child queries on demand.

use std::sync::Arc;

use sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Func, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, SubQueryStatement, Value,
};

use super::{
    Boolean, Comparison, QueryScope, RelationInfo, RelationKind, ScopeArg, ScopeBuilder,
    SortDirection, TrashedMode,
};
use crate::error::{QueryError, QueryResult};
use crate::schema::{Entity, Relation, Schema};
use crate::value::FilterValue;

/// A relation path recorded for eager loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoad {
    /// Dotted relation path from the root entity.
    pub relation: String,
    /// Column restriction; `None` loads every column.
    pub columns: Option<Vec<String>>,
}

/// Query over one entity of a [`Schema`].
#[derive(Debug, Clone)]
pub struct SqlScope {
    schema: Arc<Schema>,
    entity: String,
    table: String,
    alias: String,
    depth: usize,
    /// Aliases in use by enclosing scopes.
    ancestors: Vec<String>,
    soft_delete: Option<String>,
    clauses: Vec<(Boolean, Condition)>,
    trashed: TrashedMode,
    columns: Vec<String>,
    orders: Vec<(String, SortDirection)>,
    eager_loads: Vec<EagerLoad>,
    counts: Vec<String>,
}

impl SqlScope {
    /// Root scope over `entity`.
    pub fn new(schema: Arc<Schema>, entity: &str) -> QueryResult<Self> {
        let (table, soft_delete) = {
            let entity = schema.entity(entity)?;
            (entity.table().to_string(), entity.soft_delete.clone())
        };
        Ok(Self {
            schema,
            entity: entity.to_string(),
            alias: table.clone(),
            table,
            depth: 0,
            ancestors: Vec::new(),
            soft_delete,
            clauses: Vec::new(),
            trashed: TrashedMode::default(),
            columns: Vec::new(),
            orders: Vec::new(),
            eager_loads: Vec::new(),
            counts: Vec::new(),
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn eager_loads(&self) -> &[EagerLoad] {
        &self.eager_loads
    }

    /// Child scope over a related entity, aliased when its table is already
    /// used by this scope or an enclosing one.
    fn nested(&self, target: &Entity) -> Self {
        let depth = self.depth + 1;
        let table = target.table().to_string();
        let collides = table == self.alias || self.ancestors.iter().any(|a| *a == table);
        let alias = if collides {
            format!("{table}_{depth}")
        } else {
            table.clone()
        };
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.alias.clone());

        Self {
            schema: Arc::clone(&self.schema),
            entity: target.name.clone(),
            table,
            alias,
            depth,
            ancestors,
            soft_delete: target.soft_delete.clone(),
            clauses: Vec::new(),
            trashed: TrashedMode::default(),
            columns: Vec::new(),
            orders: Vec::new(),
            eager_loads: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// Child scope for a parenthesized group on the same entity.
    fn group(&self) -> Self {
        Self {
            soft_delete: None,
            clauses: Vec::new(),
            columns: Vec::new(),
            orders: Vec::new(),
            eager_loads: Vec::new(),
            counts: Vec::new(),
            ..self.clone()
        }
    }

    /// Related scope for `relation` plus the correlation predicate joining
    /// it to this scope.
    fn related(&self, relation: &str) -> QueryResult<(Self, SimpleExpr)> {
        let owner = self.schema.entity(&self.entity)?;
        let rel = owner
            .relations
            .get(relation)
            .ok_or_else(|| QueryError::UnknownRelation {
                entity: self.entity.clone(),
                relation: relation.to_string(),
            })?;
        let target = self.schema.entity(&rel.target)?;
        let child = self.nested(target);
        let join = correlation(rel, owner, target, &self.alias, &child.alias);
        Ok((child, join))
    }

    fn push(&mut self, boolean: Boolean, expr: SimpleExpr) {
        self.clauses.push((boolean, Cond::all().add(expr)));
    }

    /// Predicates added through the query interface, folded left.
    fn clause_condition(&self) -> Option<Condition> {
        let mut clauses = self.clauses.iter().cloned();
        let (_, first) = clauses.next()?;
        let mut kind = Boolean::And;
        let mut acc = Cond::all().add(first);
        for (boolean, next) in clauses {
            acc = if boolean == kind {
                acc.add(next)
            } else {
                kind = boolean;
                match boolean {
                    Boolean::And => Cond::all().add(acc).add(next),
                    Boolean::Or => Cond::any().add(acc).add(next),
                }
            };
        }
        Some(acc)
    }

    fn trashed_expr(&self) -> Option<SimpleExpr> {
        let column = self.soft_delete.as_deref()?;
        let column = column_expr(&self.qualify_column(column));
        match self.trashed {
            TrashedMode::With => None,
            TrashedMode::Only => Some(column.is_not_null()),
            TrashedMode::Without => Some(column.is_null()),
        }
    }

    /// Full WHERE condition, including the soft-delete predicate.
    pub fn condition(&self) -> Option<Condition> {
        match (self.clause_condition(), self.trashed_expr()) {
            (None, None) => None,
            (Some(clauses), None) => Some(clauses),
            (None, Some(trashed)) => Some(Cond::all().add(trashed)),
            (Some(clauses), Some(trashed)) => Some(Cond::all().add(clauses).add(trashed)),
        }
    }

    fn select_from(&self, query: &mut SelectStatement) {
        if self.alias == self.table {
            query.from(Alias::new(&self.table));
        } else {
            query.from_as(Alias::new(&self.table), Alias::new(&self.alias));
        }
    }

    fn count_expr(&self, relation: &str) -> QueryResult<SimpleExpr> {
        let (child, join) = self.related(relation)?;
        let mut sub = Query::select();
        sub.expr(Expr::col(Asterisk).count());
        child.select_from(&mut sub);
        let mut cond = Cond::all().add(join);
        if let Some(nested) = child.condition() {
            cond = cond.add(nested);
        }
        sub.cond_where(cond);
        Ok(SimpleExpr::SubQuery(
            None,
            Box::new(SubQueryStatement::SelectStatement(sub)),
        ))
    }

    /// Build the SELECT statement.
    pub fn select(&self) -> QueryResult<SelectStatement> {
        let mut query = Query::select();

        if self.columns.is_empty() {
            query.column((Alias::new(&self.alias), Asterisk));
        } else {
            for column in &self.columns {
                query.expr(column_expr(column));
            }
        }

        for relation in &self.counts {
            query.expr_as(self.count_expr(relation)?, Alias::new(format!("{relation}_count")));
        }

        self.select_from(&mut query);

        if let Some(condition) = self.condition() {
            query.cond_where(condition);
        }

        for (column, direction) in &self.orders {
            let order = match direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            query.order_by_expr(column_expr(column).into(), order);
        }

        Ok(query)
    }

    pub fn to_sql(&self) -> QueryResult<String> {
        Ok(self.select()?.to_string(PostgresQueryBuilder))
    }

    /// Batched child query for a recorded eager load.
    ///
    /// `parent_keys` are the key values of the rows one hop up the path
    /// (root rows for a single-segment path).
    pub fn eager_load_scope(
        &self,
        load: &EagerLoad,
        parent_keys: &[FilterValue],
    ) -> QueryResult<SqlScope> {
        let (owner, rel, target) = self.walk(&load.relation)?;
        let mut scope = SqlScope::new(Arc::clone(&self.schema), &target.name)?;

        let column = match rel.kind {
            RelationKind::BelongsTo => rel.referenced_key(owner, target).to_string(),
            RelationKind::HasOne | RelationKind::HasMany => rel.foreign_key.clone(),
        };
        let column = scope.qualify_column(&column);
        scope.where_in(Boolean::And, &column, parent_keys, false)?;

        if let Some(columns) = &load.columns {
            let qualified: Vec<String> = columns.iter().map(|c| scope.qualify_column(c)).collect();
            scope.select_columns(qualified)?;
        }
        Ok(scope)
    }

    /// Follow a dotted relation path, returning the last hop's owner,
    /// relation and target.
    fn walk(&self, path: &str) -> QueryResult<(&Entity, &Relation, &Entity)> {
        let mut owner = self.schema.entity(&self.entity)?;
        let mut last = None;
        for segment in path.split('.') {
            let rel = owner
                .relations
                .get(segment)
                .ok_or_else(|| QueryError::UnknownRelation {
                    entity: owner.name.clone(),
                    relation: segment.to_string(),
                })?;
            let target = self.schema.entity(&rel.target)?;
            last = Some((owner, rel, target));
            owner = target;
        }
        last.ok_or_else(|| QueryError::UnknownRelation {
            entity: self.entity.clone(),
            relation: path.to_string(),
        })
    }
}

impl QueryScope for SqlScope {
    fn table(&self) -> &str {
        &self.alias
    }

    fn relation(&self, name: &str) -> Option<RelationInfo> {
        self.schema.relation_info(&self.entity, name)
    }

    fn where_compare(
        &mut self,
        boolean: Boolean,
        column: &str,
        comparison: Comparison,
        value: &FilterValue,
    ) -> QueryResult<()> {
        let col = column_expr(column);
        let expr = match (comparison, value) {
            (Comparison::Equal, FilterValue::Null) => col.is_null(),
            (Comparison::NotEqual, FilterValue::Null) => col.is_not_null(),
            (Comparison::Equal, v) => col.eq(to_value(v)),
            (Comparison::NotEqual, v) => col.ne(to_value(v)),
            (Comparison::LessThan, v) => col.lt(to_value(v)),
            (Comparison::LessThanOrEqual, v) => col.lte(to_value(v)),
            (Comparison::GreaterThan, v) => col.gt(to_value(v)),
            (Comparison::GreaterThanOrEqual, v) => col.gte(to_value(v)),
            (Comparison::Like, v) => col.like(pattern(v)),
            (Comparison::LikeCaseInsensitive, v) => {
                Expr::expr(Func::lower(col)).like(pattern(v).to_lowercase())
            }
        };
        self.push(boolean, expr);
        Ok(())
    }

    fn where_in(
        &mut self,
        boolean: Boolean,
        column: &str,
        values: &[FilterValue],
        negated: bool,
    ) -> QueryResult<()> {
        let values: Vec<Value> = values.iter().map(to_value).collect();
        let col = column_expr(column);
        let expr = if negated {
            col.is_not_in(values)
        } else {
            col.is_in(values)
        };
        self.push(boolean, expr);
        Ok(())
    }

    fn where_group(&mut self, boolean: Boolean, build: &mut ScopeBuilder<'_>) -> QueryResult<()> {
        let mut group = self.group();
        build(&mut group)?;
        if let Some(condition) = group.clause_condition() {
            self.clauses.push((boolean, condition));
        }
        Ok(())
    }

    fn where_has(
        &mut self,
        boolean: Boolean,
        relation: &str,
        build: &mut ScopeBuilder<'_>,
    ) -> QueryResult<()> {
        let (mut child, join) = self.related(relation)?;
        build(&mut child)?;

        let mut sub = Query::select();
        sub.expr(Expr::val(1));
        child.select_from(&mut sub);
        let mut cond = Cond::all().add(join);
        if let Some(nested) = child.condition() {
            cond = cond.add(nested);
        }
        sub.cond_where(cond);

        self.push(boolean, Expr::exists(sub));
        Ok(())
    }

    fn call_scope(&mut self, name: &str, args: &[ScopeArg]) -> QueryResult<()> {
        let handler = self
            .schema
            .entity(&self.entity)?
            .named_scope(name)
            .ok_or_else(|| QueryError::UnknownScope {
                entity: self.entity.clone(),
                scope: name.to_string(),
            })?;
        handler.apply(self, args)
    }

    fn with_trashed(&mut self, mode: TrashedMode) -> QueryResult<()> {
        if self.soft_delete.is_none() {
            tracing::debug!(entity = %self.entity, "entity does not soft-delete; mode ignored");
        }
        self.trashed = mode;
        Ok(())
    }

    fn order_by(&mut self, column: &str, direction: SortDirection) -> QueryResult<()> {
        self.orders.push((column.to_string(), direction));
        Ok(())
    }

    fn eager_load(&mut self, relation: &str, columns: Option<Vec<String>>) -> QueryResult<()> {
        self.walk(relation)?;
        match self.eager_loads.iter_mut().find(|l| l.relation == relation) {
            Some(existing) => {
                if columns.is_some() {
                    existing.columns = columns;
                }
            }
            None => self.eager_loads.push(EagerLoad {
                relation: relation.to_string(),
                columns,
            }),
        }
        Ok(())
    }

    fn with_count(&mut self, relation: &str) -> QueryResult<()> {
        self.related(relation)?;
        if !self.counts.iter().any(|r| r == relation) {
            self.counts.push(relation.to_string());
        }
        Ok(())
    }

    fn select_columns(&mut self, columns: Vec<String>) -> QueryResult<()> {
        self.columns = columns;
        Ok(())
    }
}

/// Correlation predicate between an owner row and a related row.
fn correlation(
    rel: &Relation,
    owner: &Entity,
    target: &Entity,
    owner_alias: &str,
    target_alias: &str,
) -> SimpleExpr {
    let key = rel.referenced_key(owner, target);
    match rel.kind {
        RelationKind::BelongsTo => Expr::col((Alias::new(target_alias), Alias::new(key)))
            .equals((Alias::new(owner_alias), Alias::new(&rel.foreign_key))),
        RelationKind::HasOne | RelationKind::HasMany => {
            Expr::col((Alias::new(target_alias), Alias::new(&rel.foreign_key)))
                .equals((Alias::new(owner_alias), Alias::new(key)))
        }
    }
}

/// Column reference for `column` or `table.column`.
fn column_expr(column: &str) -> Expr {
    match column.rsplit_once('.') {
        Some((table, name)) => Expr::col((Alias::new(table), Alias::new(name))),
        None => Expr::col(Alias::new(column)),
    }
}

fn to_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::Null => Value::String(None),
        FilterValue::Boolean(b) => (*b).into(),
        FilterValue::Integer(i) => (*i).into(),
        FilterValue::Float(f) => (*f).into(),
        FilterValue::String(s) => s.clone().into(),
        FilterValue::List(_) => value.to_string().into(),
    }
}

fn pattern(value: &FilterValue) -> String {
    value.as_text().unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryResult;
    use crate::schema::Entity;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new()
                .with_entity(
                    Entity::new("users", "users")
                        .has_many("posts", "posts", "user_id")
                        .has_many("friends", "users", "friend_of_id"),
                )
                .with_entity(
                    Entity::new("posts", "posts")
                        .belongs_to("author", "users", "user_id")
                        .soft_deletes("deleted_at"),
                ),
        )
    }

    fn users() -> SqlScope {
        SqlScope::new(schema(), "users").unwrap()
    }

    #[test]
    fn unknown_entity() {
        assert!(matches!(
            SqlScope::new(schema(), "tags"),
            Err(QueryError::UnknownEntity(_))
        ));
    }

    #[test]
    fn bare_select() {
        let sql = users().to_sql().unwrap();
        assert_eq!(sql, r#"SELECT "users".* FROM "users""#);
    }

    #[test]
    fn qualify_uses_alias() {
        let scope = users();
        assert_eq!(scope.qualify_column("name"), "users.name");
        assert_eq!(scope.qualify_column("posts.title"), "posts.title");
    }

    #[test]
    fn compare_and_in() {
        let mut scope = users();
        scope
            .where_compare(
                Boolean::And,
                "users.age",
                Comparison::GreaterThanOrEqual,
                &FilterValue::Integer(25),
            )
            .unwrap();
        let statuses = [FilterValue::from("a"), FilterValue::from("b")];
        scope
            .where_in(Boolean::And, "users.status", &statuses, true)
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#""users"."age" >= 25"#), "{sql}");
        assert!(sql.contains(r#""users"."status" NOT IN ('a', 'b')"#), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn null_equality_renders_is_null() {
        let mut scope = users();
        scope
            .where_compare(Boolean::And, "users.email", Comparison::Equal, &FilterValue::Null)
            .unwrap();
        scope
            .where_compare(Boolean::And, "users.name", Comparison::NotEqual, &FilterValue::Null)
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#""users"."email" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""users"."name" IS NOT NULL"#), "{sql}");
    }

    #[test]
    fn or_clause_disjoins_with_previous() {
        let mut scope = users();
        scope
            .where_compare(Boolean::And, "users.a", Comparison::Equal, &FilterValue::Integer(1))
            .unwrap();
        scope
            .where_compare(Boolean::Or, "users.b", Comparison::Equal, &FilterValue::Integer(2))
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#""users"."a" = 1 OR "users"."b" = 2"#), "{sql}");
    }

    #[test]
    fn group_is_parenthesized() {
        let mut scope = users();
        scope
            .where_compare(Boolean::And, "users.active", Comparison::Equal, &true.into())
            .unwrap();
        scope
            .where_group(Boolean::And, &mut |group: &mut dyn QueryScope| -> QueryResult<()> {
                let (one, two) = (FilterValue::Integer(1), FilterValue::Integer(2));
                group.where_compare(Boolean::Or, "users.age", Comparison::Equal, &one)?;
                group.where_compare(Boolean::Or, "users.age", Comparison::Equal, &two)
            })
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(
            sql.contains(r#"("users"."age" = 1 OR "users"."age" = 2)"#),
            "{sql}"
        );
    }

    #[test]
    fn empty_group_adds_nothing() {
        let mut scope = users();
        scope
            .where_group(Boolean::And, &mut |_: &mut dyn QueryScope| -> QueryResult<()> { Ok(()) })
            .unwrap();
        assert!(!scope.to_sql().unwrap().contains("WHERE"));
    }

    #[test]
    fn where_has_correlates_and_soft_deletes() {
        let mut scope = users();
        scope
            .where_has(
                Boolean::And,
                "posts",
                &mut |posts: &mut dyn QueryScope| -> QueryResult<()> {
                    let column = posts.qualify_column("title");
                    posts.where_compare(Boolean::And, &column, Comparison::Equal, &"hi".into())
                },
            )
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert_eq!(sql.matches("EXISTS").count(), 1, "{sql}");
        assert!(sql.contains(r#"SELECT 1 FROM "posts""#), "{sql}");
        assert!(sql.contains(r#""posts"."user_id" = "users"."id""#), "{sql}");
        assert!(sql.contains(r#""posts"."title" = 'hi'"#), "{sql}");
        assert!(sql.contains(r#""posts"."deleted_at" IS NULL"#), "{sql}");
    }

    #[test]
    fn where_has_joins_with_its_boolean() {
        let mut scope = users();
        let column = scope.qualify_column("name");
        scope
            .where_compare(Boolean::And, &column, Comparison::Equal, &"ada".into())
            .unwrap();
        scope
            .where_has(Boolean::Or, "posts", &mut |_: &mut dyn QueryScope| -> QueryResult<()> {
                Ok(())
            })
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#""users"."name" = 'ada' OR EXISTS"#), "{sql}");
    }

    #[test]
    fn belongs_to_correlation_points_at_owner_key() {
        let mut scope = SqlScope::new(schema(), "posts").unwrap();
        scope
            .where_has(Boolean::And, "author", &mut |_: &mut dyn QueryScope| -> QueryResult<()> {
                Ok(())
            })
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#""users"."id" = "posts"."user_id""#), "{sql}");
    }

    #[test]
    fn self_relation_is_aliased() {
        let mut scope = users();
        scope
            .where_has(
                Boolean::And,
                "friends",
                &mut |friends: &mut dyn QueryScope| -> QueryResult<()> {
                    assert_eq!(friends.table(), "users_1");
                    let column = friends.qualify_column("name");
                    friends.where_compare(Boolean::And, &column, Comparison::Equal, &"ann".into())
                },
            )
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#"FROM "users" AS "users_1""#), "{sql}");
        assert!(sql.contains(r#""users_1"."friend_of_id" = "users"."id""#), "{sql}");
        assert!(sql.contains(r#""users_1"."name" = 'ann'"#), "{sql}");
    }

    #[test]
    fn unknown_relation_is_an_error() {
        let mut scope = users();
        let err = scope
            .where_has(Boolean::And, "tags", &mut |_: &mut dyn QueryScope| -> QueryResult<()> {
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownRelation { .. }));
    }

    #[test]
    fn trashed_modes() {
        let mut posts = SqlScope::new(schema(), "posts").unwrap();
        assert!(posts.to_sql().unwrap().contains(r#""posts"."deleted_at" IS NULL"#));

        posts.with_trashed(TrashedMode::Only).unwrap();
        assert!(posts.to_sql().unwrap().contains(r#""posts"."deleted_at" IS NOT NULL"#));

        posts.with_trashed(TrashedMode::With).unwrap();
        assert!(!posts.to_sql().unwrap().contains("deleted_at"));
    }

    #[test]
    fn counts_columns_and_order() {
        let mut scope = users();
        scope.with_count("posts").unwrap();
        scope.with_count("posts").unwrap();
        scope
            .select_columns(vec!["users.id".to_string(), "users.name".to_string()])
            .unwrap();
        scope.order_by("users.name", SortDirection::Desc).unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(
            sql.starts_with(r#"SELECT "users"."id", "users"."name", (SELECT COUNT(*)"#),
            "{sql}"
        );
        assert_eq!(sql.matches("COUNT(*)").count(), 1, "{sql}");
        assert!(sql.contains(r#"AS "posts_count""#), "{sql}");
        assert!(sql.ends_with(r#"ORDER BY "users"."name" DESC"#), "{sql}");
    }

    #[test]
    fn case_insensitive_like_lowers_both_sides() {
        let mut scope = users();
        scope
            .where_compare(
                Boolean::And,
                "users.name",
                Comparison::LikeCaseInsensitive,
                &FilterValue::from("%John%"),
            )
            .unwrap();

        let sql = scope.to_sql().unwrap();
        assert!(sql.contains(r#"LOWER("users"."name") LIKE '%john%'"#), "{sql}");
    }

    #[test]
    fn eager_loads_merge_and_build_child_query() {
        let mut scope = users();
        scope.eager_load("posts", None).unwrap();
        scope
            .eager_load("posts", Some(vec!["id".to_string(), "title".to_string()]))
            .unwrap();
        scope.eager_load("posts.author", None).unwrap();
        assert!(scope.eager_load("posts.tags", None).is_err());

        assert_eq!(scope.eager_loads().len(), 2);
        let load = &scope.eager_loads()[0];
        assert_eq!(load.columns.as_deref(), Some(&["id".to_string(), "title".to_string()][..]));

        let child = scope
            .eager_load_scope(load, &[FilterValue::Integer(1), FilterValue::Integer(2)])
            .unwrap()
            .to_sql()
            .unwrap();
        assert!(
            child.starts_with(r#"SELECT "posts"."id", "posts"."title" FROM "posts""#),
            "{child}"
        );
        assert!(child.contains(r#""posts"."user_id" IN (1, 2)"#), "{child}");

        let author = scope
            .eager_load_scope(&scope.eager_loads()[1], &[FilterValue::Integer(9)])
            .unwrap()
            .to_sql()
            .unwrap();
        assert!(author.contains(r#""users"."id" IN (9)"#), "{author}");
    }

    #[test]
    fn named_scope_is_invoked() {
        let schema = Arc::new(
            Schema::new()
                .with_entity(Entity::new("posts", "posts").scope(
                    "published",
                    |scope: &mut dyn QueryScope, _: &[ScopeArg]| -> QueryResult<()> {
                        let column = scope.qualify_column("published");
                        scope.where_compare(Boolean::And, &column, Comparison::Equal, &true.into())
                    },
                )),
        );
        let mut scope = SqlScope::new(schema, "posts").unwrap();
        scope.call_scope("published", &[]).unwrap();
        assert!(scope.to_sql().unwrap().contains(r#""posts"."published" = TRUE"#));

        assert!(matches!(
            scope.call_scope("draft", &[]),
            Err(QueryError::UnknownScope { .. })
        ));
    }
}
