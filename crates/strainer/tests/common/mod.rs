//! Shared fixtures for integration tests.
//!
//! users ─< posts ─< comments >─ authors, with soft-deleting users and
//! posts, a self-referential `manager` relation and a few named scopes.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use strainer::scope::{Comparison, ScopeArg};
use strainer::{
    Boolean, Entity, FilterValue, InMemoryLookup, QueryResult, QueryScope, Schema, SqlScope,
};

pub fn schema() -> Arc<Schema> {
    let users = Entity::new("users", "users")
        .has_many("posts", "posts", "user_id")
        .belongs_to("manager", "users", "manager_id")
        .soft_deletes("deleted_at")
        .scope(
            "active",
            |scope: &mut dyn QueryScope, _: &[ScopeArg]| -> QueryResult<()> {
                let column = scope.qualify_column("status");
                scope.where_compare(Boolean::And, &column, Comparison::Equal, &"active".into())
            },
        )
        .scope(
            "born_between",
            |scope: &mut dyn QueryScope, args: &[ScopeArg]| -> QueryResult<()> {
                let column = scope.qualify_column("birthdate");
                scope.where_compare(
                    Boolean::And,
                    &column,
                    Comparison::GreaterThanOrEqual,
                    args[0].value(),
                )?;
                scope.where_compare(
                    Boolean::And,
                    &column,
                    Comparison::LessThanOrEqual,
                    args[1].value(),
                )
            },
        )
        .scope(
            "managed_by",
            |scope: &mut dyn QueryScope, args: &[ScopeArg]| -> QueryResult<()> {
                let record = args[0].record().expect("manager is looked up");
                let id: FilterValue = serde_json::from_value(record["id"].clone()).unwrap();
                let column = scope.qualify_column("manager_id");
                scope.where_compare(Boolean::And, &column, Comparison::Equal, &id)
            },
        );

    let posts = Entity::new("posts", "posts")
        .has_many("comments", "comments", "post_id")
        .belongs_to("user", "users", "user_id")
        .soft_deletes("deleted_at")
        .scope(
            "published",
            |scope: &mut dyn QueryScope, _: &[ScopeArg]| -> QueryResult<()> {
                let column = scope.qualify_column("published_at");
                scope.where_compare(Boolean::And, &column, Comparison::NotEqual, &FilterValue::Null)
            },
        );

    let comments = Entity::new("comments", "comments")
        .belongs_to("post", "posts", "post_id")
        .belongs_to("author", "authors", "author_id");

    Arc::new(
        Schema::new()
            .with_entity(users)
            .with_entity(posts)
            .with_entity(comments)
            .with_entity(Entity::new("authors", "authors")),
    )
}

pub fn users() -> SqlScope {
    SqlScope::new(schema(), "users").unwrap()
}

pub fn scope_for(entity: &str) -> SqlScope {
    SqlScope::new(schema(), entity).unwrap()
}

pub fn lookup() -> Arc<InMemoryLookup> {
    Arc::new(InMemoryLookup::new().insert(
        "users",
        "id",
        vec![
            json!({"id": 7, "name": "Grace"}),
            json!({"id": 8, "name": "Edsger"}),
        ],
    ))
}

pub const SCHEMA_YAML: &str = r#"
entities:
  - name: users
    soft_delete: deleted_at
    relations:
      posts: { kind: has_many, target: posts, foreign_key: user_id }
  - name: posts
    relations:
      comments: { kind: has_many, target: comments, foreign_key: post_id }
  - name: comments
    relations:
      author: { kind: belongs_to, target: authors, foreign_key: author_id }
  - name: authors
"#;

pub const ENDPOINT_YAML: &str = r#"
entity: users
filters:
  - name
  - name: id
    kind: exact
  - name: age
    kind: operator
    operator: greater_than_or_equal
  - name: status
    kind: exact
    ignore: ["", all]
  - name: commenter
    internal_name: posts.comments.author.name
sorts: [name, -created_at]
default_sorts: [-created_at]
includes:
  - posts
  - name: postsCount
    kind: count
    relation: posts
fields: [id, name, posts.id, posts.title]
"#;
