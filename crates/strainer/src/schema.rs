//! Model introspection: entities, their relations, soft-delete columns and
//! named scopes.
//!
//! A [`Schema`] is built in code or deserialized from JSON/YAML. Named
//! scopes are Rust closures and are attached after loading.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{QueryError, QueryResult};
use crate::scope::{RelationInfo, RelationKind, ScopeHandler};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    entities: Vec<Entity>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a schema document (YAML is a superset of JSON).
    pub fn from_yaml(source: &str) -> QueryResult<Self> {
        serde_yml::from_str(source).map_err(|e| QueryError::InvalidDefinition(e.to_string()))
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entity(&self, name: &str) -> QueryResult<&Entity> {
        self.entities
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))
    }

    /// Attach a named scope to an already-registered entity.
    pub fn with_scope<H>(mut self, entity: &str, name: &str, handler: H) -> QueryResult<Self>
    where
        H: ScopeHandler + 'static,
    {
        let target = self
            .entities
            .iter_mut()
            .find(|e| e.name == entity)
            .ok_or_else(|| QueryError::UnknownEntity(entity.to_string()))?;
        target.scopes.insert(name.to_string(), Arc::new(handler));
        Ok(self)
    }

    /// Introspect relation `name` on `entity`.
    pub fn relation_info(&self, entity: &str, name: &str) -> Option<RelationInfo> {
        let owner = self.entity(entity).ok()?;
        let relation = owner.relations.get(name)?;
        let target = self.entity(&relation.target).ok()?;
        Some(RelationInfo {
            kind: relation.kind,
            target_table: target.table().to_string(),
            foreign_key: relation.foreign_key.clone(),
        })
    }
}

#[derive(Clone, Deserialize)]
pub struct Entity {
    pub name: String,
    /// Table name; defaults to the entity name.
    #[serde(default)]
    table: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Soft-delete timestamp column, if the entity soft-deletes.
    #[serde(default)]
    pub soft_delete: Option<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, Relation>,
    #[serde(skip)]
    scopes: HashMap<String, Arc<dyn ScopeHandler>>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl Entity {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: Some(table.to_string()),
            primary_key: default_primary_key(),
            soft_delete: None,
            relations: BTreeMap::new(),
            scopes: HashMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    /// To-one relation whose foreign key lives on this entity.
    pub fn belongs_to(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.relation(name, RelationKind::BelongsTo, target, foreign_key)
    }

    /// To-one relation whose foreign key lives on `target`.
    pub fn has_one(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.relation(name, RelationKind::HasOne, target, foreign_key)
    }

    /// To-many relation whose foreign key lives on `target`.
    pub fn has_many(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.relation(name, RelationKind::HasMany, target, foreign_key)
    }

    fn relation(mut self, name: &str, kind: RelationKind, target: &str, foreign_key: &str) -> Self {
        self.relations.insert(
            name.to_string(),
            Relation {
                kind,
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
                key: None,
            },
        );
        self
    }

    /// Soft-delete through `column` (usually `deleted_at`).
    pub fn soft_deletes(mut self, column: &str) -> Self {
        self.soft_delete = Some(column.to_string());
        self
    }

    pub fn scope<H>(mut self, name: &str, handler: H) -> Self
    where
        H: ScopeHandler + 'static,
    {
        self.scopes.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn named_scope(&self, name: &str) -> Option<Arc<dyn ScopeHandler>> {
        self.scopes.get(name).cloned()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scopes: Vec<&String> = self.scopes.keys().collect();
        scopes.sort();
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("table", &self.table())
            .field("primary_key", &self.primary_key)
            .field("soft_delete", &self.soft_delete)
            .field("relations", &self.relations)
            .field("scopes", &scopes)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    /// Related entity name.
    pub target: String,
    pub foreign_key: String,
    /// Key the foreign key points at: the target's key for `belongs_to`,
    /// this entity's key otherwise. Defaults to the primary key.
    #[serde(default)]
    pub key: Option<String>,
}

impl Relation {
    /// Resolve the referenced key column against the owning and target
    /// entities.
    pub fn referenced_key<'a>(&'a self, owner: &'a Entity, target: &'a Entity) -> &'a str {
        match (&self.key, self.kind) {
            (Some(key), _) => key,
            (None, RelationKind::BelongsTo) => &target.primary_key,
            (None, _) => &owner.primary_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{QueryScope, ScopeArg};

    fn blog() -> Schema {
        Schema::new()
            .with_entity(Entity::new("users", "users").has_many("posts", "posts", "user_id"))
            .with_entity(
                Entity::new("posts", "posts")
                    .belongs_to("author", "users", "user_id")
                    .soft_deletes("deleted_at"),
            )
    }

    #[test]
    fn relation_info_resolves_target_table() {
        let schema = blog();
        let info = schema.relation_info("users", "posts").unwrap();
        assert_eq!(info.kind, RelationKind::HasMany);
        assert_eq!(info.target_table, "posts");
        assert_eq!(info.foreign_key, "user_id");

        assert!(schema.relation_info("users", "comments").is_none());
        assert!(schema.relation_info("nobody", "posts").is_none());
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let err = blog().entity("tags").unwrap_err();
        assert!(matches!(err, QueryError::UnknownEntity(name) if name == "tags"));
    }

    #[test]
    fn referenced_key_defaults() {
        let schema = blog();
        let users = schema.entity("users").unwrap();
        let posts = schema.entity("posts").unwrap().clone().primary_key("post_id");

        let author = &posts.relations["author"];
        assert_eq!(author.referenced_key(&posts, users), "id");

        let has_many = &users.relations["posts"];
        assert_eq!(has_many.referenced_key(users, &posts), "id");
    }

    #[test]
    fn yaml_schema_defaults_table_and_key() {
        let schema = Schema::from_yaml(
            r#"
entities:
  - name: users
    relations:
      posts: { kind: has_many, target: posts, foreign_key: user_id }
  - name: posts
    table: blog_posts
    soft_delete: deleted_at
"#,
        )
        .unwrap();

        let users = schema.entity("users").unwrap();
        assert_eq!(users.table(), "users");
        assert_eq!(users.primary_key, "id");
        assert_eq!(
            schema.relation_info("users", "posts").unwrap().target_table,
            "blog_posts"
        );
        assert_eq!(
            schema.entity("posts").unwrap().soft_delete.as_deref(),
            Some("deleted_at")
        );
    }

    #[test]
    fn invalid_yaml_is_invalid_definition() {
        let err = Schema::from_yaml("entities: 3").unwrap_err();
        assert!(matches!(err, QueryError::InvalidDefinition(_)));
    }

    #[test]
    fn scopes_attach_after_loading() {
        let schema = blog()
            .with_scope(
                "posts",
                "published",
                |_: &mut dyn QueryScope, _: &[ScopeArg]| -> QueryResult<()> { Ok(()) },
            )
            .unwrap();
        assert!(schema.entity("posts").unwrap().named_scope("published").is_some());
        assert!(schema.entity("posts").unwrap().named_scope("draft").is_none());

        assert!(
            blog()
                .with_scope(
                    "tags",
                    "x",
                    |_: &mut dyn QueryScope, _: &[ScopeArg]| -> QueryResult<()> { Ok(()) }
                )
                .is_err()
        );
    }
}
