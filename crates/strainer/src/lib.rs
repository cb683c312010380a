//! Strainer: allow-listed request filtering, sorting, includes and field
//! selection for relational queries.
//!
//! Callers declare what an endpoint permits with a [`QueryResolver`], then
//! resolve decoded [`RequestParams`] against a [`QueryScope`]. Dotted
//! filter names such as `posts.comments.author.name` are rewritten into one
//! existence scope per relation hop. [`SqlScope`] renders the result as
//! PostgreSQL through sea-query.

pub mod allowed;
pub mod config;
pub mod definition;
pub mod error;
pub mod relation;
pub mod request;
pub mod resolver;
pub mod schema;
pub mod scope;
pub mod value;

pub use allowed::{
    AllowedFilter, AllowedInclude, AllowedSort, FieldRegistry, FilterOperator, FilterRegistry,
    IncludeRegistry, SortRegistry,
};
pub use config::Config;
pub use definition::EndpointDefinition;
pub use error::{QueryError, QueryResult};
pub use request::RequestParams;
pub use resolver::{QueryResolver, Resolution};
pub use schema::{Entity, Schema};
pub use scope::sql::SqlScope;
pub use scope::{Boolean, EntityLookup, InMemoryLookup, QueryScope, SortDirection};
pub use value::FilterValue;
