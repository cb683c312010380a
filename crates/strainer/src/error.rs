//! Query resolution error types.

use thiserror::Error;

/// Errors raised while configuring or resolving a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request named filters that are not on the allow-list.
    #[error(
        "requested filter(s) `{}` are not allowed; allowed filter(s) are `{}`",
        .unknown.join(", "),
        .allowed.join(", ")
    )]
    UnknownFilterRequested {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    #[error("invalid direction `{0}`; allowed directions: asc, desc")]
    InvalidSortDirection(String),

    /// A scope argument could not be resolved to an entity.
    #[error("invalid filter value: '{value}' of type '{value_type}'")]
    InvalidFilterValue { value: String, value_type: String },

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("entity `{entity}` has no relation `{relation}`")]
    UnknownRelation { entity: String, relation: String },

    #[error("entity `{entity}` has no scope `{scope}`")]
    UnknownScope { entity: String, scope: String },

    /// A scope filter needs an entity lookup but none was configured.
    #[error("no entity lookup configured to resolve `{entity}` arguments")]
    LookupUnavailable { entity: String },

    #[error("entity lookup failed: {0}")]
    Lookup(String),

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
