//! Allow-lists: the filters, sorts, includes and fields an endpoint permits.

pub mod field;
pub mod filter;
pub mod include;
pub mod sort;

pub use field::{FieldRegistry, FieldSelection};
pub use filter::{
    AllowedFilter, FilterHandler, FilterOperator, FilterRegistry, FilterStrategy, ScopeLookup,
};
pub use include::{AllowedInclude, IncludeHandler, IncludeRegistry, IncludeStrategy};
pub use sort::{AllowedSort, SortHandler, SortRegistry, SortStrategy};
