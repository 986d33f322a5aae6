//! Query shaping for listing endpoints.
//!
//! This module provides:
//! - RequestParameters: typed view of a listing query string
//! - QueryDescription: immutable, unexecuted document query
//! - QueryShaper: filter → sort → fields → page pipeline

mod description;
mod params;
mod pipeline;

pub use description::{
    AND_OPERATOR, ID_FIELD, Projection, QueryDescription, SortDirection, SortKey, VERSION_KEY,
};
pub use params::{FilterParam, RESERVED_KEYS, RequestParameters, is_reserved};
pub use pipeline::{
    COMPARISON_OPERATORS, DEFAULT_LIMIT, DEFAULT_PAGE, DEFAULT_PROJECTION, DEFAULT_SORT,
    MAX_WINDOW, QueryShaper, coerce_scalar,
};
