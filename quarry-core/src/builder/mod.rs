//! SELECT query builder and its terminal operations

pub mod common;
pub mod fetch;
pub mod select;

pub use common::{
    Category, ColumnSpec, IntoColumns, IntoOrderTerms, IntoTableRef, JoinType, OrderTerm,
    SortDirection, TableRef, BIND_ORDER,
};
pub use fetch::{Fetched, RandomPick};
pub use select::SelectBuilder;
