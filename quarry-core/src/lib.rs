//! Quarry Core - a fluent SELECT builder with dialect-aware execution
//!
//! Queries are assembled with a [`SelectBuilder`], rendered to SQL with `?`
//! placeholders plus an ordered list of bound values, and executed on an
//! [`Engine`] whose [`Dialect`] decides how pagination is expressed.
//!
//! ```no_run
//! use quarry_core::{select, DatabaseConfig, Engine};
//!
//! # async fn demo() -> quarry_core::Result<()> {
//! let mut engine = Engine::new(DatabaseConfig::sqlite("app.db"))?;
//! let rows = select(["id", "name"])
//!     .from("person")
//!     .where_(("team", vec!["red", "blue"]))
//!     .order_by("id")
//!     .limit(10)
//!     .get(&mut engine)
//!     .await;
//! if rows.is_none() {
//!     eprintln!("query failed: {:?}", engine.last_error());
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod condition;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod operator;
pub mod value;

// Re-export main types
pub use builder::{
    Category, ColumnSpec, Fetched, JoinType, RandomPick, SelectBuilder, SortDirection, BIND_ORDER,
};
pub use condition::{cond, evaluate, raw, Descriptor, Fragment, IntoDescriptors};
pub use config::{DatabaseConfig, EngineKind};
pub use dialect::{Dialect, Generic, MySql, Sqlite};
pub use error::{Error, Result};
pub use executor::{CallSite, Engine, Row, Stats};
pub use operator::{Connector, Operator};
pub use value::Value;

/// Start a SELECT with the given columns
pub fn select<C>(columns: C) -> SelectBuilder
where
    C: builder::IntoColumns,
{
    SelectBuilder::new().select(columns)
}

/// Create a column reference, aliasable with [`ColumnSpec::as_alias`]
pub fn col(name: &str) -> ColumnSpec {
    ColumnSpec::column(name)
}
