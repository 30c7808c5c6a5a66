//! Per-engine SQL differences: pagination, database switching, table listing

use std::fmt::Debug;

/// Strategy for the SQL an engine needs beyond the portable core.
///
/// Implementations are stateless and can be shared between engines.
pub trait Dialect: Debug + Send + Sync {
    /// Engine family name, e.g. `"mysql"`
    fn engine_name(&self) -> &'static str;

    /// Statement that switches the active database in place.
    ///
    /// `None` means the engine cannot switch and the caller must reconnect.
    fn switch_database(&self, name: &str) -> Option<String>;

    /// Append native pagination to `sql`.
    ///
    /// Returns `false` when the engine cannot express the requested bounds,
    /// in which case `sql` is left untouched and the caller paginates rows
    /// itself. A zero `limit` means unbounded.
    fn splice_pagination(&self, sql: &mut String, offset: u64, limit: u64) -> bool;

    /// Query whose first column lists the tables of the current database
    fn list_tables_query(&self) -> Option<&'static str>;
}

/// MySQL and MariaDB
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

// Largest row count MySQL accepts, used as "no limit" when only an offset is set.
const MYSQL_UNBOUNDED: u64 = u64::MAX;

impl Dialect for MySql {
    fn engine_name(&self) -> &'static str {
        "mysql"
    }

    fn switch_database(&self, name: &str) -> Option<String> {
        Some(format!("USE {}", name))
    }

    fn splice_pagination(&self, sql: &mut String, offset: u64, limit: u64) -> bool {
        match (offset, limit) {
            (0, 0) => {}
            (0, limit) => sql.push_str(&format!(" LIMIT {}", limit)),
            (offset, 0) => sql.push_str(&format!(" LIMIT {},{}", offset, MYSQL_UNBOUNDED)),
            (offset, limit) => sql.push_str(&format!(" LIMIT {},{}", offset, limit)),
        }
        true
    }

    fn list_tables_query(&self) -> Option<&'static str> {
        Some("SHOW TABLES")
    }
}

/// SQLite
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn engine_name(&self) -> &'static str {
        "sqlite"
    }

    fn switch_database(&self, _name: &str) -> Option<String> {
        None
    }

    fn splice_pagination(&self, sql: &mut String, offset: u64, limit: u64) -> bool {
        if limit == 0 {
            // OFFSET without LIMIT is a syntax error in SQLite, so an offset
            // on an unbounded query is left to the caller.
            return offset == 0;
        }
        sql.push_str(&format!(" LIMIT {}", limit));
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        true
    }

    fn list_tables_query(&self) -> Option<&'static str> {
        Some(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
    }
}

/// Fallback for engines without a dedicated dialect.
///
/// Every capability reports failure, which sends callers down their
/// generic paths (client-side pagination, reconnect on database switch).
#[derive(Debug, Clone, Copy, Default)]
pub struct Generic;

impl Dialect for Generic {
    fn engine_name(&self) -> &'static str {
        "generic"
    }

    fn switch_database(&self, _name: &str) -> Option<String> {
        None
    }

    fn splice_pagination(&self, _sql: &mut String, offset: u64, limit: u64) -> bool {
        offset == 0 && limit == 0
    }

    fn list_tables_query(&self) -> Option<&'static str> {
        None
    }
}

/// Pick the dialect for an engine name; unknown names get [`Generic`].
pub fn for_engine(engine: &str) -> Box<dyn Dialect> {
    match engine.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" => Box::new(MySql),
        "sqlite" | "sqlite3" => Box::new(Sqlite),
        _ => Box::new(Generic),
    }
}
