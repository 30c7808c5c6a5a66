//! Terminal operations: run a [`SelectBuilder`] against an [`Engine`]
//!
//! Every operation returns `None` on failure and leaves the reason in
//! [`Engine::last_error`]. The builder itself is borrowed, so one builder can
//! be executed any number of times.

use std::future::Future;
use std::panic::Location;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::select::SelectBuilder;
use crate::executor::{Engine, Row};
use crate::{Error, Result};

/// Rows returned by a terminal operation.
///
/// An operation that asked for exactly one row and found it yields
/// [`Fetched::One`]; everything else is [`Fetched::Many`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Fetched {
    One(Row),
    Many(Vec<Row>),
}

impl Fetched {
    pub(crate) fn from_rows(mut rows: Vec<Row>, requested: u64) -> Self {
        if requested == 1 && rows.len() == 1 {
            if let Some(row) = rows.pop() {
                return Fetched::One(row);
            }
        }
        Fetched::Many(rows)
    }

    pub fn len(&self) -> usize {
        match self {
            Fetched::One(_) => 1,
            Fetched::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single row, if this result was unwrapped
    pub fn as_one(&self) -> Option<&Row> {
        match self {
            Fetched::One(row) => Some(row),
            Fetched::Many(_) => None,
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Fetched::One(row) => vec![row],
            Fetched::Many(rows) => rows,
        }
    }

    /// Convert every row into `T` by column name
    pub fn deserialize<T>(self) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.into_rows()
            .into_iter()
            .map(|row| serde_json::from_value(serde_json::Value::Object(row)).map_err(Error::from))
            .collect()
    }
}

/// Result of [`SelectBuilder::rand`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RandomPick {
    /// Zero-based position of the chosen row in the unpaginated result
    pub index: u64,
    pub rows: Fetched,
}

impl SelectBuilder {
    /// Execute with the builder's own offset and limit.
    ///
    /// When the engine's dialect cannot express the bounds in SQL the engine
    /// skips and truncates rows while reading them. That still transfers
    /// every skipped row, so large offsets are slow on such engines.
    #[track_caller]
    pub fn get<'a>(&'a self, engine: &'a mut Engine) -> impl Future<Output = Option<Fetched>> + 'a {
        let caller = Location::caller();
        async move {
            let (offset, limit) = self.pagination();
            let rows = self.paginated(engine, offset, limit, caller).await?;
            Some(Fetched::from_rows(rows, limit))
        }
    }

    /// Execute ignoring offset and limit
    #[track_caller]
    pub fn all<'a>(&'a self, engine: &'a mut Engine) -> impl Future<Output = Option<Vec<Row>>> + 'a {
        let caller = Location::caller();
        self.paginated(engine, 0, 0, caller)
    }

    /// Number of rows the query matches, ignoring offset and limit.
    ///
    /// Runs `SELECT count(*) FROM (<query>) AS t`.
    #[track_caller]
    pub fn count<'a>(&'a self, engine: &'a mut Engine) -> impl Future<Output = Option<u64>> + 'a {
        let caller = Location::caller();
        self.count_at(engine, caller)
    }

    /// The first `n` rows (at least one). `first(1)` yields [`Fetched::One`]
    /// when a row exists.
    #[track_caller]
    pub fn first<'a>(
        &'a self,
        engine: &'a mut Engine,
        n: u64,
    ) -> impl Future<Output = Option<Fetched>> + 'a {
        let caller = Location::caller();
        async move {
            let n = n.max(1);
            let rows = self.paginated(engine, 0, n, caller).await?;
            Some(Fetched::from_rows(rows, n))
        }
    }

    /// The last `n` rows (at least one), in query order.
    ///
    /// Counts first and then fetches from offset `total - n`. The two
    /// statements are not atomic: rows written between them can shift the
    /// window. A query matching nothing yields an empty result.
    #[track_caller]
    pub fn last<'a>(
        &'a self,
        engine: &'a mut Engine,
        n: u64,
    ) -> impl Future<Output = Option<Fetched>> + 'a {
        let caller = Location::caller();
        async move {
            let n = n.max(1);
            let total = self.count_at(engine, caller).await?;
            if total == 0 {
                return Some(Fetched::Many(Vec::new()));
            }
            let rows = self
                .paginated(engine, total.saturating_sub(n), n, caller)
                .await?;
            Some(Fetched::from_rows(rows, n))
        }
    }

    /// The single row at zero-based position `n`
    #[track_caller]
    pub fn fetch<'a>(
        &'a self,
        engine: &'a mut Engine,
        n: u64,
    ) -> impl Future<Output = Option<Fetched>> + 'a {
        let caller = Location::caller();
        self.fetch_at(engine, n, caller)
    }

    /// One uniformly chosen row, with its position.
    ///
    /// Counts first and then fetches the chosen position; like
    /// [`last`](Self::last) the two statements are not atomic. Returns
    /// `None` when the query matches nothing.
    #[track_caller]
    pub fn rand<'a>(&'a self, engine: &'a mut Engine) -> impl Future<Output = Option<RandomPick>> + 'a {
        let caller = Location::caller();
        async move {
            let total = self.count_at(engine, caller).await?;
            if total == 0 {
                debug!("rand() on an empty result");
                return None;
            }
            let index = rand::thread_rng().gen_range(0..total);
            let rows = self.fetch_at(engine, index, caller).await?;
            Some(RandomPick { index, rows })
        }
    }

    async fn fetch_at(
        &self,
        engine: &mut Engine,
        n: u64,
        caller: &'static Location<'static>,
    ) -> Option<Fetched> {
        let rows = self.paginated(engine, n, 1, caller).await?;
        Some(Fetched::from_rows(rows, 1))
    }

    async fn count_at(&self, engine: &mut Engine, caller: &'static Location<'static>) -> Option<u64> {
        let inner = match self.build() {
            Ok(sql) => sql,
            Err(err) => {
                engine.fail(err);
                return None;
            }
        };
        let sql = format!("SELECT count(*) FROM ({}) AS t", inner);
        let rows = engine
            .query_at(&sql, &self.bound_values(), 0, 0, caller)
            .await?;

        let total = rows
            .first()
            .and_then(|row| row.values().next())
            .and_then(|value| match value {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => s.parse().ok(),
                _ => None,
            });
        if total.is_none() {
            engine.fail(Error::invalid_query("count query returned no integer"));
        }
        total
    }

    async fn paginated(
        &self,
        engine: &mut Engine,
        offset: u64,
        limit: u64,
        caller: &'static Location<'static>,
    ) -> Option<Vec<Row>> {
        let mut sql = match self.build() {
            Ok(sql) => sql,
            Err(err) => {
                engine.fail(err);
                return None;
            }
        };
        let values = self.bound_values();

        if engine.dialect().splice_pagination(&mut sql, offset, limit) {
            engine.query_at(&sql, &values, 0, 0, caller).await
        } else {
            debug!(
                dialect = engine.dialect().engine_name(),
                offset, limit, "paginating while reading rows"
            );
            engine.query_at(&sql, &values, offset, limit, caller).await
        }
    }
}
