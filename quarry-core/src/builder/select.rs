//! SELECT query builder implementation

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::common::{
    Category, IntoColumns, IntoOrderTerms, IntoTableRef, JoinType, SortDirection, TableRef,
    BIND_ORDER,
};
use crate::condition::{evaluate, Fragment, IntoDescriptors};
use crate::{Connector, Error, Result, Value};

#[cfg(windows)]
pub(crate) const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub(crate) const LINE_ENDING: &str = "\n";

/// An entry of the FROM clause
#[derive(Debug, Clone, PartialEq)]
enum FromEntry {
    Table(TableRef),
    Join {
        join_type: JoinType,
        table: TableRef,
        /// ON condition with its values; empty until `on()` is called
        on: Fragment,
    },
}

/// Fluent SELECT builder.
///
/// Clause-setting methods consume and return the builder. `where_` and
/// `having` replace their clause; `and` and `or` extend whichever of ON,
/// WHERE or HAVING was touched last. Misuse (an `on` without a join, `and`
/// before any condition, a bad sort direction, a negative bound) logs a
/// warning and leaves the builder unchanged.
#[derive(Debug, Clone, Default)]
pub struct SelectBuilder {
    select_clause: Option<String>,
    from_entries: Vec<FromEntry>,
    where_clause: String,
    having_clause: String,
    order_by_clause: String,
    offset: u64,
    limit: u64,
    bound_values: BTreeMap<Category, Vec<Value>>,
    using_join: bool,
    /// Index into `from_entries` of the join whose ON was set last
    on_target: Option<usize>,
    last_category: Option<Category>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the select list, replacing any previous one.
    ///
    /// # Examples
    /// ```
    /// use quarry_core::{col, SelectBuilder};
    ///
    /// let query = SelectBuilder::new()
    ///     .select(["id", "name"])
    ///     .from("person");
    /// let sql = query.build().unwrap();
    /// assert_eq!(sql.lines().collect::<Vec<_>>(), ["SELECT id, name", "FROM person"]);
    ///
    /// let query = SelectBuilder::new()
    ///     .select(vec![col("count(*)").as_alias("total")])
    ///     .from("person");
    /// assert!(query.build().unwrap().starts_with("SELECT count(*) AS total"));
    /// ```
    pub fn select<C>(mut self, columns: C) -> Self
    where
        C: IntoColumns,
    {
        self.select_clause = Some(columns.into_select_list());
        self.bound_values.remove(&Category::Select);
        self
    }

    /// Set a raw select list whose `?` placeholders take `values`
    pub fn select_raw<I, V>(mut self, sql: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.select_clause = Some(sql.to_string());
        self.bound_values.insert(
            Category::Select,
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Add a table to the FROM clause: `from("person")` or `from(("person", "p"))`
    pub fn from<T>(mut self, table: T) -> Self
    where
        T: IntoTableRef,
    {
        self.from_entries.push(FromEntry::Table(table.into_table_ref()));
        self
    }

    /// Add a JOIN; attach its condition with [`on`](Self::on)
    pub fn join<T>(mut self, join_type: JoinType, table: T) -> Self
    where
        T: IntoTableRef,
    {
        self.from_entries.push(FromEntry::Join {
            join_type,
            table: table.into_table_ref(),
            on: Fragment::default(),
        });
        self.using_join = true;
        self
    }

    pub fn inner_join<T: IntoTableRef>(self, table: T) -> Self {
        self.join(JoinType::Inner, table)
    }

    pub fn left_join<T: IntoTableRef>(self, table: T) -> Self {
        self.join(JoinType::Left, table)
    }

    pub fn right_join<T: IntoTableRef>(self, table: T) -> Self {
        self.join(JoinType::Right, table)
    }

    pub fn full_join<T: IntoTableRef>(self, table: T) -> Self {
        self.join(JoinType::Full, table)
    }

    /// Set the ON condition of the most recent join
    ///
    /// # Examples
    /// ```
    /// use quarry_core::{raw, SelectBuilder};
    ///
    /// let query = SelectBuilder::new()
    ///     .select("*")
    ///     .from(("person", "p"))
    ///     .left_join(("team", "t"))
    ///     .on(vec![raw("t.id = p.team_id"), raw("AND"), ("t.active", 1).into()]);
    /// let sql = query.build().unwrap();
    /// assert_eq!(
    ///     sql.lines().collect::<Vec<_>>(),
    ///     [
    ///         "SELECT *",
    ///         "FROM person AS p LEFT JOIN team AS t ON t.id = p.team_id AND t.active = ?",
    ///     ]
    /// );
    /// ```
    pub fn on<D>(mut self, descriptors: D) -> Self
    where
        D: IntoDescriptors,
    {
        if !self.using_join {
            warn!("on() called without a preceding join; ignored");
            return self;
        }
        let fragment = evaluate(descriptors.into_descriptors(), Connector::And);
        self.on_target = self
            .from_entries
            .iter()
            .rposition(|entry| matches!(entry, FromEntry::Join { .. }));
        if let Some(on) = self.join_condition() {
            *on = fragment;
        }
        self.sync_on_values();
        self.last_category = Some(Category::On);
        self
    }

    /// Set the WHERE clause, replacing any previous one
    ///
    /// # Examples
    /// ```
    /// use quarry_core::{cond, raw, SelectBuilder};
    ///
    /// let query = SelectBuilder::new()
    ///     .select("*")
    ///     .from("person")
    ///     .where_(vec![cond("id", vec![1, 2, 3]), raw("OR"), cond("name", "A%")]);
    /// let sql = query.build().unwrap();
    /// assert_eq!(
    ///     sql.lines().collect::<Vec<_>>(),
    ///     ["SELECT *", "FROM person", "WHERE id IN (?, ?, ?) OR name LIKE ?"]
    /// );
    /// assert_eq!(query.bound_values().len(), 4);
    /// ```
    pub fn where_<D>(self, descriptors: D) -> Self
    where
        D: IntoDescriptors,
    {
        self.set_condition(Category::Where, descriptors)
    }

    /// Set the HAVING clause, replacing any previous one
    pub fn having<D>(self, descriptors: D) -> Self
    where
        D: IntoDescriptors,
    {
        self.set_condition(Category::Having, descriptors)
    }

    /// AND a condition onto the clause touched last.
    ///
    /// Mixed chains group left to right: `where_(a).or(b).and(c)` renders
    /// `((a) OR (b)) AND (c)`.
    pub fn and<D>(self, descriptors: D) -> Self
    where
        D: IntoDescriptors,
    {
        self.extend_condition(Connector::And, descriptors)
    }

    /// OR a condition onto the clause touched last; grouping is left to
    /// right as for [`and`](Self::and).
    pub fn or<D>(self, descriptors: D) -> Self
    where
        D: IntoDescriptors,
    {
        self.extend_condition(Connector::Or, descriptors)
    }

    /// Replace the ORDER BY clause.
    ///
    /// Entries are `"name"`, `"name asc|desc"` or `("name", "asc|desc")`.
    /// An entry with any other direction is skipped with a warning.
    pub fn order_by<O>(self, columns: O) -> Self
    where
        O: IntoOrderTerms,
    {
        self.set_order(columns, None)
    }

    /// Like [`order_by`](Self::order_by), with DESC for entries that give no direction
    pub fn order_by_desc<O>(self, columns: O) -> Self
    where
        O: IntoOrderTerms,
    {
        self.set_order(columns, Some(SortDirection::Desc))
    }

    /// Accepted for API compatibility; grouping is not implemented and the
    /// columns are ignored.
    pub fn group_by<C>(self, _columns: C) -> Self
    where
        C: IntoColumns,
    {
        debug!("group_by() is not implemented; ignored");
        self
    }

    /// Skip the first `n` rows. Negative values are ignored.
    pub fn offset(mut self, n: i64) -> Self {
        match u64::try_from(n) {
            Ok(n) => self.offset = n,
            Err(_) => warn!(offset = n, "negative offset ignored"),
        }
        self
    }

    /// Return at most `n` rows; zero means no limit. Negative values are ignored.
    pub fn limit(mut self, n: i64) -> Self {
        match u64::try_from(n) {
            Ok(n) => self.limit = n,
            Err(_) => warn!(limit = n, "negative limit ignored"),
        }
        self
    }

    /// Current `(offset, limit)`
    pub fn pagination(&self) -> (u64, u64) {
        (self.offset, self.limit)
    }

    /// Render the query without pagination.
    ///
    /// Clauses appear in the order SELECT, FROM, WHERE, GROUP BY, ORDER BY,
    /// HAVING, one per line, with empty clauses left out.
    pub fn build(&self) -> Result<String> {
        let select = self.select_clause.as_deref().ok_or_else(|| {
            Error::invalid_query("SELECT requires columns to be specified with .select()")
        })?;

        // GROUP BY would sit between WHERE and ORDER BY; group_by() is inert.
        let clauses = [
            format!("SELECT {}", select),
            self.render_from(),
            prefixed("WHERE", &self.where_clause),
            prefixed("ORDER BY", &self.order_by_clause),
            prefixed("HAVING", &self.having_clause),
        ];

        Ok(clauses
            .into_iter()
            .filter(|clause| !clause.is_empty())
            .collect::<Vec<_>>()
            .join(LINE_ENDING))
    }

    /// Values for every placeholder, flattened in [`BIND_ORDER`]
    pub fn bound_values(&self) -> Vec<Value> {
        BIND_ORDER
            .iter()
            .filter_map(|category| self.bound_values.get(category))
            .flatten()
            .cloned()
            .collect()
    }

    /// Values currently bound to one clause category
    pub fn values_for(&self, category: Category) -> &[Value] {
        self.bound_values
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn set_condition<D>(mut self, category: Category, descriptors: D) -> Self
    where
        D: IntoDescriptors,
    {
        let fragment = evaluate(descriptors.into_descriptors(), Connector::And);
        self.put_fragment(category, fragment);
        self.last_category = Some(category);
        self
    }

    fn extend_condition<D>(mut self, connector: Connector, descriptors: D) -> Self
    where
        D: IntoDescriptors,
    {
        let Some(category) = self.last_category else {
            warn!(%connector, "no ON, WHERE or HAVING condition to extend; ignored");
            return self;
        };

        let fragment = evaluate(descriptors.into_descriptors(), Connector::And);
        match category {
            Category::On => {
                if let Some(on) = self.join_condition() {
                    let current = std::mem::take(on);
                    *on = current.combine(connector, fragment);
                }
                self.sync_on_values();
            }
            Category::Where | Category::Having => {
                let current = self.take_fragment(category);
                self.put_fragment(category, current.combine(connector, fragment));
            }
            Category::Select => {
                warn!(%connector, "the select list cannot be extended with conditions; ignored");
            }
        }
        self
    }

    fn take_fragment(&mut self, category: Category) -> Fragment {
        let sql = match category {
            Category::Where => std::mem::take(&mut self.where_clause),
            Category::Having => std::mem::take(&mut self.having_clause),
            Category::Select | Category::On => String::new(),
        };
        let values = self.bound_values.remove(&category).unwrap_or_default();
        Fragment { sql, values }
    }

    fn put_fragment(&mut self, category: Category, fragment: Fragment) {
        match category {
            Category::Where => self.where_clause = fragment.sql,
            Category::Having => self.having_clause = fragment.sql,
            Category::Select | Category::On => return,
        }
        self.bound_values.insert(category, fragment.values);
    }

    // The ON condition `and`/`or` extend: the one `on()` wrote, even if
    // more joins were added since.
    fn join_condition(&mut self) -> Option<&mut Fragment> {
        let index = self.on_target?;
        match self.from_entries.get_mut(index)? {
            FromEntry::Join { on, .. } => Some(on),
            FromEntry::Table(_) => None,
        }
    }

    // ON values live with their join; the category list mirrors them in FROM order.
    fn sync_on_values(&mut self) {
        let values: Vec<Value> = self
            .from_entries
            .iter()
            .filter_map(|entry| match entry {
                FromEntry::Join { on, .. } => Some(on.values.iter().cloned()),
                FromEntry::Table(_) => None,
            })
            .flatten()
            .collect();
        self.bound_values.insert(Category::On, values);
    }

    fn set_order<O>(mut self, columns: O, default: Option<SortDirection>) -> Self
    where
        O: IntoOrderTerms,
    {
        let mut parts = Vec::new();
        for term in columns.into_order_terms() {
            let (column, direction) = term.split();
            if column.is_empty() {
                continue;
            }
            let direction = if direction.is_empty() {
                default
            } else {
                match direction.parse::<SortDirection>() {
                    Ok(direction) => Some(direction),
                    Err(_) => {
                        warn!(%column, %direction, "invalid sort direction; entry skipped");
                        continue;
                    }
                }
            };
            parts.push(match direction {
                Some(direction) => format!("{} {}", column, direction),
                None => column,
            });
        }
        self.order_by_clause = parts.join(", ");
        self
    }

    fn render_from(&self) -> String {
        let mut sql = String::new();
        for entry in &self.from_entries {
            match entry {
                FromEntry::Table(table) => {
                    sql.push_str(if sql.is_empty() { "FROM " } else { ", " });
                    sql.push_str(&table.to_string());
                }
                FromEntry::Join {
                    join_type,
                    table,
                    on,
                } => {
                    if !sql.is_empty() {
                        sql.push(' ');
                    }
                    sql.push_str(&format!("{} JOIN {}", join_type, table));
                    if !on.is_empty() {
                        sql.push_str(" ON ");
                        sql.push_str(&on.sql);
                    }
                }
            }
        }
        sql
    }
}

fn prefixed(keyword: &str, body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("{} {}", keyword, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::common::OrderTerm;
    use crate::{col, cond, raw, select};

    fn lines(sql: &str) -> Vec<&str> {
        sql.split(LINE_ENDING).collect()
    }

    #[test]
    fn test_build_requires_select() {
        let result = SelectBuilder::new().from("person").build();
        assert!(matches!(result, Err(Error::InvalidQuery { .. })));
    }

    #[test]
    fn test_basic_select() {
        let sql = select(["id", "name"]).from("person").build().unwrap();
        assert_eq!(lines(&sql), vec!["SELECT id, name", "FROM person"]);
    }

    #[test]
    fn test_select_replaces_previous_list() {
        let sql = select("a").select("b").from("t").build().unwrap();
        assert_eq!(lines(&sql)[0], "SELECT b");
    }

    #[test]
    fn test_nested_and_aliased_columns() {
        let sql = select(vec![
            col("p.id"),
            vec!["p.first", "p.last"].into(),
            col("t.name").as_alias("team"),
        ])
        .from(("person", "p"))
        .build()
        .unwrap();
        assert_eq!(
            lines(&sql),
            vec![
                "SELECT p.id, p.first, p.last, t.name AS team",
                "FROM person AS p"
            ]
        );
    }

    #[test]
    fn test_idempotent_build() {
        let query = select("*")
            .from("person")
            .where_(("id", vec![1, 2]))
            .order_by("name desc");
        assert_eq!(query.build().unwrap(), query.build().unwrap());
        assert_eq!(query.bound_values(), query.bound_values());
    }

    #[test]
    fn test_clause_ordering() {
        let sql = select("team, count(*)")
            .from("person")
            .having(("team", "red"))
            .order_by("team")
            .group_by("team")
            .where_(("active", 1))
            .build()
            .unwrap();
        assert_eq!(
            lines(&sql),
            vec![
                "SELECT team, count(*)",
                "FROM person",
                "WHERE active = ?",
                "ORDER BY team",
                "HAVING team = ?",
            ]
        );
    }

    #[test]
    fn test_where_replaces_without_connector() {
        let query = select("*").from("t").where_(("a", 1)).where_(("b", 2));
        assert_eq!(lines(&query.build().unwrap())[2], "WHERE b = ?");
        assert_eq!(query.bound_values(), vec![Value::I32(2)]);
    }

    #[test]
    fn test_parenthesis_safety() {
        let query = select("*")
            .from("t")
            .where_(("a", 1))
            .or(("b", 2))
            .and(("c", 3));
        assert_eq!(
            lines(&query.build().unwrap())[2],
            "WHERE ((a = ?) OR (b = ?)) AND (c = ?)"
        );
        assert_eq!(
            query.bound_values(),
            vec![Value::I32(1), Value::I32(2), Value::I32(3)]
        );
    }

    #[test]
    fn test_and_or_follow_last_category() {
        let query = select("*")
            .from("t")
            .where_(("a", 1))
            .having(("h", 9))
            .or(("g", 8));
        let sql = query.build().unwrap();
        assert_eq!(lines(&sql)[2], "WHERE a = ?");
        assert_eq!(lines(&sql)[3], "HAVING (h = ?) OR (g = ?)");
        assert_eq!(query.values_for(Category::Having), &[Value::I32(9), Value::I32(8)]);
    }

    #[test]
    fn test_and_without_category_is_noop() {
        let query = select("*").from("t").and(("a", 1)).or(("b", 2));
        assert_eq!(query.build().unwrap(), select("*").from("t").build().unwrap());
        assert!(query.bound_values().is_empty());
    }

    #[test]
    fn test_on_without_join_is_noop() {
        let query = select("*").from("t").on(("a", 1));
        assert_eq!(query.build().unwrap(), "SELECT *\nFROM t".replace('\n', LINE_ENDING));
        assert!(query.bound_values().is_empty());
        // and() has nothing to extend either
        let query = query.and(("b", 2));
        assert!(query.bound_values().is_empty());
    }

    #[test]
    fn test_joins_and_on_conditions() {
        let query = select("*")
            .from(("person", "p"))
            .left_join(("team", "t"))
            .on(vec![raw("t.id = p.team_id"), raw("AND"), cond("t.kind", "x")])
            .or(("t.kind", "y"))
            .inner_join("badge")
            .full_join("log")
            .on("log.person_id = p.id");
        assert_eq!(
            lines(&query.build().unwrap())[1],
            "FROM person AS p \
             LEFT JOIN team AS t ON (t.id = p.team_id AND t.kind = ?) OR (t.kind = ?) \
             INNER JOIN badge \
             FULL OUTER JOIN log ON log.person_id = p.id"
        );
        assert_eq!(
            query.values_for(Category::On),
            &[Value::from("x"), Value::from("y")]
        );
    }

    #[test]
    fn test_and_extends_the_join_on_was_called_for() {
        let query = select("*")
            .from("a")
            .left_join("b")
            .on(("b.x", 1))
            .inner_join("c")
            .and(("b.y", 2));
        assert_eq!(
            lines(&query.build().unwrap())[1],
            "FROM a LEFT JOIN b ON (b.x = ?) AND (b.y = ?) INNER JOIN c"
        );
        assert_eq!(query.values_for(Category::On), &[Value::I32(1), Value::I32(2)]);

        // a later on() moves the target to the newest join
        let query = query.on(("c.z", 3)).or(("c.w", 4));
        assert_eq!(
            lines(&query.build().unwrap())[1],
            "FROM a LEFT JOIN b ON (b.x = ?) AND (b.y = ?) INNER JOIN c ON (c.z = ?) OR (c.w = ?)"
        );
        assert_eq!(
            query.bound_values(),
            vec![Value::I32(1), Value::I32(2), Value::I32(3), Value::I32(4)]
        );
    }

    #[test]
    fn test_repeated_on_replaces_join_condition() {
        let query = select("*")
            .from("a")
            .join(JoinType::Right, "b")
            .on(("b.x", 1))
            .on(("b.y", 2));
        assert_eq!(
            lines(&query.build().unwrap())[1],
            "FROM a RIGHT JOIN b ON b.y = ?"
        );
        assert_eq!(query.values_for(Category::On), &[Value::I32(2)]);
    }

    #[test]
    fn test_bind_order_is_select_on_where_having() {
        let query = select("*")
            .from("a")
            .having(("h", 4))
            .where_(("w", 3))
            .left_join("b")
            .on(("b.o", 2))
            .select_raw("?, *", [1]);
        assert_eq!(
            query.bound_values(),
            vec![Value::I32(1), Value::I32(2), Value::I32(3), Value::I32(4)]
        );
    }

    #[test]
    fn test_placeholder_parity() {
        let query = select_raw_fixture()
            .where_(vec![cond("id", vec![1, 2, 3]), cond("deleted", None::<i32>)])
            .or(("name", "A_%"))
            .having(("n", 2));
        let sql = query.build().unwrap();
        assert_eq!(sql.matches('?').count(), query.bound_values().len());
        assert_eq!(query.values_for(Category::Where).len(), 4);
    }

    fn select_raw_fixture() -> SelectBuilder {
        select("*")
            .select_raw("id, ? AS tag", ["t"])
            .from("person")
            .left_join("team")
            .on(vec![cond("team.id", 1)])
    }

    #[test]
    fn test_order_by_forms() {
        let sql = select("*")
            .from("t")
            .order_by(vec![
                OrderTerm::from("a"),
                OrderTerm::from("b DESC"),
                OrderTerm::from(("c", "asc")),
            ])
            .build()
            .unwrap();
        assert_eq!(lines(&sql)[2], "ORDER BY a, b DESC, c ASC");
    }

    #[test]
    fn test_order_by_desc_defaults() {
        let sql = select("*")
            .from("t")
            .order_by_desc(["a", "b asc"])
            .build()
            .unwrap();
        assert_eq!(lines(&sql)[2], "ORDER BY a DESC, b ASC");
    }

    #[test]
    fn test_invalid_direction_skips_entry() {
        let sql = select("*")
            .from("t")
            .order_by(["a sideways", "b"])
            .build()
            .unwrap();
        assert_eq!(lines(&sql)[2], "ORDER BY b");
    }

    #[test]
    fn test_order_by_replaces() {
        let sql = select("*")
            .from("t")
            .order_by("a")
            .order_by(("b", "desc"))
            .build()
            .unwrap();
        assert_eq!(lines(&sql)[2], "ORDER BY b DESC");
    }

    #[test]
    fn test_negative_bounds_are_ignored() {
        let query = select("*").from("t").offset(3).limit(5).offset(-1).limit(-7);
        assert_eq!(query.pagination(), (3, 5));
    }

    #[test]
    fn test_pagination_not_in_build() {
        let query = select("*").from("t").offset(3).limit(5);
        assert!(!query.build().unwrap().contains("LIMIT"));
    }
}
