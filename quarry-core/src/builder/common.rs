//! Types shared by the SELECT builder and its terminal operations

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Clause categories that own bound values
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Select,
    On,
    Where,
    Having,
}

/// Order in which per-category values are flattened for execution.
///
/// This is fixed and does not follow where each category's placeholders
/// appear in the SQL text. It lines up for the clauses this builder emits
/// because ON conditions render inside FROM, ahead of WHERE, and HAVING is
/// always last.
pub const BIND_ORDER: [Category; 4] = [
    Category::Select,
    Category::On,
    Category::Where,
    Category::Having,
];

/// JOIN types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL OUTER"),
            JoinType::Cross => write!(f, "CROSS"),
        }
    }
}

/// Sort direction for ORDER BY entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(Error::invalid_query(format!("invalid sort direction '{}'", s)))
        }
    }
}

/// One entry of a select list
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSpec {
    /// Column name or expression, used verbatim (may contain its own `AS`)
    Raw(String),
    /// `expr AS alias`
    Aliased { expr: String, alias: String },
    /// Nested list, flattened in place
    List(Vec<ColumnSpec>),
}

impl ColumnSpec {
    pub fn column(name: &str) -> Self {
        ColumnSpec::Raw(name.to_string())
    }

    /// Add alias to this column. Lists cannot carry an alias and are returned as-is.
    pub fn as_alias(self, alias: &str) -> Self {
        match self {
            ColumnSpec::Raw(expr) | ColumnSpec::Aliased { expr, .. } => ColumnSpec::Aliased {
                expr,
                alias: alias.to_string(),
            },
            list @ ColumnSpec::List(_) => list,
        }
    }

    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            ColumnSpec::Raw(expr) => out.push(expr),
            ColumnSpec::Aliased { expr, alias } => out.push(format!("{} AS {}", expr, alias)),
            ColumnSpec::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<&str> for ColumnSpec {
    fn from(name: &str) -> Self {
        ColumnSpec::column(name)
    }
}

impl From<String> for ColumnSpec {
    fn from(name: String) -> Self {
        ColumnSpec::Raw(name)
    }
}

impl<T> From<Vec<T>> for ColumnSpec
where
    T: Into<ColumnSpec>,
{
    fn from(items: Vec<T>) -> Self {
        ColumnSpec::List(items.into_iter().map(Into::into).collect())
    }
}

fn render_columns(specs: Vec<ColumnSpec>) -> String {
    let mut columns = Vec::new();
    for spec in specs {
        spec.flatten_into(&mut columns);
    }
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    }
}

/// Trait to convert various types into a rendered select list
pub trait IntoColumns {
    fn into_select_list(self) -> String;
}

// A plain string is the whole select list: select("id, name AS n")
impl IntoColumns for &str {
    fn into_select_list(self) -> String {
        self.to_string()
    }
}

impl IntoColumns for String {
    fn into_select_list(self) -> String {
        self
    }
}

impl IntoColumns for ColumnSpec {
    fn into_select_list(self) -> String {
        render_columns(vec![self])
    }
}

impl<T> IntoColumns for Vec<T>
where
    T: Into<ColumnSpec>,
{
    fn into_select_list(self) -> String {
        render_columns(self.into_iter().map(Into::into).collect())
    }
}

impl<T, const N: usize> IntoColumns for [T; N]
where
    T: Into<ColumnSpec>,
{
    fn into_select_list(self) -> String {
        render_columns(self.into_iter().map(Into::into).collect())
    }
}

/// A table with an optional alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.table, alias),
            None => f.write_str(&self.table),
        }
    }
}

pub trait IntoTableRef {
    fn into_table_ref(self) -> TableRef;
}

impl IntoTableRef for &str {
    fn into_table_ref(self) -> TableRef {
        TableRef {
            table: self.to_string(),
            alias: None,
        }
    }
}

impl IntoTableRef for String {
    fn into_table_ref(self) -> TableRef {
        TableRef {
            table: self,
            alias: None,
        }
    }
}

// (table, alias)
impl IntoTableRef for (&str, &str) {
    fn into_table_ref(self) -> TableRef {
        TableRef {
            table: self.0.to_string(),
            alias: Some(self.1.to_string()),
        }
    }
}

/// One ORDER BY argument before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTerm {
    /// `"name"` or `"name direction"`
    Spec(String),
    /// `(name, direction)`
    Pair(String, String),
}

impl OrderTerm {
    /// Split into column and raw direction token (empty when absent).
    pub(crate) fn split(self) -> (String, String) {
        match self {
            OrderTerm::Pair(column, direction) => {
                (column.trim().to_string(), direction.trim().to_string())
            }
            OrderTerm::Spec(spec) => match spec.trim().rsplit_once(char::is_whitespace) {
                Some((column, direction)) => {
                    (column.trim().to_string(), direction.trim().to_string())
                }
                None => (spec.trim().to_string(), String::new()),
            },
        }
    }
}

impl From<&str> for OrderTerm {
    fn from(spec: &str) -> Self {
        OrderTerm::Spec(spec.to_string())
    }
}

impl From<String> for OrderTerm {
    fn from(spec: String) -> Self {
        OrderTerm::Spec(spec)
    }
}

impl From<(&str, &str)> for OrderTerm {
    fn from((column, direction): (&str, &str)) -> Self {
        OrderTerm::Pair(column.to_string(), direction.to_string())
    }
}

pub trait IntoOrderTerms {
    fn into_order_terms(self) -> Vec<OrderTerm>;
}

impl IntoOrderTerms for &str {
    fn into_order_terms(self) -> Vec<OrderTerm> {
        vec![self.into()]
    }
}

impl IntoOrderTerms for String {
    fn into_order_terms(self) -> Vec<OrderTerm> {
        vec![self.into()]
    }
}

impl IntoOrderTerms for (&str, &str) {
    fn into_order_terms(self) -> Vec<OrderTerm> {
        vec![self.into()]
    }
}

impl<T> IntoOrderTerms for Vec<T>
where
    T: Into<OrderTerm>,
{
    fn into_order_terms(self) -> Vec<OrderTerm> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T, const N: usize> IntoOrderTerms for [T; N]
where
    T: Into<OrderTerm>,
{
    fn into_order_terms(self) -> Vec<OrderTerm> {
        self.into_iter().map(Into::into).collect()
    }
}
