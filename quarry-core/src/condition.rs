//! Condition evaluation for ON, WHERE and HAVING clauses
//!
//! Callers describe a condition as a sequence of [`Descriptor`]s. A literal
//! descriptor is copied into the SQL verbatim (`"or"`, `"NOT"`, `"age > 18"`),
//! while column descriptors render as `column <op> ?` with their values
//! collected in left-to-right order. Consecutive column descriptors are joined
//! with the evaluator's connector unless a literal sits between them.

use crate::{Connector, Operator, Value};

/// One element of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// Raw SQL token inserted as-is
    Literal(String),
    /// `column = ?`
    Equals { column: String, value: Value },
    /// `column IN (?, ?, ...)`
    In { column: String, values: Vec<Value> },
    /// `column IS NULL`
    IsNull { column: String },
    /// `column LIKE ?`
    Like { column: String, pattern: Value },
}

impl Descriptor {
    /// Classify a `{column: value}` pair.
    ///
    /// Lists become IN tests, null becomes IS NULL, strings containing `%` or
    /// `_` become LIKE, everything else is an equality test.
    pub fn classify(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        match value.into() {
            Value::Array(values) => Descriptor::In { column, values },
            Value::Null => Descriptor::IsNull { column },
            value if value.is_pattern() => Descriptor::Like {
                column,
                pattern: value,
            },
            value => Descriptor::Equals { column, value },
        }
    }

    /// A raw SQL token
    pub fn literal(text: impl Into<String>) -> Self {
        Descriptor::Literal(text.into())
    }

    fn render(self, fragment: &mut Fragment) {
        let sql = match self {
            Descriptor::Literal(text) => text,
            Descriptor::Equals { column, value } => {
                fragment.values.push(value);
                format!("{} {} ?", column, Operator::EQ)
            }
            Descriptor::Like { column, pattern } => {
                fragment.values.push(pattern);
                format!("{} {} ?", column, Operator::LIKE)
            }
            Descriptor::IsNull { column } => format!("{} {}", column, Operator::IS_NULL),
            Descriptor::In { column, values } => {
                let mut flat = Vec::with_capacity(values.len());
                flatten_into(values, &mut flat);
                let placeholders = if flat.is_empty() {
                    // IN () is not valid SQL; IN (NULL) is, and matches nothing.
                    "NULL".to_string()
                } else {
                    vec!["?"; flat.len()].join(", ")
                };
                fragment.values.extend(flat);
                format!("{} {} ({})", column, Operator::IN, placeholders)
            }
        };
        fragment.push_token(&sql);
    }
}

fn flatten_into(values: Vec<Value>, out: &mut Vec<Value>) {
    for value in values {
        match value {
            Value::Array(inner) => flatten_into(inner, out),
            other => out.push(other),
        }
    }
}

/// Shorthand for [`Descriptor::classify`]
pub fn cond(column: &str, value: impl Into<Value>) -> Descriptor {
    Descriptor::classify(column, value)
}

/// Shorthand for [`Descriptor::literal`]
pub fn raw(text: &str) -> Descriptor {
    Descriptor::literal(text)
}

impl From<&str> for Descriptor {
    fn from(text: &str) -> Self {
        Descriptor::literal(text)
    }
}

impl From<String> for Descriptor {
    fn from(text: String) -> Self {
        Descriptor::Literal(text)
    }
}

impl<T> From<(&str, T)> for Descriptor
where
    T: Into<Value>,
{
    fn from((column, value): (&str, T)) -> Self {
        Descriptor::classify(column, value)
    }
}

/// Types accepted by `on`, `where_`, `having`, `and` and `or`
pub trait IntoDescriptors {
    fn into_descriptors(self) -> Vec<Descriptor>;
}

impl IntoDescriptors for Descriptor {
    fn into_descriptors(self) -> Vec<Descriptor> {
        vec![self]
    }
}

// A bare string is a raw SQL condition: where_("age > 18")
impl IntoDescriptors for &str {
    fn into_descriptors(self) -> Vec<Descriptor> {
        vec![Descriptor::literal(self)]
    }
}

// Shorthand column/value pair: where_(("age", 18))
impl<T> IntoDescriptors for (&str, T)
where
    T: Into<Value>,
{
    fn into_descriptors(self) -> Vec<Descriptor> {
        vec![self.into()]
    }
}

impl<D> IntoDescriptors for Vec<D>
where
    D: Into<Descriptor>,
{
    fn into_descriptors(self) -> Vec<Descriptor> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<D, const N: usize> IntoDescriptors for [D; N]
where
    D: Into<Descriptor>,
{
    fn into_descriptors(self) -> Vec<Descriptor> {
        self.into_iter().map(Into::into).collect()
    }
}

/// A rendered condition together with the values for its placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub values: Vec<Value>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    fn push_token(&mut self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(token);
    }

    /// Join `other` onto this fragment, parenthesising both sides.
    ///
    /// Every call wraps everything accumulated so far, so a chain of mixed
    /// connectors groups strictly left to right.
    pub fn combine(self, connector: Connector, other: Fragment) -> Fragment {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let mut values = self.values;
        values.extend(other.values);
        Fragment {
            sql: format!("({}) {} ({})", self.sql, connector, other.sql),
            values,
        }
    }
}

/// Evaluate descriptors into one fragment.
///
/// `connector` is placed between consecutive column descriptors. A literal
/// suppresses it for the descriptor that follows, so `[a, "OR", b]` renders
/// `a OR b` rather than `a OR AND b`.
pub fn evaluate(descriptors: Vec<Descriptor>, connector: Connector) -> Fragment {
    let mut fragment = Fragment::default();
    let mut connect_next = false;

    for descriptor in descriptors {
        if let Descriptor::Literal(text) = &descriptor {
            if text.trim().is_empty() {
                continue;
            }
            descriptor.render(&mut fragment);
            connect_next = false;
            continue;
        }

        if connect_next {
            fragment.push_token(connector.as_str());
        }
        descriptor.render(&mut fragment);
        connect_next = true;
    }

    fragment
}
