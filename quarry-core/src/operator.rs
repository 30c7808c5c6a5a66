//! SQL operators and connectors emitted by the condition evaluator

use std::fmt::{self, Display};

/// Comparison operator placed between a column and its placeholder(s)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator(&'static str);

impl Operator {
    pub const EQ: Self = Operator("=");
    pub const LIKE: Self = Operator("LIKE");
    pub const IN: Self = Operator("IN");
    pub const IS_NULL: Self = Operator("IS NULL");

    /// Get the string representation of the operator
    pub fn as_str(&self) -> &str {
        self.0
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Boolean connector joining two condition fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

impl Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
