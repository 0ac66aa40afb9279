//! Predicate tree produced by the filter compiler.
//!
//! Column references are SQL fragments handed out by a
//! [`ColumnMapper`](super::ColumnMapper): either a plain (possibly qualified)
//! column or a computed expression. Literal values always travel as bound
//! parameters.

use std::borrow::Cow;

use serde::Serialize;

/// Column name or computed expression.
pub type Column = Cow<'static, str>;

/// Literal bound as a query parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for SqlValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Leaf comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Comparison {
    /// `column = value`.
    Eq {
        /// Compared column.
        column: Column,
        /// Expected value.
        value: SqlValue,
    },
    /// `column >= value`.
    Ge {
        /// Compared column.
        column: Column,
        /// Lower bound.
        value: SqlValue,
    },
    /// `column BETWEEN low AND high` (inclusive).
    Between {
        /// Compared column.
        column: Column,
        /// Inclusive lower bound.
        low: SqlValue,
        /// Inclusive upper bound.
        high: SqlValue,
    },
    /// `column IN (...)`.
    In {
        /// Compared column.
        column: Column,
        /// Accepted values.
        values: Vec<SqlValue>,
    },
    /// `column NOT IN (...)`.
    NotIn {
        /// Compared column.
        column: Column,
        /// Rejected values.
        values: Vec<SqlValue>,
    },
    /// `column IS NULL`.
    IsNull {
        /// Tested column.
        column: Column,
    },
    /// `column IS NOT NULL`.
    IsNotNull {
        /// Tested column.
        column: Column,
    },
    /// Backend specific fragment with `?` placeholders.
    Custom {
        /// SQL text.
        sql: String,
        /// Parameters, in placeholder order.
        params: Vec<SqlValue>,
    },
}

/// Boolean combination of comparisons.
#[derive(Clone, Debug, PartialEq)]
pub enum BoolExpr {
    /// Single comparison.
    Cmp(Comparison),
    /// Every child holds. Empty means true.
    And(Vec<BoolExpr>),
    /// At least one child holds. Empty means false.
    Or(Vec<BoolExpr>),
    /// Negation.
    Not(Box<BoolExpr>),
}

impl From<Comparison> for BoolExpr {
    fn from(cmp: Comparison) -> Self {
        BoolExpr::Cmp(cmp)
    }
}

impl BoolExpr {
    /// Visits every comparison in the tree, depth first.
    pub fn comparisons(&self) -> Vec<&Comparison> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            BoolExpr::Cmp(cmp) => out.push(cmp),
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                for child in children {
                    child.collect(out);
                }
            }
            BoolExpr::Not(inner) => inner.collect(out),
        }
    }
}
