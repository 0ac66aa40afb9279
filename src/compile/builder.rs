//! Fluent predicate builder.
//!
//! Every method appends a predicate with a connector. An `And` connector
//! extends the current conjunctive run; an `Or` connector starts a new run.
//! A finished group is the disjunction of its runs, which is how a flat
//! `a OR b AND c` reads under SQL precedence.

use super::ast::{BoolExpr, Column, Comparison, SqlValue};

/// How a predicate joins the ones before it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Connector {
    /// Extend the current conjunctive run.
    And,
    /// Start a new run.
    Or,
}

/// Builder for one predicate group.
#[derive(Debug, Default)]
pub struct PredicateBuilder {
    runs: Vec<Vec<BoolExpr>>,
}

impl PredicateBuilder {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been added yet.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Appends an arbitrary expression.
    pub fn push(&mut self, connector: Connector, expr: impl Into<BoolExpr>) -> &mut Self {
        let expr = expr.into();
        match (connector, self.runs.last_mut()) {
            (Connector::And, Some(run)) => run.push(expr),
            _ => self.runs.push(vec![expr]),
        }
        self
    }

    /// `AND column = value`.
    pub fn eq(&mut self, column: impl Into<Column>, value: impl Into<SqlValue>) -> &mut Self {
        self.push(
            Connector::And,
            Comparison::Eq {
                column: column.into(),
                value: value.into(),
            },
        )
    }

    /// `OR column = value`.
    pub fn or_eq(&mut self, column: impl Into<Column>, value: impl Into<SqlValue>) -> &mut Self {
        self.push(
            Connector::Or,
            Comparison::Eq {
                column: column.into(),
                value: value.into(),
            },
        )
    }

    /// `AND column >= value`.
    pub fn ge(&mut self, column: impl Into<Column>, value: impl Into<SqlValue>) -> &mut Self {
        self.push(
            Connector::And,
            Comparison::Ge {
                column: column.into(),
                value: value.into(),
            },
        )
    }

    /// `AND column BETWEEN low AND high`.
    pub fn between<L, H>(&mut self, column: impl Into<Column>, low: L, high: H) -> &mut Self
    where
        L: Into<SqlValue>,
        H: Into<SqlValue>,
    {
        self.push(
            Connector::And,
            Comparison::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
            },
        )
    }

    /// `AND column IN (...)`; an empty list matches nothing.
    pub fn in_list<I, V>(&mut self, column: impl Into<Column>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.push(
            Connector::And,
            Comparison::In {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// `AND column NOT IN (...)`; skipped for an empty list.
    pub fn not_in<I, V>(&mut self, column: impl Into<Column>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self;
        }
        self.push(
            Connector::And,
            Comparison::NotIn {
                column: column.into(),
                values,
            },
        )
    }

    /// `AND column IS NULL`.
    pub fn is_null(&mut self, column: impl Into<Column>) -> &mut Self {
        self.push(
            Connector::And,
            Comparison::IsNull {
                column: column.into(),
            },
        )
    }

    /// `OR column IS NULL`.
    pub fn or_is_null(&mut self, column: impl Into<Column>) -> &mut Self {
        self.push(
            Connector::Or,
            Comparison::IsNull {
                column: column.into(),
            },
        )
    }

    /// `AND column IS NOT NULL`.
    pub fn is_not_null(&mut self, column: impl Into<Column>) -> &mut Self {
        self.push(
            Connector::And,
            Comparison::IsNotNull {
                column: column.into(),
            },
        )
    }

    /// `OR column IS NOT NULL`.
    pub fn or_is_not_null(&mut self, column: impl Into<Column>) -> &mut Self {
        self.push(
            Connector::Or,
            Comparison::IsNotNull {
                column: column.into(),
            },
        )
    }

    /// Nests a group joined with `AND`. Empty groups are dropped.
    pub fn and_group<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        self.group(Connector::And, build)
    }

    /// Nests a group joined with `OR`. Empty groups are dropped.
    pub fn or_group<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        self.group(Connector::Or, build)
    }

    fn group<F>(&mut self, connector: Connector, build: F) -> &mut Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        let mut nested = PredicateBuilder::new();
        build(&mut nested);
        match nested.finish() {
            Some(expr) => self.push(connector, expr),
            None => self,
        }
    }

    /// Collapses the group; `None` when nothing was added.
    pub fn finish(self) -> Option<BoolExpr> {
        let mut runs: Vec<BoolExpr> = self
            .runs
            .into_iter()
            .map(|mut run| {
                if run.len() == 1 {
                    run.remove(0)
                } else {
                    BoolExpr::And(run)
                }
            })
            .collect();
        match runs.len() {
            0 => None,
            1 => runs.pop(),
            _ => Some(BoolExpr::Or(runs)),
        }
    }
}
