//! Rendering of compiled queries into parameterised SQLite SQL.

use std::fmt::Write as _;

use super::ast::{BoolExpr, Comparison, SqlValue};

/// `SELECT` statement in structured form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectQuery {
    /// Select list.
    pub projection: String,
    /// `FROM` clause, joins included.
    pub from: String,
    /// `WHERE` predicate.
    pub predicate: Option<BoolExpr>,
    /// `GROUP BY` columns.
    pub group_by: Vec<String>,
    /// `ORDER BY` terms.
    pub order_by: Vec<String>,
    /// Row cap.
    pub limit: Option<usize>,
}

/// SQL text with its positional parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedSql {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<SqlValue>,
}

impl SelectQuery {
    /// Renders the statement.
    pub fn render(&self) -> RenderedSql {
        let mut sql = format!("SELECT {} FROM {}", self.projection, self.from);
        let mut params = Vec::new();
        if let Some(predicate) = &self.predicate {
            sql.push_str(" WHERE ");
            render_expr(predicate, &mut sql, &mut params);
        }
        if !self.group_by.is_empty() {
            let _ = write!(sql, " GROUP BY {}", self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            let _ = write!(sql, " ORDER BY {}", self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::from(limit));
        }
        RenderedSql { sql, params }
    }
}

fn render_expr(expr: &BoolExpr, sql: &mut String, params: &mut Vec<SqlValue>) {
    match expr {
        BoolExpr::Cmp(cmp) => render_cmp(cmp, sql, params),
        BoolExpr::And(children) => render_list(children, " AND ", "1", sql, params),
        BoolExpr::Or(children) => render_list(children, " OR ", "0", sql, params),
        BoolExpr::Not(inner) => {
            sql.push_str("NOT (");
            render_expr(inner, sql, params);
            sql.push(')');
        }
    }
}

fn render_list(
    children: &[BoolExpr],
    separator: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<SqlValue>,
) {
    if children.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            sql.push_str(separator);
        }
        render_expr(child, sql, params);
    }
    sql.push(')');
}

fn render_cmp(cmp: &Comparison, sql: &mut String, params: &mut Vec<SqlValue>) {
    match cmp {
        Comparison::Eq { column, value } => {
            let _ = write!(sql, "{column} = ?");
            params.push(value.clone());
        }
        Comparison::Ge { column, value } => {
            let _ = write!(sql, "{column} >= ?");
            params.push(value.clone());
        }
        Comparison::Between { column, low, high } => {
            let _ = write!(sql, "{column} BETWEEN ? AND ?");
            params.push(low.clone());
            params.push(high.clone());
        }
        Comparison::In { column, values } => render_in(column, "IN", values, sql, params),
        Comparison::NotIn { column, values } => {
            render_in(column, "NOT IN", values, sql, params)
        }
        Comparison::IsNull { column } => {
            let _ = write!(sql, "{column} IS NULL");
        }
        Comparison::IsNotNull { column } => {
            let _ = write!(sql, "{column} IS NOT NULL");
        }
        Comparison::Custom { sql: fragment, params: bound } => {
            sql.push_str(fragment);
            params.extend(bound.iter().cloned());
        }
    }
}

fn render_in(
    column: &str,
    op: &str,
    values: &[SqlValue],
    sql: &mut String,
    params: &mut Vec<SqlValue>,
) {
    let placeholders = vec!["?"; values.len()].join(", ");
    let _ = write!(sql, "{column} {op} ({placeholders})");
    params.extend(values.iter().cloned());
}
