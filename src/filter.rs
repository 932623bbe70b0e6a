//! Declarative row filters evaluated against a [`Table`].
//!
//! Filters are predicates producing a boolean row mask. A sequence of filters
//! combines conjunctively; an empty sequence keeps every row. Choosers and
//! alternatives are filtered independently, so a filter only ever sees one
//! table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::{Column, Table};
use crate::error::{LcmError, Result};

/// A boolean predicate over the rows of a table.
pub trait RowFilter {
    /// Returns one flag per row of `table`, true for rows to keep.
    fn evaluate(&self, table: &Table) -> Result<Vec<bool>>;
}

/// Comparison operator of a [`FilterExpression`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// Two-character operators come first so `<=` is not read as `<`.
const OPERATORS: [(&str, Comparison); 6] = [
    ("==", Comparison::Eq),
    ("!=", Comparison::Ne),
    ("<=", Comparison::Le),
    (">=", Comparison::Ge),
    ("<", Comparison::Lt),
    (">", Comparison::Gt),
];

impl Comparison {
    fn holds<T: PartialOrd + ?Sized>(self, left: &T, right: &T) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
        }
    }
}

/// Right-hand side of a [`FilterExpression`].
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

/// A `column <op> literal` predicate such as `var2 != 14` or `zone == 'north'`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FilterExpression {
    source: String,
    column: String,
    comparison: Comparison,
    literal: Literal,
}

impl FilterExpression {
    /// Parses a single expression.
    pub fn parse(expression: &str) -> Result<Self> {
        expression.parse()
    }

    /// The expression as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column the expression reads.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    fn error(&self, reason: impl Into<String>) -> LcmError {
        LcmError::invalid_expression(self.source.clone(), reason)
    }
}

impl FromStr for FilterExpression {
    type Err = LcmError;

    fn from_str(expression: &str) -> Result<Self> {
        let invalid = |reason: &str| LcmError::invalid_expression(expression, reason);

        let start = expression
            .find(|c: char| matches!(c, '=' | '!' | '<' | '>'))
            .ok_or_else(|| invalid("expected a comparison operator"))?;
        let rest = &expression[start..];
        let (symbol, comparison) = OPERATORS
            .iter()
            .find(|(symbol, _)| rest.starts_with(symbol))
            .copied()
            .ok_or_else(|| invalid("expected one of ==, !=, <, <=, >, >="))?;

        let column = expression[..start].trim();
        if column.is_empty() {
            return Err(invalid("missing column name"));
        }
        if !column
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return Err(invalid("column name may only hold letters, digits, `_` or `.`"));
        }

        let raw = rest[symbol.len()..].trim();
        let literal = parse_literal(raw).ok_or_else(|| invalid("expected a number or quoted text"))?;

        Ok(Self {
            source: expression.trim().to_string(),
            column: column.to_string(),
            comparison,
            literal,
        })
    }
}

fn parse_literal(raw: &str) -> Option<Literal> {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Some(Literal::Text(raw[1..raw.len() - 1].to_string()));
        }
    }
    raw.parse::<f64>().ok().map(Literal::Number)
}

impl RowFilter for FilterExpression {
    fn evaluate(&self, table: &Table) -> Result<Vec<bool>> {
        let column = table
            .column(&self.column)
            .ok_or_else(|| self.error(format!("unknown column `{}`", self.column)))?;
        match (column, &self.literal) {
            (Column::Numeric(values), Literal::Number(target)) => Ok(values
                .iter()
                .map(|value| self.comparison.holds(value, target))
                .collect()),
            (Column::Text(values), Literal::Text(target)) => Ok(values
                .iter()
                .map(|value| self.comparison.holds(value.as_str(), target.as_str()))
                .collect()),
            (column, _) => Err(self.error(format!(
                "cannot compare {} column `{}` with this literal",
                column.kind(),
                self.column
            ))),
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<FilterExpression> for String {
    fn from(value: FilterExpression) -> Self {
        value.source
    }
}

impl TryFrom<String> for FilterExpression {
    type Error = LcmError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Parses a list of expressions, failing on the first malformed one.
pub fn parse_filters<S: AsRef<str>>(expressions: &[S]) -> Result<Vec<FilterExpression>> {
    expressions
        .iter()
        .map(|expression| expression.as_ref().parse())
        .collect()
}

/// Conjunction of every filter's mask; all-true when `filters` is empty.
pub fn evaluate_all<F: RowFilter>(filters: &[F], table: &Table) -> Result<Vec<bool>> {
    let mut mask = vec![true; table.nrows()];
    for filter in filters {
        let rows = filter.evaluate(table)?;
        if rows.len() != mask.len() {
            return Err(LcmError::dimension_mismatch(
                "filter mask length",
                mask.len(),
                rows.len(),
            ));
        }
        for (keep, row) in mask.iter_mut().zip(rows) {
            *keep &= row;
        }
    }
    Ok(mask)
}

/// Applies `filters` to `table`, returning the kept rows and the mask used.
pub fn apply_filters<F: RowFilter>(filters: &[F], table: &Table) -> Result<(Table, Vec<bool>)> {
    let mask = evaluate_all(filters, table)?;
    let filtered = table.filter(&mask)?;
    Ok((filtered, mask))
}
