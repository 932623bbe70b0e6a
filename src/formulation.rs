//! Patsy-style utility formulas such as `"var2 + var1:var3"`.
//!
//! Terms are joined with `+`; a term made of several variables joined with `:`
//! is their elementwise product. MNL utilities are only identified up to an
//! additive constant, so intercept markers (`0`, `- 1`) are accepted and
//! dropped while an explicit `1` is rejected.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::data::Table;
use crate::error::{LcmError, Result};

/// One column of the design matrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    variables: Vec<String>,
}

impl Term {
    /// Variables multiplied together by this term.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Display name, e.g. `var1:var3`.
    pub fn name(&self) -> String {
        self.variables.join(":")
    }
}

/// Parsed linear utility formula.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Formulation {
    expression: String,
    terms: Vec<Term>,
}

impl Formulation {
    /// Parses a formula expression.
    pub fn new<S: AsRef<str>>(expression: S) -> Result<Self> {
        expression.as_ref().parse()
    }

    /// Returns the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Names of the design-matrix columns, in order.
    pub fn term_names(&self) -> Vec<String> {
        self.terms.iter().map(Term::name).collect()
    }

    /// Builds the `rows × terms` design matrix from numeric columns of `table`.
    pub fn design_matrix(&self, table: &Table) -> Result<DMatrix<f64>> {
        let mut matrix = DMatrix::from_element(table.nrows(), self.terms.len(), 1.0);
        for (col, term) in self.terms.iter().enumerate() {
            for variable in &term.variables {
                let values = table.numeric(variable).map_err(|err| {
                    LcmError::invalid_formula(self.expression.clone(), err.to_string())
                })?;
                for (row, value) in values.iter().enumerate() {
                    matrix[(row, col)] *= value;
                }
            }
        }
        Ok(matrix)
    }
}

impl FromStr for Formulation {
    type Err = LcmError;

    fn from_str(expression: &str) -> Result<Self> {
        let invalid = |reason: String| LcmError::invalid_formula(expression, reason);
        let mut terms = Vec::new();
        let mut seen = HashSet::new();

        for piece in expression.split('+') {
            let (term, removed) = match piece.split_once('-') {
                Some((term, removed)) => (term.trim(), Some(removed.trim())),
                None => (piece.trim(), None),
            };
            if let Some(removed) = removed {
                if removed != "1" && removed != "0" {
                    return Err(invalid(format!(
                        "only the intercept may be removed, found `- {removed}`"
                    )));
                }
                if term.is_empty() {
                    continue;
                }
            }
            match term {
                "" => return Err(invalid("empty term".to_string())),
                "0" => continue,
                "1" => {
                    return Err(invalid(
                        "an intercept is not identified in a multinomial logit".to_string(),
                    ))
                }
                _ => {}
            }

            let variables: Vec<String> = term.split(':').map(|v| v.trim().to_string()).collect();
            if let Some(bad) = variables.iter().find(|v| !is_identifier(v)) {
                return Err(invalid(format!("`{bad}` is not a column name")));
            }
            let mut key = variables.clone();
            key.sort();
            if !seen.insert(key) {
                return Err(invalid(format!("term `{term}` appears twice")));
            }
            terms.push(Term { variables });
        }

        if terms.is_empty() {
            return Err(invalid("formula has no terms".to_string()));
        }
        Ok(Self {
            expression: expression.trim().to_string(),
            terms,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl From<Formulation> for String {
    fn from(value: Formulation) -> Self {
        value.expression
    }
}

impl TryFrom<String> for Formulation {
    type Error = LcmError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TableBuilder;

    #[test]
    fn parses_terms_and_interactions() {
        let f = Formulation::new("var2 + var1:var3").unwrap();
        assert_eq!(f.expression(), "var2 + var1:var3");
        assert_eq!(f.term_names(), vec!["var2", "var1:var3"]);
        assert_eq!(f.terms()[1].variables(), ["var1", "var3"]);
    }

    #[test]
    fn drops_intercept_markers() {
        let f = Formulation::new("x + y - 1").unwrap();
        assert_eq!(f.term_names(), vec!["x", "y"]);
        let f = Formulation::new("0 + x").unwrap();
        assert_eq!(f.term_names(), vec!["x"]);
    }

    #[test]
    fn rejects_bad_formulas() {
        for bad in ["", "1 + x", "x + ", "x + y:x + x:y", "x - y", "2x"] {
            assert!(
                matches!(Formulation::new(bad), Err(LcmError::InvalidFormula { .. })),
                "`{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn design_matrix_multiplies_interactions() {
        let table = TableBuilder::range(2)
            .numeric("var1", vec![5.0, 6.0])
            .numeric("var2", vec![10.0, 11.0])
            .numeric("var3", vec![20.0, 21.0])
            .text("id", vec!["a".into(), "b".into()])
            .build()
            .unwrap();
        let f = Formulation::new("var2 + var1:var3").unwrap();
        let x = f.design_matrix(&table).unwrap();
        assert_eq!(x.shape(), (2, 2));
        assert_eq!(x[(0, 0)], 10.0);
        assert_eq!(x[(1, 1)], 126.0);

        let text = Formulation::new("id").unwrap();
        assert!(matches!(
            text.design_matrix(&table),
            Err(LcmError::InvalidFormula { .. })
        ));
    }
}
