//! Configuration structures for location choice models, kept in code with
//! `Default` values and `with_*` overrides.

use serde::{Deserialize, Serialize};

use crate::data::{Column, Table};
use crate::error::{LcmError, Result};
use crate::solving::SolverOptions;

/// How an alternative's logical identity is read from the alternatives table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlternativeIdentity {
    /// Use the row labels; they must be unique.
    #[default]
    RowKey,
    /// Use a named column, allowing several rows (capacity slots) per id.
    /// The column holds text, or integer-valued numbers such as `building_id`.
    Column(String),
}

impl AlternativeIdentity {
    /// Returns one logical alternative id per row of `alternatives`.
    pub fn resolve(&self, alternatives: &Table) -> Result<Vec<String>> {
        match self {
            AlternativeIdentity::RowKey => {
                if let Some(key) = alternatives.first_duplicate_index() {
                    return Err(LcmError::AmbiguousAlternativeIdentity {
                        key: key.to_string(),
                    });
                }
                Ok(alternatives.index().to_vec())
            }
            AlternativeIdentity::Column(name) => {
                if alternatives.column(name).is_none()
                    && alternatives.index_name() == Some(name.as_str())
                {
                    return Ok(alternatives.index().to_vec());
                }
                match alternatives.column(name) {
                    Some(Column::Text(values)) => Ok(values.clone()),
                    Some(Column::Numeric(values)) => integer_labels(name, values),
                    None => Err(LcmError::unknown_column(name.as_str())),
                }
            }
        }
    }
}

/// Formats integer-valued ids the way they print, e.g. `7.0` as `"7"`.
fn integer_labels(column: &str, values: &[f64]) -> Result<Vec<String>> {
    values
        .iter()
        .map(|&value| {
            if value.is_finite() && value.fract() == 0.0 {
                Ok(format!("{value:.0}"))
            } else {
                Err(LcmError::ColumnType {
                    column: column.to_string(),
                    expected: "text or integer-valued",
                })
            }
        })
        .collect()
}

/// Controls how many non-chosen alternatives enter each estimation choice set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Size of each chooser's choice set, including the chosen alternative.
    pub sample_size: usize,
    /// Draw the non-chosen alternatives with replacement.
    pub replacement: bool,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            sample_size: 10,
            replacement: false,
        }
    }
}

impl SamplingOptions {
    pub fn new(sample_size: usize) -> Self {
        Self {
            sample_size,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(LcmError::InvalidOption {
                option: "sample_size",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Aggregated configuration used by a location choice model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Negative sampling used to build estimation choice sets.
    pub sampling: SamplingOptions,
    /// Settings for the likelihood maximizer.
    pub solver: SolverOptions,
    /// Source of alternative identity for labels and reported choices.
    pub identity: AlternativeIdentity,
}

impl ModelOptions {
    /// Override the choice-set size while preserving other defaults.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sampling.sample_size = sample_size;
        self
    }

    /// Sample non-chosen alternatives with or without replacement.
    pub fn with_replacement(mut self, replacement: bool) -> Self {
        self.sampling.replacement = replacement;
        self
    }

    /// Override the solver settings.
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Identify alternatives through a named column instead of row labels.
    pub fn with_choice_column(mut self, column: impl Into<String>) -> Self {
        self.identity = AlternativeIdentity::Column(column.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.sampling.validate()?;
        if !(self.solver.tolerance > 0.0) {
            return Err(LcmError::InvalidOption {
                option: "solver.tolerance",
                reason: "must be positive",
            });
        }
        if !(self.solver.ridge >= 0.0) || !self.solver.ridge.is_finite() {
            return Err(LcmError::InvalidOption {
                option: "solver.ridge",
                reason: "must be finite and non-negative",
            });
        }
        Ok(())
    }
}
