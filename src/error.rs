use thiserror::Error;

/// Unified error type for `lcmrs` operations.
#[derive(Debug, Error)]
pub enum LcmError {
    /// Raised when provided arrays or tables have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when a table is asked for a column it does not carry.
    #[error("unknown column `{column}`")]
    UnknownColumn { column: String },

    /// Raised when a column holds the wrong kind of values for an operation.
    #[error("column `{column}` must be {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    /// Raised when two columns would end up with the same name.
    #[error("duplicate column `{column}`")]
    DuplicateColumn { column: String },

    /// Raised when a filter expression cannot be parsed or evaluated.
    #[error("invalid filter expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// Raised when a model formula cannot be parsed or resolved.
    #[error("invalid formula `{formula}`: {reason}")]
    InvalidFormula { formula: String, reason: String },

    /// Raised when an allocation weight is negative or not finite.
    #[error("weight at index {index} must be finite and non-negative, found {weight}")]
    InvalidWeight { index: usize, weight: f64 },

    /// Raised when a configuration value is out of range.
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: &'static str,
    },

    /// Raised when alternatives carry repeated row keys and no choice column is configured.
    #[error(
        "cannot disambiguate alternative identity: row key `{key}` repeats and no choice column is set"
    )]
    AmbiguousAlternativeIdentity { key: String },

    /// Raised when `predict` or fit accessors are used before a successful fit.
    #[error("model `{model}` has not been fitted")]
    NotFitted { model: String },

    /// Raised when no chooser has its observed alternative among the candidates.
    #[error("no chooser has its chosen alternative among the filtered alternatives")]
    EmptyEstimationData,

    /// Raised when the likelihood maximization stops short of convergence.
    #[error(
        "failed to fit: solver did not converge after {iterations} iterations; Newton decrement {decrement}"
    )]
    FailedToFit {
        /// Number of iterations performed before termination.
        iterations: usize,
        /// Newton decrement at the last iterate.
        decrement: f64,
    },

    /// Raised when linear algebra operations encounter a singular system.
    #[error("matrix in {context} is singular")]
    SingularMatrix { context: &'static str },

    /// Raised when numerical routines produce NaN or infinities.
    #[error("encountered non-finite value during {context}")]
    NumericalError { context: &'static str },
}

impl LcmError {
    /// Helper to format a [`DimensionMismatch`](LcmError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper to raise when a matrix factorization fails due to singularity.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularMatrix { context }
    }

    pub fn unknown_column(column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
        }
    }

    pub fn invalid_expression(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_formula(formula: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFormula {
            formula: formula.into(),
            reason: reason.into(),
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, LcmError>;
