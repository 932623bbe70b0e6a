//! Maximum-likelihood estimation of multinomial-logit coefficients.

use log::{debug, info, warn};
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::ChoicePartition;
use crate::error::{LcmError, Result};
use crate::formulation::Formulation;
use crate::interaction::InteractionData;
use crate::probabilities::{log_sum_exp, softmax};
use crate::solving::{Evaluation, LikelihoodSolver, LogLikelihood, NewtonRaphson, SolverOptions};

/// Named parameter values in design-matrix column order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    names: Vec<String>,
    values: DVector<f64>,
}

impl Parameters {
    pub(crate) fn new(names: Vec<String>, values: DVector<f64>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    /// Looks up a value by term name, e.g. `"var1:var3"`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Likelihood statistics of a fitted model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogLikelihoods {
    /// Log-likelihood with every coefficient at zero (equal probabilities).
    pub null: f64,
    /// Log-likelihood at the estimated coefficients.
    pub converged: f64,
    /// Likelihood-ratio index `1 - converged / null`.
    pub rho_squared: f64,
}

impl LogLikelihoods {
    fn new(null: f64, converged: f64) -> Self {
        let rho_squared = if null == 0.0 {
            0.0
        } else {
            1.0 - converged / null
        };
        Self {
            null,
            converged,
            rho_squared,
        }
    }

    /// `[null, converged, rho_squared]`.
    pub fn as_array(&self) -> [f64; 3] {
        [self.null, self.converged, self.rho_squared]
    }
}

impl From<LogLikelihoods> for (f64, f64, f64) {
    fn from(value: LogLikelihoods) -> Self {
        (value.null, value.converged, value.rho_squared)
    }
}

/// Describes the result of an MNL estimation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MnlFit {
    /// Estimated utility coefficients.
    pub coefficients: Parameters,
    /// Asymptotic standard errors from the inverse observed information.
    pub standard_errors: Parameters,
    /// Null and converged log-likelihoods and rho-squared.
    pub log_likelihoods: LogLikelihoods,
    /// Newton iterations used by the solver.
    pub iterations: usize,
    /// Number of choice situations in the estimation sample.
    pub choosers: usize,
}

/// MNL log-likelihood over labeled choice situations.
struct MnlLogLikelihood<'a> {
    design: &'a DMatrix<f64>,
    partition: &'a ChoicePartition,
    chosen_rows: Vec<usize>,
}

impl<'a> MnlLogLikelihood<'a> {
    fn new(
        design: &'a DMatrix<f64>,
        partition: &'a ChoicePartition,
        labels: &[bool],
    ) -> Result<Self> {
        if labels.len() != design.nrows() {
            return Err(LcmError::dimension_mismatch(
                "choice labels length",
                design.nrows(),
                labels.len(),
            ));
        }
        let mut chosen_rows = Vec::with_capacity(partition.situation_count());
        for situation in partition.situations() {
            let mut chosen = situation.range().filter(|&row| labels[row]);
            let (Some(row), None) = (chosen.next(), chosen.next()) else {
                return Err(LcmError::dimension_mismatch(
                    "chosen alternatives per chooser",
                    1,
                    situation.range().filter(|&row| labels[row]).count(),
                ));
            };
            chosen_rows.push(row);
        }
        Ok(Self {
            design,
            partition,
            chosen_rows,
        })
    }

    /// `Σ -ln(J_s)`: every alternative equally likely.
    fn null_log_likelihood(&self) -> f64 {
        self.partition
            .situations()
            .map(|situation| -(situation.alternative_count() as f64).ln())
            .sum()
    }
}

impl LogLikelihood for MnlLogLikelihood<'_> {
    fn dimension(&self) -> usize {
        self.design.ncols()
    }

    fn evaluate(&self, theta: &DVector<f64>) -> Result<Evaluation> {
        let k = self.dimension();
        let utilities = self.design * theta;
        let mut value = 0.0;
        let mut gradient = DVector::zeros(k);
        let mut hessian = DMatrix::zeros(k, k);

        for (situation, &chosen) in self.partition.situations().zip(&self.chosen_rows) {
            let range = situation.range();
            let probabilities = softmax(&utilities.as_slice()[range.clone()]);
            value += utilities[chosen] - log_sum_exp(&utilities.as_slice()[range.clone()]);

            // Gradient: x_chosen - Σ p_j x_j
            // Hessian: -Σ p_j (x_j - x̄)(x_j - x̄)'
            let mut mean = DVector::zeros(k);
            for (offset, row) in range.clone().enumerate() {
                mean += self.design.row(row).transpose() * probabilities[offset];
            }
            gradient += self.design.row(chosen).transpose() - &mean;
            for (offset, row) in range.enumerate() {
                let deviation = self.design.row(row).transpose() - &mean;
                hessian.ger(-probabilities[offset], &deviation, &deviation, 1.0);
            }
        }

        if !value.is_finite() {
            return Err(LcmError::NumericalError {
                context: "MNL log-likelihood",
            });
        }
        Ok(Evaluation {
            value,
            gradient,
            hessian,
        })
    }

    fn value(&self, theta: &DVector<f64>) -> Result<f64> {
        let utilities = self.design * theta;
        Ok(self
            .partition
            .situations()
            .zip(&self.chosen_rows)
            .map(|(situation, &chosen)| {
                utilities[chosen] - log_sum_exp(&utilities.as_slice()[situation.range()])
            })
            .sum())
    }
}

/// Shapes interaction data into an MNL likelihood and delegates maximization.
#[derive(Clone, Debug)]
pub struct MnlEstimator<S = NewtonRaphson> {
    solver: S,
}

impl Default for MnlEstimator {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

impl MnlEstimator {
    /// Estimator backed by the built-in Newton–Raphson solver.
    pub fn new(options: SolverOptions) -> Self {
        Self {
            solver: NewtonRaphson::new(options),
        }
    }
}

impl<S: LikelihoodSolver> MnlEstimator<S> {
    /// Estimator backed by a caller-provided solver.
    pub fn with_solver(solver: S) -> Self {
        Self { solver }
    }

    /// Fits `formula` on labeled interaction data.
    pub fn fit(&self, data: &InteractionData, formula: &Formulation) -> Result<MnlFit> {
        let labels = data
            .chosen()
            .ok_or_else(|| LcmError::dimension_mismatch("choice labels length", data.nrows(), 0))?;
        let design = formula.design_matrix(data.table())?;
        let objective = MnlLogLikelihood::new(&design, data.partition(), labels)?;

        let summary = self
            .solver
            .maximize(&objective, DVector::zeros(design.ncols()))?;
        if !summary.converged {
            return Err(LcmError::FailedToFit {
                iterations: summary.iterations,
                decrement: summary.decrement,
            });
        }

        debug!(
            "solver stopped after {} iterations: penalized objective {:.6}, decrement {:.3e}",
            summary.iterations, summary.objective, summary.decrement
        );

        let at_optimum = objective.evaluate(&summary.theta)?;
        let log_likelihoods =
            LogLikelihoods::new(objective.null_log_likelihood(), at_optimum.value);
        let standard_errors = standard_errors(&at_optimum.hessian, self.solver.ridge());
        if standard_errors.iter().any(|se| !se.is_finite()) {
            warn!("some standard errors are undefined");
        }

        let names = formula.term_names();
        info!(
            "fitted `{}` on {} choosers in {} iterations: ll {:.4} (null {:.4}), rho^2 {:.4}",
            formula,
            data.partition().situation_count(),
            summary.iterations,
            log_likelihoods.converged,
            log_likelihoods.null,
            log_likelihoods.rho_squared
        );

        Ok(MnlFit {
            coefficients: Parameters::new(names.clone(), summary.theta),
            standard_errors: Parameters::new(names, standard_errors),
            log_likelihoods,
            iterations: summary.iterations,
            choosers: data.partition().situation_count(),
        })
    }
}

/// `sqrt(diag((-H)^-1))` from the unpenalized Hessian. When the information
/// matrix is singular it is retried with `ridge` added to its diagonal; NaN
/// marks entries that stay undefined.
fn standard_errors(hessian: &DMatrix<f64>, ridge: f64) -> DVector<f64> {
    let information = -hessian;
    let covariance = invert(&information).or_else(|| {
        if ridge > 0.0 {
            warn!("observed information is singular; using the ridge-penalized information");
            let n = information.nrows();
            invert(&(&information + DMatrix::<f64>::identity(n, n) * ridge))
        } else {
            None
        }
    });
    match covariance {
        Some(covariance) => covariance
            .diagonal()
            .map(|v| if v > 0.0 { v.sqrt() } else { f64::NAN }),
        None => DVector::from_element(hessian.nrows(), f64::NAN),
    }
}

fn invert(information: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    match Cholesky::new(information.clone()) {
        Some(cholesky) => Some(cholesky.inverse()),
        None => information.clone().try_inverse(),
    }
}
