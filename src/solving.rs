//! Likelihood maximization: the solver seam and its Newton–Raphson implementation.

use log::debug;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{LcmError, Result};

/// Log-likelihood value with its first and second derivatives at one point.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub value: f64,
    pub gradient: DVector<f64>,
    pub hessian: DMatrix<f64>,
}

/// A twice-differentiable log-likelihood `ℓ(θ)` to be maximized.
pub trait LogLikelihood {
    /// Length of the parameter vector.
    fn dimension(&self) -> usize;

    /// Evaluates `ℓ`, `∇ℓ` and `∇²ℓ` at `theta`.
    fn evaluate(&self, theta: &DVector<f64>) -> Result<Evaluation>;

    /// Evaluates `ℓ` alone. Override when derivatives are expensive.
    fn value(&self, theta: &DVector<f64>) -> Result<f64> {
        Ok(self.evaluate(theta)?.value)
    }
}

/// Numerical optimizer used by the estimator.
pub trait LikelihoodSolver {
    /// Maximizes `objective` starting from `start`.
    ///
    /// Running out of iterations is reported through
    /// [`SolverSummary::converged`], not as an error; callers decide how to
    /// surface it.
    fn maximize<L: LogLikelihood + ?Sized>(
        &self,
        objective: &L,
        start: DVector<f64>,
    ) -> Result<SolverSummary>;

    /// L2 penalty weight applied during maximization, zero when unpenalized.
    fn ridge(&self) -> f64 {
        0.0
    }
}

/// Configuration for the Newton–Raphson likelihood maximizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Convergence threshold on the Newton decrement `g' (-H)^{-1} g / 2`.
    pub tolerance: f64,
    /// Maximum number of Newton iterations allowed before aborting.
    pub max_iterations: usize,
    /// L2 penalty `ridge/2 * |θ|²` subtracted from the log-likelihood.
    /// Keeps the optimum finite when a sample is perfectly separable.
    pub ridge: f64,
    /// Maximum number of step halvings in the backtracking line search.
    pub max_step_halvings: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 200,
            ridge: 1e-4,
            max_step_halvings: 40,
        }
    }
}

/// Diagnostics returned alongside the maximizing parameters.
#[derive(Clone, Debug)]
pub struct SolverSummary {
    /// Parameters at the last accepted iterate.
    pub theta: DVector<f64>,
    /// Objective value (penalized) at `theta`.
    pub objective: f64,
    /// Number of Newton steps taken.
    pub iterations: usize,
    /// Newton decrement at `theta`.
    pub decrement: f64,
    /// Whether the decrement fell below the tolerance.
    pub converged: bool,
}

/// Damped Newton–Raphson with Armijo backtracking.
#[derive(Clone, Debug, Default)]
pub struct NewtonRaphson {
    options: SolverOptions,
}

impl NewtonRaphson {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn penalized<L: LogLikelihood + ?Sized>(
        &self,
        objective: &L,
        theta: &DVector<f64>,
    ) -> Result<Evaluation> {
        let mut evaluation = objective.evaluate(theta)?;
        let ridge = self.options.ridge;
        evaluation.value -= 0.5 * ridge * theta.norm_squared();
        evaluation.gradient -= theta * ridge;
        for i in 0..theta.len() {
            evaluation.hessian[(i, i)] -= ridge;
        }
        if !evaluation.value.is_finite() {
            return Err(LcmError::NumericalError {
                context: "log-likelihood evaluation",
            });
        }
        Ok(evaluation)
    }

    fn penalized_value<L: LogLikelihood + ?Sized>(
        &self,
        objective: &L,
        theta: &DVector<f64>,
    ) -> Result<f64> {
        Ok(objective.value(theta)? - 0.5 * self.options.ridge * theta.norm_squared())
    }
}

impl LikelihoodSolver for NewtonRaphson {
    fn ridge(&self) -> f64 {
        self.options.ridge
    }

    fn maximize<L: LogLikelihood + ?Sized>(
        &self,
        objective: &L,
        start: DVector<f64>,
    ) -> Result<SolverSummary> {
        if start.len() != objective.dimension() {
            return Err(LcmError::dimension_mismatch(
                "starting parameters",
                objective.dimension(),
                start.len(),
            ));
        }

        let mut theta = start;
        let mut current = self.penalized(objective, &theta)?;
        let mut decrement: f64;
        let mut iterations = 0usize;

        loop {
            let step = newton_step(&current)?;
            decrement = 0.5 * current.gradient.dot(&step);
            debug!(
                "newton iteration {iterations}: objective {:.6}, decrement {decrement:.3e}",
                current.value
            );
            if decrement < self.options.tolerance {
                return Ok(SolverSummary {
                    theta,
                    objective: current.value,
                    iterations,
                    decrement,
                    converged: true,
                });
            }
            if iterations == self.options.max_iterations {
                break;
            }

            // Armijo condition along the ascent direction: slope is g'step = 2 * decrement.
            let mut scale = 1.0_f64;
            let mut accepted = None;
            for _ in 0..=self.options.max_step_halvings {
                let candidate = &theta + &step * scale;
                let value = self.penalized_value(objective, &candidate)?;
                if value.is_finite() && value >= current.value + 1e-4 * scale * 2.0 * decrement {
                    accepted = Some(candidate);
                    break;
                }
                scale *= 0.5;
            }
            let Some(next) = accepted else {
                debug!("line search failed after {iterations} iterations");
                break;
            };

            theta = next;
            current = self.penalized(objective, &theta)?;
            iterations += 1;
        }

        Ok(SolverSummary {
            theta,
            objective: current.value,
            iterations,
            decrement,
            converged: false,
        })
    }
}

/// Solves `(-H) step = g`, preferring Cholesky and falling back to LU.
fn newton_step(evaluation: &Evaluation) -> Result<DVector<f64>> {
    let negative_hessian = -&evaluation.hessian;
    if let Some(cholesky) = Cholesky::new(negative_hessian.clone()) {
        return Ok(cholesky.solve(&evaluation.gradient));
    }
    negative_hessian
        .lu()
        .solve(&evaluation.gradient)
        .ok_or_else(|| LcmError::singular("negative Hessian"))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// `ℓ(θ) = -(θ - c)' A (θ - c) / 2` with a known maximizer `c`.
    struct Quadratic {
        a: DMatrix<f64>,
        c: DVector<f64>,
    }

    impl LogLikelihood for Quadratic {
        fn dimension(&self) -> usize {
            self.c.len()
        }

        fn evaluate(&self, theta: &DVector<f64>) -> Result<Evaluation> {
            let diff = theta - &self.c;
            let a_diff = &self.a * &diff;
            Ok(Evaluation {
                value: -0.5 * diff.dot(&a_diff),
                gradient: -a_diff,
                hessian: -self.a.clone(),
            })
        }
    }

    #[test]
    fn newton_solves_quadratic_in_one_step() {
        let objective = Quadratic {
            a: DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]),
            c: DVector::from_vec(vec![1.0, -3.0]),
        };
        let solver = NewtonRaphson::new(SolverOptions {
            ridge: 0.0,
            ..SolverOptions::default()
        });
        let summary = solver.maximize(&objective, DVector::zeros(2)).unwrap();
        assert!(summary.converged);
        assert_eq!(summary.iterations, 1);
        assert_relative_eq!(summary.theta, objective.c, epsilon = 1e-10);
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let objective = Quadratic {
            a: DMatrix::identity(1, 1),
            c: DVector::from_vec(vec![5.0]),
        };
        let solver = NewtonRaphson::new(SolverOptions {
            max_iterations: 0,
            ..SolverOptions::default()
        });
        let summary = solver.maximize(&objective, DVector::zeros(1)).unwrap();
        assert!(!summary.converged);
        assert_eq!(summary.iterations, 0);
    }

    #[test]
    fn rejects_wrong_start_dimension() {
        let objective = Quadratic {
            a: DMatrix::identity(2, 2),
            c: DVector::zeros(2),
        };
        let result = NewtonRaphson::default().maximize(&objective, DVector::zeros(3));
        assert!(matches!(result, Err(LcmError::DimensionMismatch { .. })));
    }
}
