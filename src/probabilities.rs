//! Multinomial-logit utilities and within-situation choice probabilities.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::data::ChoicePartition;
use crate::error::{LcmError, Result};

/// Linear utilities `X β`, one per long-table row.
pub fn utilities(design: &DMatrix<f64>, coefficients: &DVector<f64>) -> Result<DVector<f64>> {
    if design.ncols() != coefficients.len() {
        return Err(LcmError::dimension_mismatch(
            "coefficient length",
            design.ncols(),
            coefficients.len(),
        ));
    }
    let utilities = design * coefficients;
    if utilities.iter().any(|u| !u.is_finite()) {
        return Err(LcmError::NumericalError {
            context: "utility evaluation",
        });
    }
    Ok(utilities)
}

/// `ln Σ exp(u)`, shifted by the maximum to avoid overflow.
pub fn log_sum_exp(utilities: &[f64]) -> f64 {
    let max = utilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        return max;
    }
    max + utilities.iter().map(|u| (u - max).exp()).sum::<f64>().ln()
}

/// Softmax of one choice situation's utilities.
pub fn softmax(utilities: &[f64]) -> Vec<f64> {
    let normalizer = log_sum_exp(utilities);
    utilities.iter().map(|u| (u - normalizer).exp()).collect()
}

/// Probabilities of every row within its choice situation.
///
/// Situations are independent, so they are evaluated in parallel; the output
/// keeps long-table row order.
pub fn situation_probabilities(
    utilities: &DVector<f64>,
    partition: &ChoicePartition,
) -> Result<DVector<f64>> {
    if utilities.len() != partition.row_count() {
        return Err(LcmError::dimension_mismatch(
            "utility length",
            partition.row_count(),
            utilities.len(),
        ));
    }
    let values = utilities.as_slice();
    let blocks: Vec<Vec<f64>> = partition
        .as_slice()
        .par_iter()
        .map(|situation| softmax(&values[situation.range()]))
        .collect();
    Ok(DVector::from_iterator(
        utilities.len(),
        blocks.into_iter().flatten(),
    ))
}

/// Predicted probabilities for each chooser over its candidate alternative slots.
#[derive(Clone, Debug)]
pub struct ChoiceProbabilities {
    partition: ChoicePartition,
    alternative_positions: Vec<usize>,
    alternative_ids: Vec<String>,
    probabilities: DVector<f64>,
}

impl ChoiceProbabilities {
    pub(crate) fn new(
        partition: ChoicePartition,
        alternative_positions: Vec<usize>,
        alternative_ids: Vec<String>,
        probabilities: DVector<f64>,
    ) -> Self {
        Self {
            partition,
            alternative_positions,
            alternative_ids,
            probabilities,
        }
    }

    /// One probability per long-table row.
    pub fn probabilities(&self) -> &DVector<f64> {
        &self.probabilities
    }

    pub fn partition(&self) -> &ChoicePartition {
        &self.partition
    }

    /// Logical alternative id of each long-table row.
    pub fn alternative_ids(&self) -> &[String] {
        &self.alternative_ids
    }

    /// Candidate ids and probabilities for one chooser.
    pub fn for_chooser(&self, chooser: &str) -> Option<(&[String], &[f64])> {
        let situation = self
            .partition
            .situations()
            .find(|situation| situation.chooser() == chooser)?;
        let range = situation.range();
        Some((
            &self.alternative_ids[range.clone()],
            &self.probabilities.as_slice()[range],
        ))
    }

    /// Expected number of choosers landing on each alternative slot:
    /// the sum over choosers of their probability for that slot.
    pub fn expected_demand(&self, slots: usize) -> Vec<f64> {
        let mut demand = vec![0.0; slots];
        for (&slot, probability) in self
            .alternative_positions
            .iter()
            .zip(self.probabilities.iter())
        {
            demand[slot] += probability;
        }
        demand
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn softmax_is_stable_for_large_utilities() {
        let p = softmax(&[1000.0, 1000.0, 999.0]);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[0], p[1]);
        assert!(p[2] < p[0]);
    }

    #[test]
    fn probabilities_normalize_within_each_situation() {
        let partition = ChoicePartition::from_lengths(vec!["0".into(), "1".into()], &[2, 3]);
        let design = DMatrix::from_row_slice(5, 1, &[0.0, 1.0, 1.0, 1.0, 2.0]);
        let beta = DVector::from_vec(vec![2.0]);
        let u = utilities(&design, &beta).unwrap();
        let p = situation_probabilities(&u, &partition).unwrap();

        assert_relative_eq!(p[0] + p[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[2] + p[3] + p[4], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[1] / p[0], 2.0_f64.exp(), epsilon = 1e-9);
        assert_relative_eq!(p[2], p[3]);

        let probabilities = ChoiceProbabilities::new(
            partition,
            vec![0, 1, 0, 1, 2],
            vec!["a".into(), "b".into(), "a".into(), "b".into(), "c".into()],
            p.clone(),
        );
        let demand = probabilities.expected_demand(3);
        assert_relative_eq!(demand.iter().sum::<f64>(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(demand[2], p[4]);
        let (ids, probs) = probabilities.for_chooser("1").unwrap();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(probs.len(), 3);
        assert!(probabilities.for_chooser("9").is_none());
    }

    #[test]
    fn utilities_check_dimensions() {
        let design = DMatrix::zeros(2, 2);
        let beta = DVector::zeros(3);
        assert!(matches!(
            utilities(&design, &beta),
            Err(LcmError::DimensionMismatch { .. })
        ));
    }
}
