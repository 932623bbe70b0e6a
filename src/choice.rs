//! Capacity-constrained allocation of alternative slots to choosers.

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Exp1};
use serde::{Deserialize, Serialize};

use crate::error::{LcmError, Result};

/// Alternative assigned to each chooser, aligned to the input chooser order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceAssignment {
    choosers: Vec<String>,
    choices: Vec<Option<String>>,
}

impl ChoiceAssignment {
    pub(crate) fn new(choosers: Vec<String>, choices: Vec<Option<String>>) -> Self {
        debug_assert_eq!(choosers.len(), choices.len());
        Self { choosers, choices }
    }

    /// Every chooser left without an alternative.
    pub(crate) fn unassigned(choosers: Vec<String>) -> Self {
        let choices = vec![None; choosers.len()];
        Self { choosers, choices }
    }

    pub fn len(&self) -> usize {
        self.choosers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choosers.is_empty()
    }

    /// Chooser keys in input order.
    pub fn choosers(&self) -> &[String] {
        &self.choosers
    }

    /// Assigned alternative per chooser; `None` marks no assignment.
    pub fn choices(&self) -> &[Option<String>] {
        &self.choices
    }

    /// Alternative assigned to `chooser`, if any.
    pub fn get(&self, chooser: &str) -> Option<&str> {
        self.choosers
            .iter()
            .position(|key| key == chooser)
            .and_then(|i| self.choices[i].as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.choosers
            .iter()
            .map(String::as_str)
            .zip(self.choices.iter().map(Option::as_deref))
    }

    /// Assigned alternatives, skipping unassigned choosers.
    pub fn assigned(&self) -> impl Iterator<Item = &str> {
        self.choices.iter().filter_map(Option::as_deref)
    }

    pub fn unassigned_count(&self) -> usize {
        self.choices.iter().filter(|choice| choice.is_none()).count()
    }
}

/// Assigns at most one alternative slot to each chooser, without replacement.
///
/// `alternative_keys[i]` and `weights[i]` describe slot `i`; a key may repeat to
/// express capacity. Slots are drawn proportionally to weight without
/// replacement, one draw per chooser, in a single pass. Zero-weight slots are
/// never drawn, so when fewer positive-weight slots than choosers exist the
/// remaining choosers stay unassigned. Which choosers go without is random.
pub fn unit_choice<R: Rng + ?Sized>(
    chooser_keys: &[String],
    alternative_keys: &[String],
    weights: &[f64],
    rng: &mut R,
) -> Result<ChoiceAssignment> {
    if alternative_keys.len() != weights.len() {
        return Err(LcmError::dimension_mismatch(
            "allocation weights length",
            alternative_keys.len(),
            weights.len(),
        ));
    }
    if let Some((index, &weight)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(LcmError::InvalidWeight { index, weight });
    }

    // Exponential race: the slots with the smallest E/w form a weighted
    // sample without replacement.
    let mut keyed: Vec<(f64, usize)> = weights
        .iter()
        .enumerate()
        .filter(|&(_, &w)| w > 0.0)
        .map(|(slot, &w)| {
            let arrival: f64 = Exp1.sample(rng);
            (arrival / w, slot)
        })
        .collect();
    let draws = chooser_keys.len().min(keyed.len());
    if draws > 0 && draws < keyed.len() {
        keyed.select_nth_unstable_by(draws - 1, |a, b| a.0.total_cmp(&b.0));
    }
    keyed.truncate(draws);

    let mut order: Vec<usize> = (0..chooser_keys.len()).collect();
    order.shuffle(rng);

    let mut choices = vec![None; chooser_keys.len()];
    for (&chooser, &(_, slot)) in order.iter().zip(&keyed) {
        choices[chooser] = Some(alternative_keys[slot].clone());
    }
    debug!(
        "unit choice: {} of {} choosers placed into {} slots",
        draws,
        chooser_keys.len(),
        alternative_keys.len()
    );

    Ok(ChoiceAssignment::new(chooser_keys.to_vec(), choices))
}
