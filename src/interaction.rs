//! Long-format chooser × alternative datasets for estimation and prediction.

use std::collections::HashMap;

use log::{debug, warn};
use rand::seq::index;
use rand::Rng;

use crate::data::{ChoicePartition, Table};
use crate::error::{LcmError, Result};
use crate::options::{AlternativeIdentity, SamplingOptions};

/// Suffix appended to chooser columns whose name an alternative column already uses.
pub const CHOOSER_SUFFIX: &str = "_chooser";

/// One row per (chooser, candidate alternative), grouped by chooser.
///
/// Row labels of [`InteractionData::table`] are the alternatives' row labels;
/// chooser keys live in the [`ChoicePartition`].
#[derive(Clone, Debug)]
pub struct InteractionData {
    table: Table,
    alternative_positions: Vec<usize>,
    alternative_ids: Vec<String>,
    chosen: Option<Vec<bool>>,
    partition: ChoicePartition,
}

impl InteractionData {
    /// Merged chooser and alternative covariates.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// For each row, the position of its alternative in the alternatives table.
    pub fn alternative_positions(&self) -> &[usize] {
        &self.alternative_positions
    }

    /// For each row, the logical id of its alternative.
    pub fn alternative_ids(&self) -> &[String] {
        &self.alternative_ids
    }

    /// Choice labels, present for estimation data only.
    pub fn chosen(&self) -> Option<&[bool]> {
        self.chosen.as_deref()
    }

    pub fn partition(&self) -> &ChoicePartition {
        &self.partition
    }

    pub fn nrows(&self) -> usize {
        self.table.nrows()
    }

    /// Splits into partition, per-row alternative positions and per-row ids.
    pub(crate) fn into_layout(self) -> (ChoicePartition, Vec<usize>, Vec<String>) {
        (
            self.partition,
            self.alternative_positions,
            self.alternative_ids,
        )
    }
}

/// Builds [`InteractionData`] from chooser and alternative tables.
#[derive(Clone, Debug, Default)]
pub struct InteractionBuilder {
    identity: AlternativeIdentity,
    sampling: SamplingOptions,
}

impl InteractionBuilder {
    pub fn new(identity: AlternativeIdentity, sampling: SamplingOptions) -> Self {
        Self { identity, sampling }
    }

    /// Builds labeled choice sets from observed choices.
    ///
    /// `chosen[i]` is the alternative id picked by chooser row `i`. Each kept
    /// chooser gets its chosen alternative first, labeled `true`, followed by
    /// up to `sample_size - 1` other alternatives labeled `false`. Choosers
    /// whose alternative is absent from `alternatives` are skipped.
    pub fn estimation<R: Rng + ?Sized>(
        &self,
        choosers: &Table,
        alternatives: &Table,
        chosen: &[String],
        rng: &mut R,
    ) -> Result<InteractionData> {
        if chosen.len() != choosers.nrows() {
            return Err(LcmError::dimension_mismatch(
                "observed choices length",
                choosers.nrows(),
                chosen.len(),
            ));
        }
        self.sampling.validate()?;
        let ids = self.identity.resolve(alternatives)?;

        // Slots of every id, ascending; the first one stands for the id.
        let mut slots_by_id: HashMap<&str, Vec<usize>> = HashMap::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            slots_by_id.entry(id.as_str()).or_default().push(position);
        }

        let negatives_wanted = self.sampling.sample_size - 1;
        let mut chooser_rows = Vec::new();
        let mut alternative_rows = Vec::new();
        let mut labels = Vec::new();
        let mut kept = Vec::new();
        let mut lengths = Vec::new();
        let mut dropped = 0usize;

        for (row, choice) in chosen.iter().enumerate() {
            let Some(excluded) = slots_by_id.get(choice.as_str()) else {
                dropped += 1;
                continue;
            };
            let slot = excluded[0];
            let available = ids.len() - excluded.len();
            let negatives: Vec<usize> = if available == 0 {
                Vec::new()
            } else if self.sampling.replacement {
                (0..negatives_wanted)
                    .map(|_| skip_excluded(rng.gen_range(0..available), excluded))
                    .collect()
            } else {
                index::sample(rng, available, negatives_wanted.min(available))
                    .into_iter()
                    .map(|i| skip_excluded(i, excluded))
                    .collect()
            };

            let length = 1 + negatives.len();
            chooser_rows.extend(std::iter::repeat(row).take(length));
            alternative_rows.push(slot);
            alternative_rows.extend(negatives);
            labels.push(true);
            labels.extend(std::iter::repeat(false).take(length - 1));
            kept.push(choosers.index()[row].clone());
            lengths.push(length);
        }

        if dropped > 0 {
            warn!("{dropped} chooser(s) dropped: chosen alternative not among the candidates");
        }
        if kept.is_empty() {
            return Err(LcmError::EmptyEstimationData);
        }
        debug!(
            "estimation dataset: {} choosers, {} rows",
            kept.len(),
            alternative_rows.len()
        );

        let table = merge(choosers, alternatives, &chooser_rows, &alternative_rows)?;
        let alternative_ids = alternative_rows.iter().map(|&p| ids[p].clone()).collect();
        Ok(InteractionData {
            table,
            alternative_positions: alternative_rows,
            alternative_ids,
            chosen: Some(labels),
            partition: ChoicePartition::from_lengths(kept, &lengths),
        })
    }

    /// Builds the full cross product of choosers and alternative rows.
    ///
    /// Choosers keep their input order; each sees every alternative row,
    /// repeated rows included, in table order.
    pub fn prediction(&self, choosers: &Table, alternatives: &Table) -> Result<InteractionData> {
        let ids = self.identity.resolve(alternatives)?;
        let width = alternatives.nrows();
        let chooser_rows: Vec<usize> = (0..choosers.nrows())
            .flat_map(|row| std::iter::repeat(row).take(width))
            .collect();
        let alternative_rows: Vec<usize> = (0..choosers.nrows()).flat_map(|_| 0..width).collect();
        debug!(
            "prediction dataset: {} choosers x {} alternatives",
            choosers.nrows(),
            width
        );

        let table = merge(choosers, alternatives, &chooser_rows, &alternative_rows)?;
        let alternative_ids = alternative_rows.iter().map(|&p| ids[p].clone()).collect();
        let lengths = vec![width; choosers.nrows()];
        Ok(InteractionData {
            table,
            alternative_positions: alternative_rows,
            alternative_ids,
            chosen: None,
            partition: ChoicePartition::from_lengths(choosers.index().to_vec(), &lengths),
        })
    }
}

/// Maps `rank` in `0..J - excluded.len()` to the `rank`-th slot not in
/// `excluded`, which must be sorted ascending.
fn skip_excluded(rank: usize, excluded: &[usize]) -> usize {
    let mut position = rank;
    for &slot in excluded {
        if slot > position {
            break;
        }
        position += 1;
    }
    position
}

/// Places alternative columns as-is next to chooser columns, suffixing
/// chooser columns whose names collide.
fn merge(
    choosers: &Table,
    alternatives: &Table,
    chooser_rows: &[usize],
    alternative_rows: &[usize],
) -> Result<Table> {
    let chooser_side = choosers.take_unchecked(chooser_rows);
    let mut table = alternatives.take_unchecked(alternative_rows);
    for (name, column) in chooser_side.columns() {
        let merged_name = if alternatives.column(name).is_some() {
            format!("{name}{CHOOSER_SUFFIX}")
        } else {
            name.to_string()
        };
        table = table.with_column(merged_name, column.clone())?;
    }
    Ok(table)
}
