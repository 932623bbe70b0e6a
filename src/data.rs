//! Labeled tables of chooser and alternative covariates, plus the partition of
//! long-format interaction data into per-chooser choice situations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{LcmError, Result};

/// A single named column of a [`Table`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// Numeric covariates usable in formulas and numeric filters.
    Numeric(Vec<f64>),
    /// Categorical values, typically identifiers.
    Text(Vec<String>),
}

impl Column {
    /// Number of rows held by the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short description of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Text(_) => "text",
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(values) => Column::Numeric(rows.iter().map(|&r| values[r]).collect()),
            Column::Text(values) => {
                Column::Text(rows.iter().map(|&r| values[r].clone()).collect())
            }
        }
    }
}

/// Immutable table with labeled rows and named columns.
///
/// Row labels act as the row keys (chooser ids, alternative ids). They are not
/// required to be unique; callers that rely on identity check
/// [`Table::first_duplicate_index`] first.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    index: Vec<String>,
    index_name: Option<String>,
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns, excluding the row labels.
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row labels in row order.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Name attached to the row labels, if any.
    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|position| &self.columns[position])
    }

    /// Returns a numeric column or an error naming the offending column.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name) {
            Some(Column::Numeric(values)) => Ok(values),
            Some(Column::Text(_)) => Err(LcmError::ColumnType {
                column: name.to_string(),
                expected: "numeric",
            }),
            None => Err(LcmError::unknown_column(name)),
        }
    }

    /// Returns a text column or an error naming the offending column.
    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.column(name) {
            Some(Column::Text(values)) => Ok(values),
            Some(Column::Numeric(_)) => Err(LcmError::ColumnType {
                column: name.to_string(),
                expected: "text",
            }),
            None => Err(LcmError::unknown_column(name)),
        }
    }

    /// Returns the first row label that appears more than once.
    pub fn first_duplicate_index(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.index.len());
        self.index
            .iter()
            .find(|label| !seen.insert(label.as_str()))
            .map(String::as_str)
    }

    /// Keeps the rows where `mask` is true, preserving order.
    pub fn filter(&self, mask: &[bool]) -> Result<Table> {
        if mask.len() != self.nrows() {
            return Err(LcmError::dimension_mismatch(
                "filter mask length",
                self.nrows(),
                mask.len(),
            ));
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(row, keep)| keep.then_some(row))
            .collect();
        Ok(self.take_unchecked(&rows))
    }

    /// Gathers the given row positions, repeats allowed.
    pub fn take(&self, rows: &[usize]) -> Result<Table> {
        if let Some(&row) = rows.iter().find(|&&row| row >= self.nrows()) {
            return Err(LcmError::dimension_mismatch(
                "row position",
                self.nrows(),
                row,
            ));
        }
        Ok(self.take_unchecked(rows))
    }

    /// Repeats each row `counts[i]` times, keeping row labels.
    ///
    /// This is how capacity is expressed: a location with three vacant units
    /// becomes three rows sharing the same label.
    pub fn repeat(&self, counts: &[usize]) -> Result<Table> {
        if counts.len() != self.nrows() {
            return Err(LcmError::dimension_mismatch(
                "repeat counts length",
                self.nrows(),
                counts.len(),
            ));
        }
        let rows: Vec<usize> = counts
            .iter()
            .enumerate()
            .flat_map(|(row, &count)| std::iter::repeat(row).take(count))
            .collect();
        Ok(self.take_unchecked(&rows))
    }

    /// Moves the row labels into a leading text column and relabels rows `0..n`.
    ///
    /// The new column is named after the index, or `"index"` when unnamed.
    pub fn reset_index(&self) -> Result<Table> {
        let name = self.index_name.clone().unwrap_or_else(|| "index".to_string());
        if self.column(&name).is_some() {
            return Err(LcmError::DuplicateColumn { column: name });
        }
        let mut names = Vec::with_capacity(self.names.len() + 1);
        names.push(name);
        names.extend(self.names.iter().cloned());
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(Column::Text(self.index.clone()));
        columns.extend(self.columns.iter().cloned());
        Ok(Table {
            index: range_labels(self.nrows()),
            index_name: None,
            names,
            columns,
        })
    }

    /// Appends a column, validating its length and name.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Table> {
        let name = name.into();
        if column.len() != self.nrows() {
            return Err(LcmError::dimension_mismatch(
                "column length",
                self.nrows(),
                column.len(),
            ));
        }
        if self.column(&name).is_some() {
            return Err(LcmError::DuplicateColumn { column: name });
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(self)
    }

    /// Iterates over `(name, column)` pairs.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    pub(crate) fn take_unchecked(&self, rows: &[usize]) -> Table {
        Table {
            index: rows.iter().map(|&row| self.index[row].clone()).collect(),
            index_name: self.index_name.clone(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|column| column.take(rows)).collect(),
        }
    }
}

/// Builder that validates column lengths and names before constructing a [`Table`].
#[derive(Debug)]
pub struct TableBuilder {
    index: Vec<String>,
    index_name: Option<String>,
    columns: Vec<(String, Column)>,
}

impl TableBuilder {
    /// Start building a table from its row labels.
    pub fn new(index: Vec<String>) -> Self {
        Self {
            index,
            index_name: None,
            columns: Vec::new(),
        }
    }

    /// Start building a table labeled `"0"`, `"1"`, ... `"n-1"`.
    pub fn range(rows: usize) -> Self {
        Self::new(range_labels(rows))
    }

    /// Names the row labels.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Adds a numeric column.
    pub fn numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.push((name.into(), Column::Numeric(values)));
        self
    }

    /// Adds a text column.
    pub fn text(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.columns.push((name.into(), Column::Text(values)));
        self
    }

    /// Finalizes construction after validating shapes and names.
    pub fn build(self) -> Result<Table> {
        let mut table = Table {
            index: self.index,
            index_name: self.index_name,
            names: Vec::with_capacity(self.columns.len()),
            columns: Vec::with_capacity(self.columns.len()),
        };
        for (name, column) in self.columns {
            table = table.with_column(name, column)?;
        }
        Ok(table)
    }
}

fn range_labels(rows: usize) -> Vec<String> {
    (0..rows).map(|row| row.to_string()).collect()
}

/// Describes the choice situations contained in a long-format interaction table.
#[derive(Clone, Debug)]
pub struct ChoicePartition {
    situations: Vec<ChoiceSituation>,
    row_to_situation: Vec<usize>,
}

impl ChoicePartition {
    /// Lays out consecutive situations, one per chooser, with the given row counts.
    pub(crate) fn from_lengths(choosers: Vec<String>, lengths: &[usize]) -> Self {
        let total: usize = lengths.iter().sum();
        let mut situations = Vec::with_capacity(choosers.len());
        let mut row_to_situation = Vec::with_capacity(total);
        let mut start = 0usize;
        for (situation, (chooser, &length)) in choosers.into_iter().zip(lengths).enumerate() {
            let end = start + length;
            row_to_situation.extend(std::iter::repeat(situation).take(length));
            situations.push(ChoiceSituation {
                chooser,
                start,
                end,
            });
            start = end;
        }
        Self {
            situations,
            row_to_situation,
        }
    }

    /// Number of choice situations (one per chooser kept).
    pub fn situation_count(&self) -> usize {
        self.situations.len()
    }

    /// Total number of rows across all situations.
    pub fn row_count(&self) -> usize {
        self.row_to_situation.len()
    }

    /// Iterates over situations in order.
    pub fn situations(&self) -> impl Iterator<Item = &ChoiceSituation> {
        self.situations.iter()
    }

    pub(crate) fn as_slice(&self) -> &[ChoiceSituation] {
        &self.situations
    }

    /// Finds the index of the situation containing `row`, if `row` is in range.
    pub fn situation_of(&self, row: usize) -> Option<usize> {
        self.row_to_situation.get(row).copied()
    }
}

/// Rows of the long table that belong to one chooser.
#[derive(Clone, Debug)]
pub struct ChoiceSituation {
    chooser: String,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl ChoiceSituation {
    /// Key of the chooser facing this situation.
    pub fn chooser(&self) -> &str {
        &self.chooser
    }

    /// Range of long-table rows that belong to this situation.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    /// Number of candidate alternatives in the situation.
    pub fn alternative_count(&self) -> usize {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternatives() -> Table {
        TableBuilder::new(vec!["a".into(), "b".into(), "c".into()])
            .index_name("thing_id")
            .numeric("var2", vec![10.0, 11.0, 12.0])
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_ragged_columns() {
        let result = TableBuilder::range(3)
            .numeric("x", vec![1.0, 2.0])
            .build();
        assert!(matches!(
            result,
            Err(LcmError::DimensionMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn builder_rejects_duplicate_names() {
        let result = TableBuilder::range(1)
            .numeric("x", vec![1.0])
            .text("x", vec!["a".into()])
            .build();
        assert!(matches!(result, Err(LcmError::DuplicateColumn { .. })));
    }

    #[test]
    fn repeat_then_reset_index_moves_labels_into_column() {
        let repeated = alternatives().repeat(&[1, 0, 2]).unwrap();
        assert_eq!(repeated.index(), ["a", "c", "c"]);
        assert_eq!(repeated.first_duplicate_index(), Some("c"));

        let reset = repeated.reset_index().unwrap();
        assert_eq!(reset.index(), ["0", "1", "2"]);
        assert_eq!(reset.text("thing_id").unwrap(), ["a", "c", "c"]);
        assert_eq!(reset.numeric("var2").unwrap(), [10.0, 12.0, 12.0]);
        assert_eq!(reset.column_names()[0], "thing_id");
    }

    #[test]
    fn filter_and_typed_access() {
        let table = alternatives();
        let filtered = table.filter(&[true, false, true]).unwrap();
        assert_eq!(filtered.index(), ["a", "c"]);
        assert!(matches!(
            table.text("var2"),
            Err(LcmError::ColumnType { .. })
        ));
        assert!(matches!(
            table.numeric("missing"),
            Err(LcmError::UnknownColumn { .. })
        ));
        assert!(table.filter(&[true]).is_err());
        assert!(table.take(&[3]).is_err());
    }

    #[test]
    fn partition_maps_rows_to_situations() {
        let partition = ChoicePartition::from_lengths(vec!["0".into(), "1".into()], &[2, 3]);
        assert_eq!(partition.situation_count(), 2);
        assert_eq!(partition.row_count(), 5);
        assert_eq!(partition.situation_of(1), Some(0));
        assert_eq!(partition.situation_of(2), Some(1));
        assert_eq!(partition.situation_of(5), None);
        let second = partition.situations().nth(1).unwrap();
        assert_eq!(second.chooser(), "1");
        assert_eq!(second.range(), 2..5);
    }
}
