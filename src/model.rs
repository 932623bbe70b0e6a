//! Multinomial-logit location choice model: filtered estimation and
//! capacity-aware prediction.

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::choice::{unit_choice, ChoiceAssignment};
use crate::data::Table;
use crate::error::{LcmError, Result};
use crate::estimation::{LogLikelihoods, MnlEstimator, Parameters};
use crate::filter::{apply_filters, parse_filters, FilterExpression};
use crate::formulation::Formulation;
use crate::interaction::InteractionBuilder;
use crate::options::{AlternativeIdentity, ModelOptions};
use crate::probabilities::{situation_probabilities, utilities, ChoiceProbabilities};

/// Coefficients and standard errors of a fitted model, keyed by formula term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitResults {
    pub coefficients: Parameters,
    pub standard_errors: Parameters,
}

impl FitResults {
    /// The diagnostic collections as `(name, values)` pairs.
    pub fn collections(&self) -> [(&'static str, &Parameters); 2] {
        [
            ("coefficients", &self.coefficients),
            ("standard_errors", &self.standard_errors),
        ]
    }
}

/// Everything produced by a successful `fit`, with the inputs that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitState {
    pub results: FitResults,
    pub log_likelihoods: LogLikelihoods,
    pub iterations: usize,
    /// Choosers that entered estimation after filtering.
    pub choosers: usize,
    pub formula: Formulation,
    pub chooser_filters: Vec<FilterExpression>,
    pub alternative_filters: Vec<FilterExpression>,
}

/// Location choice model with an unfitted → fitted lifecycle.
#[derive(Clone, Debug)]
pub struct LocationChoiceModel {
    name: Option<String>,
    chooser_filters: Vec<FilterExpression>,
    alternative_filters: Vec<FilterExpression>,
    predict_alternative_filters: Option<Vec<FilterExpression>>,
    formula: Formulation,
    options: ModelOptions,
    fitted: Option<FitState>,
}

impl LocationChoiceModel {
    /// Creates a model from filter expressions, a formula and a choice-set size.
    pub fn new<S: AsRef<str>>(
        chooser_filters: &[S],
        alternative_filters: &[S],
        formula: &str,
        sample_size: usize,
    ) -> Result<Self> {
        LocationChoiceModelBuilder::new(formula, sample_size)
            .chooser_filters(chooser_filters)
            .alternative_filters(alternative_filters)
            .build()
    }

    /// Start configuring a model.
    pub fn builder(formula: impl Into<String>, sample_size: usize) -> LocationChoiceModelBuilder {
        LocationChoiceModelBuilder::new(formula, sample_size)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn formula(&self) -> &Formulation {
        &self.formula
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Replaces sampling, solver and identity options for later fits.
    /// The current fit state is kept.
    pub fn set_options(&mut self, options: ModelOptions) -> Result<()> {
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn chooser_filters(&self) -> &[FilterExpression] {
        &self.chooser_filters
    }

    pub fn alternative_filters(&self) -> &[FilterExpression] {
        &self.alternative_filters
    }

    /// Alternative filters applied at prediction time.
    pub fn predict_alternative_filters(&self) -> &[FilterExpression] {
        self.predict_alternative_filters
            .as_deref()
            .unwrap_or(&self.alternative_filters)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// State left by the last successful fit.
    pub fn fit_state(&self) -> Result<&FitState> {
        self.fitted.as_ref().ok_or_else(|| LcmError::NotFitted {
            model: self.name.clone().unwrap_or_else(|| "<unnamed>".to_string()),
        })
    }

    /// Coefficients and standard errors from the last successful fit.
    pub fn fit_results(&self) -> Result<&FitResults> {
        Ok(&self.fit_state()?.results)
    }

    pub fn log_likelihoods(&self) -> Result<LogLikelihoods> {
        Ok(self.fit_state()?.log_likelihoods)
    }

    fn interaction_builder(&self) -> InteractionBuilder {
        InteractionBuilder::new(self.options.identity.clone(), self.options.sampling.clone())
    }

    /// Rejects repeated row keys up front when they are the alternative identity.
    fn check_identity(&self, alternatives: &Table) -> Result<()> {
        if self.options.identity == AlternativeIdentity::RowKey {
            if let Some(key) = alternatives.first_duplicate_index() {
                return Err(LcmError::AmbiguousAlternativeIdentity {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Estimates coefficients from observed choices.
    ///
    /// `current_choices[i]` is the alternative id held by chooser row `i`.
    /// Chooser filters and alternative filters are applied first. On error the
    /// previous fit, if any, is kept.
    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        choosers: &Table,
        alternatives: &Table,
        current_choices: &[String],
        rng: &mut R,
    ) -> Result<LogLikelihoods> {
        if current_choices.len() != choosers.nrows() {
            return Err(LcmError::dimension_mismatch(
                "current choices length",
                choosers.nrows(),
                current_choices.len(),
            ));
        }
        self.check_identity(alternatives)?;

        let (choosers, mask) = apply_filters(&self.chooser_filters, choosers)?;
        let current_choices: Vec<String> = current_choices
            .iter()
            .zip(&mask)
            .filter(|&(_, &keep)| keep)
            .map(|(choice, _)| choice.clone())
            .collect();
        let (alternatives, _) = apply_filters(&self.alternative_filters, alternatives)?;
        debug!(
            "fit filters kept {} choosers and {} alternatives",
            choosers.nrows(),
            alternatives.nrows()
        );

        let data = self.interaction_builder().estimation(
            &choosers,
            &alternatives,
            &current_choices,
            rng,
        )?;
        let fit = MnlEstimator::new(self.options.solver.clone()).fit(&data, &self.formula)?;

        let log_likelihoods = fit.log_likelihoods;
        self.fitted = Some(FitState {
            results: FitResults {
                coefficients: fit.coefficients,
                standard_errors: fit.standard_errors,
            },
            log_likelihoods,
            iterations: fit.iterations,
            choosers: fit.choosers,
            formula: self.formula.clone(),
            chooser_filters: self.chooser_filters.clone(),
            alternative_filters: self.alternative_filters.clone(),
        });
        info!(
            "model {} fitted: rho^2 {:.4}",
            self.name.as_deref().unwrap_or("<unnamed>"),
            log_likelihoods.rho_squared
        );
        Ok(log_likelihoods)
    }

    /// Probabilities of each chooser over the predict-time candidate slots.
    pub fn probabilities(
        &self,
        choosers: &Table,
        alternatives: &Table,
    ) -> Result<ChoiceProbabilities> {
        Ok(self.candidates(choosers, alternatives)?.0)
    }

    /// Realizes one choice per chooser, consuming each candidate slot at most once.
    ///
    /// Choosers are not filtered. The returned assignment follows the order of
    /// `choosers`; a chooser is unassigned when no candidate slot is left for
    /// it. Alternative ids come from the configured identity, never from
    /// positions in a repeated table.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        choosers: &Table,
        alternatives: &Table,
        rng: &mut R,
    ) -> Result<ChoiceAssignment> {
        let (probabilities, slot_ids) = self.candidates(choosers, alternatives)?;
        if slot_ids.is_empty() {
            debug!("no alternatives survive the predict filters");
            return Ok(ChoiceAssignment::unassigned(choosers.index().to_vec()));
        }
        let weights = probabilities.expected_demand(slot_ids.len());
        unit_choice(choosers.index(), &slot_ids, &weights, rng)
    }

    /// Filters alternatives, builds the prediction table and evaluates probabilities.
    /// Also returns the logical id of every surviving slot.
    fn candidates(
        &self,
        choosers: &Table,
        alternatives: &Table,
    ) -> Result<(ChoiceProbabilities, Vec<String>)> {
        let state = self.fit_state()?;
        self.check_identity(alternatives)?;

        let (alternatives, _) = apply_filters(self.predict_alternative_filters(), alternatives)?;
        let slot_ids = self.options.identity.resolve(&alternatives)?;
        let data = self.interaction_builder().prediction(choosers, &alternatives)?;

        let design = state.formula.design_matrix(data.table())?;
        let utilities = utilities(&design, state.results.coefficients.values())?;
        let probabilities = situation_probabilities(&utilities, data.partition())?;
        let (partition, positions, ids) = data.into_layout();
        Ok((
            ChoiceProbabilities::new(partition, positions, ids, probabilities),
            slot_ids,
        ))
    }
}

/// Builder that parses filters and the formula before constructing a
/// [`LocationChoiceModel`].
#[derive(Clone, Debug)]
pub struct LocationChoiceModelBuilder {
    formula: String,
    options: ModelOptions,
    chooser_filters: Vec<String>,
    alternative_filters: Vec<String>,
    predict_alternative_filters: Option<Vec<String>>,
    name: Option<String>,
}

impl LocationChoiceModelBuilder {
    pub fn new(formula: impl Into<String>, sample_size: usize) -> Self {
        Self {
            formula: formula.into(),
            options: ModelOptions::default().with_sample_size(sample_size),
            chooser_filters: Vec::new(),
            alternative_filters: Vec::new(),
            predict_alternative_filters: None,
            name: None,
        }
    }

    /// Filters applied to choosers before estimation.
    pub fn chooser_filters<S: AsRef<str>>(mut self, filters: &[S]) -> Self {
        self.chooser_filters = to_strings(filters);
        self
    }

    /// Filters applied to alternatives before estimation, and before
    /// prediction unless [`predict_alternative_filters`](Self::predict_alternative_filters) is set.
    pub fn alternative_filters<S: AsRef<str>>(mut self, filters: &[S]) -> Self {
        self.alternative_filters = to_strings(filters);
        self
    }

    /// Separate alternative filters for prediction.
    pub fn predict_alternative_filters<S: AsRef<str>>(mut self, filters: &[S]) -> Self {
        self.predict_alternative_filters = Some(to_strings(filters));
        self
    }

    /// Read alternative identity from `column` instead of the row labels.
    /// The column holds text or integer-valued numbers; numeric ids are
    /// reported as their integer text, e.g. `"101"`.
    pub fn choice_column(mut self, column: impl Into<String>) -> Self {
        self.options = self.options.with_choice_column(column);
        self
    }

    /// Diagnostic label for logs and errors.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces all options, including sample size and identity.
    pub fn options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<LocationChoiceModel> {
        self.options.validate()?;
        let predict_alternative_filters = match &self.predict_alternative_filters {
            Some(filters) => Some(parse_filters(filters.as_slice())?),
            None => None,
        };
        Ok(LocationChoiceModel {
            name: self.name,
            chooser_filters: parse_filters(self.chooser_filters.as_slice())?,
            alternative_filters: parse_filters(self.alternative_filters.as_slice())?,
            predict_alternative_filters,
            formula: Formulation::new(&self.formula)?,
            options: self.options,
            fitted: None,
        })
    }
}

fn to_strings<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().map(|item| item.as_ref().to_string()).collect()
}
