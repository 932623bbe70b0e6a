//! Multinomial-logit location choice models.
//!
//! This crate places choosers (households, firms) into alternatives (locations,
//! vacant units) with a multinomial-logit (MNL) model. It offers tools to
//!
//! - hold chooser and alternative covariates in labeled tables (`data` module),
//! - restrict either table with declarative row filters (`filter` module),
//! - build long-format chooser × alternative datasets (`interaction` module),
//! - estimate MNL coefficients by maximum likelihood (`estimation` and
//!   `solving` modules), and
//! - realize choices under finite capacity with weighted sampling without
//!   replacement (`choice` module).
//!
//! [`LocationChoiceModel`] ties the pieces together: `fit` filters the inputs,
//! samples estimation choice sets around each observed choice and maximizes the
//! likelihood; `predict` scores every chooser against every remaining
//! alternative slot and hands out slots so that none is used twice.
//!
//! # Quick start
//!
//! ```no_run
//! use lcmrs::data::TableBuilder;
//! use lcmrs::LocationChoiceModel;
//! use rand::rngs::SmallRng;
//! use rand::SeedableRng;
//!
//! let choosers = TableBuilder::range(3)
//!     .numeric("income", vec![40.0, 55.0, 70.0])
//!     .build()
//!     .expect("validated choosers");
//! let ids: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
//! let alternatives = TableBuilder::new(ids)
//!     .index_name("building_id")
//!     .numeric("price", vec![1.0, 1.5, 2.0, 3.0])
//!     .numeric("sqft", vec![0.8, 1.1, 1.4, 2.2])
//!     .build()
//!     .expect("validated alternatives");
//! let observed: Vec<String> = ["a", "c", "d"].iter().map(|s| s.to_string()).collect();
//!
//! let mut model = LocationChoiceModel::builder("price + sqft + income:sqft", 3)
//!     .alternative_filters(&["price < 10"])
//!     .name("household location choice")
//!     .build()
//!     .expect("well-formed model");
//!
//! let mut rng = SmallRng::seed_from_u64(42);
//! let loglik = model
//!     .fit(&choosers, &alternatives, &observed, &mut rng)
//!     .expect("converged");
//! println!("rho squared: {:.3}", loglik.rho_squared);
//!
//! let choices = model
//!     .predict(&choosers, &alternatives, &mut rng)
//!     .expect("fitted model");
//! for (chooser, alternative) in choices.iter() {
//!     println!("{chooser} -> {alternative:?}");
//! }
//! ```

pub mod choice;
pub mod data;
pub mod error;
pub mod estimation;
pub mod filter;
pub mod formulation;
pub mod interaction;
pub mod model;
pub mod options;
pub mod probabilities;
pub mod solving;

pub use choice::{unit_choice, ChoiceAssignment};
pub use error::{LcmError, Result};
pub use estimation::{LogLikelihoods, MnlEstimator, MnlFit, Parameters};
pub use model::{FitResults, FitState, LocationChoiceModel, LocationChoiceModelBuilder};
pub use options::{AlternativeIdentity, ModelOptions, SamplingOptions};
pub use solving::{LikelihoodSolver, NewtonRaphson, SolverOptions, SolverSummary};
