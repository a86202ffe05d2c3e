//! `resynth`: privacy-preserving categorical resampling.
//!
//! Learns empirical distributions over field values (names, address tokens,
//! ...), de-identifies them to k-anonymity, and resamples synthetic values in
//! dependency order.
//!
//! Exposed modules:
//! - `vocabulary`: index ↔ value bijection with transitive remapping.
//! - `multinomial`: categorical distributions, entropy and divergences.
//! - `sampling`: alias-method tables for O(1) weighted/uniform draws.
//! - `dirichlet`: posterior (Dirichlet) resampling of smoothed tables.
//! - `graph`: field dependency DAGs, topological sort and partition.
//! - `kanon`: k-anonymity de-identification of a vocabulary.
//! - `reservoir`: concurrent reservoir sample of distinct items.
//! - `model`: build phase (counting, sanitizing) and serve phase (generation).
//! - `diagnostics`, `prior`, `tag`, `observation`, `config`: supporting pieces.

#![forbid(unsafe_code)]

pub mod config;
pub mod diagnostics;
pub mod dirichlet;
pub mod error;
pub mod graph;
pub mod kanon;
pub mod model;
pub mod multinomial;
pub mod observation;
pub mod prior;
pub mod reservoir;
pub mod sampling;
pub mod tag;
pub mod vocabulary;

pub use config::ModelConfig;
pub use diagnostics::{sample_distinct_values, FieldDiagnostics};
pub use dirichlet::{CachedPosterior, DirichletSampler};
pub use error::{Error, Result};
pub use graph::{topological_roots, topological_sort, Dag};
pub use kanon::{
    AnyMerge, BlockingStrategy, DeidentifyReport, KAnonDeidentifier, MergePolicy, NGramBlocking,
    ShapePolicy,
};
pub use model::{FieldDistribution, FieldModel, Generator, Model, ModelBuilder, Record};
pub use multinomial::{Multinomial, MutableMultinomial};
pub use observation::{fields, joint_key, IdentityReducer, Observation, ValueReducer};
pub use prior::{load_prior, load_prior_file};
pub use reservoir::ReservoirSet;
pub use sampling::SamplingTable;
pub use vocabulary::{Vocabulary, UNKNOWN_INDEX};
