//! Diagnostics for external reporting.
//!
//! [`FieldDiagnostics`] summarizes what de-identification did to one field;
//! [`sample_distinct_values`] draws a bounded sample of raw values while
//! scanning observations in parallel.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;

use crate::kanon::DeidentifyReport;
use crate::multinomial::Multinomial;
use crate::observation::Observation;
use crate::reservoir::ReservoirSet;

/// Observations handed to each parallel scan task.
const SCAN_CHUNK: usize = 4096;

/// Summary of one field of a built model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiagnostics {
    pub field: String,
    /// Total observed weight.
    pub observations: f64,
    /// Distinct values before de-identification.
    pub observed_support: usize,
    /// Distinct values released.
    pub released_support: usize,
    /// Entropy (nats) of the released marginal.
    pub entropy: f64,
    pub entropy_perc_of_max: f64,
    /// Jensen-Shannon divergence between observed and released marginals.
    pub privacy_divergence: f64,
    pub merged: usize,
    pub fallback_merges: usize,
}

impl FieldDiagnostics {
    pub fn new(
        field: &str,
        observed: &Multinomial<String>,
        released: &Multinomial<String>,
        report: &DeidentifyReport,
    ) -> Self {
        Self {
            field: field.to_string(),
            observations: observed.sum(),
            observed_support: observed.len(),
            released_support: released.len(),
            entropy: released.entropy(),
            entropy_perc_of_max: released.entropy_perc_of_max(),
            privacy_divergence: observed.jenson_shannon_divergence(released),
            merged: report.merged,
            fallback_merges: report.fallback,
        }
    }
}

/// Uniform sample of at most `capacity` distinct raw values of `field`.
///
/// Chunks are scanned in parallel, all feeding one [`ReservoirSet`]; chunk
/// `i` draws from `ChaCha8Rng` seeded with `seed + i`. The result is sorted.
/// Because producers interleave, the exact sample can vary between runs.
pub fn sample_distinct_values(
    observations: &[Observation],
    field: &str,
    capacity: usize,
    seed: u64,
) -> Vec<String> {
    let reservoir = ReservoirSet::new(capacity);
    observations
        .par_chunks(SCAN_CHUNK)
        .enumerate()
        .for_each(|(i, chunk)| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
            for o in chunk.iter().filter(|o| o.field == field) {
                reservoir.try_add(&mut rng, o.value.clone());
            }
        });
    let mut values = reservoir.into_items();
    values.sort();
    values
}
