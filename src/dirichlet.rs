//! Dirichlet posterior resampling.
//!
//! Additive smoothing turns counts `c_i` into the fixed distribution
//! `(c_i + α) / Σ(c_j + α)`. [`DirichletSampler`] instead draws a fresh
//! distribution from `Dir(c + α)` on every call, via independent
//! `Gamma(c_i + α, 1)` variates normalized by their sum. The mean of those
//! draws is the additively smoothed distribution.
//!
//! [`CachedPosterior`] holds one draw for a batch of samples and redraws
//! after a fixed number of uses.

use rand::prelude::*;
use rand_distr::{Distribution, Gamma};

use crate::error::{Error, Result};
use crate::multinomial::{Multinomial, MutableMultinomial};
use crate::sampling::SamplingTable;

/// Posterior sampler over an empirical count distribution.
#[derive(Debug, Clone)]
pub struct DirichletSampler<K> {
    keys: Vec<K>,
    gammas: Vec<Gamma<f64>>,
    alphas: Vec<f64>,
}

impl<K> DirichletSampler<K>
where
    K: Ord + Clone + std::hash::Hash + Send + Sync,
{
    /// Build from raw counts and a uniform pseudo-count `hyper_prior`.
    ///
    /// Keys whose concentration `count + hyper_prior` is zero are left out.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for a negative or non-finite hyper-prior
    /// - [`Error::DegenerateDistribution`] if no key has positive concentration
    pub fn new(empirical: &Multinomial<K>, hyper_prior: f64) -> Result<Self> {
        if !hyper_prior.is_finite() || hyper_prior < 0.0 {
            return Err(Error::config(format!(
                "hyper_prior must be finite and >= 0 (got {hyper_prior})"
            )));
        }
        let mut keys = Vec::with_capacity(empirical.len());
        let mut alphas = Vec::with_capacity(empirical.len());
        let mut gammas = Vec::with_capacity(empirical.len());
        for (k, count) in empirical.sorted_entries() {
            let alpha = count + hyper_prior;
            if alpha <= 0.0 {
                continue;
            }
            let gamma = Gamma::new(alpha, 1.0).map_err(|e| Error::config(e.to_string()))?;
            keys.push(k);
            alphas.push(alpha);
            gammas.push(gamma);
        }
        if keys.is_empty() {
            return Err(Error::DegenerateDistribution);
        }
        Ok(Self {
            keys,
            gammas,
            alphas,
        })
    }

    /// The additively smoothed distribution (the posterior mean).
    pub fn smoothed(&self) -> Result<Multinomial<K>> {
        let entries = self.keys.iter().cloned().zip(self.alphas.iter().copied());
        Ok(Multinomial::from_entries(entries)?.normalized())
    }

    /// One posterior realization as a distribution.
    pub fn sample_distribution<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Multinomial<K>> {
        let draws = self.draw(rng)?;
        let mut m = MutableMultinomial::new();
        for (k, w) in self.keys.iter().cloned().zip(draws) {
            m.add(k, w)?;
        }
        m.normalize();
        Ok(m.into_immutable())
    }

    /// One posterior realization compiled into a sampling table.
    pub fn sample_table<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SamplingTable<K>> {
        let draws = self.draw(rng)?;
        SamplingTable::from_count_entries(self.keys.iter().cloned().zip(draws))
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        let draws: Vec<f64> = self.gammas.iter().map(|g| g.sample(rng)).collect();
        if draws.iter().all(|&d| d <= 0.0) {
            // Every variate underflowed; only possible with tiny concentrations.
            let best = self
                .alphas
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i)
                .ok_or(Error::DegenerateDistribution)?;
            let mut point = vec![0.0; draws.len()];
            point[best] = 1.0;
            return Ok(point);
        }
        Ok(draws)
    }

    /// Number of keys with positive concentration.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A posterior draw reused for `redraw_every` samples before being replaced.
#[derive(Debug, Clone)]
pub struct CachedPosterior<K> {
    sampler: DirichletSampler<K>,
    redraw_every: usize,
    remaining: usize,
    table: Option<SamplingTable<K>>,
}

impl<K> CachedPosterior<K>
where
    K: Ord + Clone + std::hash::Hash + Send + Sync,
{
    pub fn new(sampler: DirichletSampler<K>, redraw_every: usize) -> Self {
        Self {
            sampler,
            redraw_every: redraw_every.max(1),
            remaining: 0,
            table: None,
        }
    }

    /// Draw one key from the current posterior table, redrawing it first if
    /// its batch is used up.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&K> {
        if self.remaining == 0 || self.table.is_none() {
            tracing::trace!(keys = self.sampler.len(), "redrawing posterior table");
            self.table = Some(self.sampler.sample_table(rng)?);
            self.remaining = self.redraw_every;
        }
        self.remaining -= 1;
        match &self.table {
            Some(table) => Ok(table.sample_weighted(rng)),
            None => Err(Error::DegenerateDistribution),
        }
    }
}
