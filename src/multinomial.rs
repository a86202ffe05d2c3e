//! Categorical distributions over arbitrary keys.
//!
//! [`MutableMultinomial`] accumulates non-negative weights during counting;
//! [`Multinomial`] is the frozen snapshot used for sampling and diagnostics.
//! The mutable form derefs to the immutable read API.
//!
//! All entropies and divergences are in nats. Zero-probability terms
//! contribute zero (the `0 · ln 0 = 0` convention); no operation here
//! raises on a log of zero.
//!
//! Whole-distribution reductions (sums, entropy, parallel counting) are
//! map-reduce over rayon, so aggregates are exact regardless of how the
//! entries are partitioned.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::Deref;

use rayon::prelude::*;

use crate::error::{Error, Result};

/// Tolerance for [`Multinomial::is_normalized`].
pub const NORMALIZED_TOLERANCE: f64 = 1e-9;

/// Immutable categorical distribution.
#[derive(Debug, Clone)]
pub struct Multinomial<K> {
    weights: HashMap<K, f64>,
}

impl<K: Eq + Hash> PartialEq for Multinomial<K> {
    fn eq(&self, other: &Self) -> bool {
        self.weights == other.weights
    }
}

impl<K> Default for Multinomial<K> {
    fn default() -> Self {
        Self {
            weights: HashMap::new(),
        }
    }
}

pub(crate) fn check_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(Error::InvalidWeight(weight));
    }
    Ok(())
}

impl<K> Multinomial<K>
where
    K: Eq + Hash + Clone + Ord + Send + Sync,
{
    /// Build from `(key, weight)` pairs, summing repeated keys.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut m = MutableMultinomial::new();
        for (k, w) in entries {
            m.add(k, w)?;
        }
        Ok(m.into_immutable())
    }

    /// Weight of `key`, 0 if absent.
    pub fn get(&self, key: &K) -> f64 {
        self.weights.get(key).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.weights.contains_key(key)
    }

    /// Number of keys in the support.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.weights.iter().map(|(k, w)| (k, *w))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.weights.keys()
    }

    /// Entries sorted by key.
    pub fn sorted_entries(&self) -> Vec<(K, f64)> {
        let mut out: Vec<(K, f64)> = self.weights.iter().map(|(k, w)| (k.clone(), *w)).collect();
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        out
    }

    /// Total weight.
    pub fn sum(&self) -> f64 {
        self.weights.par_iter().map(|(_, w)| *w).sum()
    }

    /// Whether the weights sum to 1 within [`NORMALIZED_TOLERANCE`].
    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= NORMALIZED_TOLERANCE
    }

    /// A copy rescaled to sum to 1. Empty (or all-zero) stays as is.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum <= 0.0 {
            return self.clone();
        }
        Self {
            weights: self
                .weights
                .iter()
                .map(|(k, w)| (k.clone(), w / sum))
                .collect(),
        }
    }

    /// Highest-weight key; ties go to the smallest key.
    pub fn best(&self) -> Option<&K> {
        self.weights
            .iter()
            .max_by(|(ka, wa), (kb, wb)| wa.total_cmp(wb).then_with(|| kb.cmp(ka)))
            .map(|(k, _)| k)
    }

    /// Shannon entropy in nats of the normalized distribution.
    pub fn entropy(&self) -> f64 {
        let sum = self.sum();
        if sum <= 0.0 {
            return 0.0;
        }
        self.weights
            .par_iter()
            .map(|(_, &w)| {
                let p = w / sum;
                if p > 0.0 {
                    -p * p.ln()
                } else {
                    0.0
                }
            })
            .sum()
    }

    /// Entropy divided by the entropy of a uniform distribution over the same
    /// support. 0 for supports of size 0 or 1.
    pub fn entropy_perc_of_max(&self) -> f64 {
        let n = self.weights.values().filter(|w| **w > 0.0).count();
        if n <= 1 {
            return 0.0;
        }
        (self.entropy() / (n as f64).ln()).clamp(0.0, 1.0)
    }

    /// KL(self ‖ other) in nats over the union of supports.
    ///
    /// Infinite when `self` puts mass on a key `other` gives zero.
    pub fn kullback_liebler_to(&self, other: &Self) -> f64 {
        let (sp, sq) = (self.sum(), other.sum());
        if sp <= 0.0 {
            return 0.0;
        }
        let mut total = 0.0;
        for (k, &w) in &self.weights {
            let p = w / sp;
            if p <= 0.0 {
                continue;
            }
            let q = if sq > 0.0 { other.get(k) / sq } else { 0.0 };
            if q <= 0.0 {
                return f64::INFINITY;
            }
            total += p * (p / q).ln();
        }
        total.max(0.0)
    }

    /// Jensen-Shannon divergence in nats. Symmetric, bounded by `ln 2`.
    pub fn jenson_shannon_divergence(&self, other: &Self) -> f64 {
        let (sp, sq) = (self.sum(), other.sum());
        let union: HashSet<&K> = self.weights.keys().chain(other.weights.keys()).collect();
        let mut keys: Vec<&K> = union.into_iter().collect();
        keys.sort();

        let half_term = |a: f64, m: f64| if a > 0.0 { a * (a / m).ln() } else { 0.0 };
        let total: f64 = keys
            .into_iter()
            .map(|k| {
                let p = if sp > 0.0 { self.get(k) / sp } else { 0.0 };
                let q = if sq > 0.0 { other.get(k) / sq } else { 0.0 };
                let m = 0.5 * (p + q);
                if m <= 0.0 {
                    return 0.0;
                }
                0.5 * (half_term(p, m) + half_term(q, m))
            })
            .sum();
        total.clamp(0.0, std::f64::consts::LN_2)
    }

    /// Re-key every entry through `f`, summing weights of colliding keys.
    pub fn map_keys<J, F>(&self, mut f: F) -> Multinomial<J>
    where
        J: Eq + Hash + Clone + Ord + Send + Sync,
        F: FnMut(&K) -> J,
    {
        let mut weights: HashMap<J, f64> = HashMap::with_capacity(self.weights.len());
        for (k, w) in &self.weights {
            *weights.entry(f(k)).or_insert(0.0) += *w;
        }
        Multinomial { weights }
    }
}

/// Accumulating categorical distribution.
#[derive(Debug, Clone)]
pub struct MutableMultinomial<K> {
    inner: Multinomial<K>,
}

impl<K: Eq + Hash> PartialEq for MutableMultinomial<K> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<K> Default for MutableMultinomial<K> {
    fn default() -> Self {
        Self {
            inner: Multinomial::default(),
        }
    }
}

impl<K> Deref for MutableMultinomial<K> {
    type Target = Multinomial<K>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<K> MutableMultinomial<K>
where
    K: Eq + Hash + Clone + Ord + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` (≥ 0) to `key`.
    pub fn add(&mut self, key: K, weight: f64) -> Result<()> {
        check_weight(weight)?;
        *self.inner.weights.entry(key).or_insert(0.0) += weight;
        Ok(())
    }

    /// Overwrite the weight of `key`.
    pub fn set(&mut self, key: K, weight: f64) -> Result<()> {
        check_weight(weight)?;
        self.inner.weights.insert(key, weight);
        Ok(())
    }

    /// Count occurrences in parallel: each rayon task folds into its own map,
    /// then the partial maps are merged.
    pub fn count_parallel(items: &[K]) -> Self {
        let weights = items
            .par_iter()
            .fold(HashMap::new, |mut acc: HashMap<K, f64>, k| {
                *acc.entry(k.clone()).or_insert(0.0) += 1.0;
                acc
            })
            .reduce(HashMap::new, |a, b| {
                let (mut big, small) = if a.len() >= b.len() { (a, b) } else { (b, a) };
                for (k, w) in small {
                    *big.entry(k).or_insert(0.0) += w;
                }
                big
            });
        Self {
            inner: Multinomial { weights },
        }
    }

    /// Add every entry of `other`.
    pub fn add_all(&mut self, other: &Multinomial<K>) {
        for (k, w) in &other.weights {
            *self.inner.weights.entry(k.clone()).or_insert(0.0) += *w;
        }
    }

    /// Rescale to sum to 1, preserving ratios. No-op when empty or all-zero.
    pub fn normalize(&mut self) -> &mut Self {
        let sum = self.inner.sum();
        if sum > 0.0 {
            for w in self.inner.weights.values_mut() {
                *w /= sum;
            }
        }
        self
    }

    /// Fold in `other` (normalized first), scaled by `exp(-H(other))`, the
    /// inverse of its perplexity. A point mass contributes weight 1, a uniform
    /// distribution over `n` keys contributes `1/n`.
    pub fn add_entropy_scaled(&mut self, other: &Multinomial<K>) {
        let sum = other.sum();
        if sum <= 0.0 {
            return;
        }
        let scale = (-other.entropy()).exp() / sum;
        for (k, w) in &other.weights {
            *self.inner.weights.entry(k.clone()).or_insert(0.0) += w * scale;
        }
    }

    /// Snapshot the current weights.
    pub fn to_immutable(&self) -> Multinomial<K> {
        self.inner.clone()
    }

    pub fn into_immutable(self) -> Multinomial<K> {
        self.inner
    }
}
