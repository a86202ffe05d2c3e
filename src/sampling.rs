//! Compiled O(1) samplers over a fixed categorical distribution.
//!
//! [`SamplingTable`] uses Walker's alias method (Vose's construction).
//! Each bucket holds one key's own probability and an alias key; a uniform
//! bucket index plus one comparison yields a weighted draw in O(1),
//! regardless of how skewed the weights are.
//!
//! ## Construction
//!
//! Weights are scaled so the average is 1. Buckets below 1 are paired with
//! buckets at or above 1 until everything is resolved; leftovers get
//! probability 1 and alias themselves.
//!
//! Keys are sorted before construction, so a given distribution always
//! compiles to the same table and seeded draws are reproducible.
//!
//! ## Properties
//!
//! - **Build**: O(n log n) (sort) + O(n) (alias pass)
//! - **Sample**: O(1), weighted or uniform
//! - Immutable after construction; `Sync` when `K` is.

use rand::prelude::*;

use crate::error::{Error, Result};
use crate::multinomial::Multinomial;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    prob: f64,
    alias: usize,
}

/// Alias table over keys of type `K`.
#[derive(Debug, Clone)]
pub struct SamplingTable<K> {
    keys: Vec<K>,
    /// Normalized weight per key, parallel to `keys`.
    probs: Vec<f64>,
    buckets: Vec<Bucket>,
}

impl<K> SamplingTable<K>
where
    K: Ord + Clone,
{
    /// Build from raw `(key, count)` entries. Repeated keys are summed;
    /// zero-weight keys are dropped from the support.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidWeight`] for a negative or non-finite weight
    /// - [`Error::DegenerateDistribution`] if nothing has positive weight
    pub fn from_count_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut entries: Vec<(K, f64)> = entries.into_iter().collect();
        for &(_, w) in &entries {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidWeight(w));
            }
        }
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut keys: Vec<K> = Vec::with_capacity(entries.len());
        let mut weights: Vec<f64> = Vec::with_capacity(entries.len());
        for (k, w) in entries {
            if keys.last() == Some(&k) {
                if let Some(last) = weights.last_mut() {
                    *last += w;
                }
            } else {
                keys.push(k);
                weights.push(w);
            }
        }

        let (keys, weights): (Vec<K>, Vec<f64>) = keys
            .into_iter()
            .zip(weights)
            .filter(|(_, w)| *w > 0.0)
            .unzip();
        Self::build(keys, weights)
    }

    /// Build from a normalized distribution.
    ///
    /// # Errors
    ///
    /// [`Error::NotNormalized`] if the weights do not sum to 1.
    pub fn from_normalized(dist: &Multinomial<K>) -> Result<Self>
    where
        K: std::hash::Hash + Send + Sync,
    {
        if !dist.is_normalized() {
            return Err(Error::NotNormalized(dist.sum()));
        }
        Self::from_count_entries(dist.iter().map(|(k, w)| (k.clone(), w)))
    }

    /// Build from any distribution; weights need not be normalized.
    pub fn from_multinomial(dist: &Multinomial<K>) -> Result<Self>
    where
        K: std::hash::Hash + Send + Sync,
    {
        Self::from_count_entries(dist.iter().map(|(k, w)| (k.clone(), w)))
    }

    fn build(keys: Vec<K>, weights: Vec<f64>) -> Result<Self> {
        let n = keys.len();
        let sum: f64 = weights.iter().sum();
        if n == 0 || !sum.is_finite() || sum <= 0.0 {
            return Err(Error::DegenerateDistribution);
        }
        let probs: Vec<f64> = weights.iter().map(|w| w / sum).collect();

        // Scale so average is 1.
        let mut scaled: Vec<f64> = probs.iter().map(|p| p * n as f64).collect();
        let mut buckets: Vec<Bucket> = (0..n)
            .map(|i| Bucket {
                prob: 1.0,
                alias: i,
            })
            .collect();

        let mut small: Vec<usize> = Vec::with_capacity(n);
        let mut large: Vec<usize> = Vec::with_capacity(n);
        for (i, &p) in scaled.iter().enumerate() {
            if p < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        while let (Some(&s), Some(&l)) = (small.last(), large.last()) {
            small.pop();
            large.pop();
            buckets[s] = Bucket {
                prob: scaled[s],
                alias: l,
            };
            scaled[l] = (scaled[l] + scaled[s]) - 1.0;
            if scaled[l] < 1.0 - 1e-12 {
                small.push(l);
            } else {
                large.push(l);
            }
        }
        // Leftovers keep prob 1 / alias self from initialization.
        for i in small.into_iter().chain(large) {
            buckets[i] = Bucket {
                prob: 1.0,
                alias: i,
            };
        }

        Ok(Self {
            keys,
            probs,
            buckets,
        })
    }

    /// Draw a key with probability proportional to its weight.
    pub fn sample_weighted<R: Rng + ?Sized>(&self, rng: &mut R) -> &K {
        &self.keys[self.sample_weighted_index(rng)]
    }

    /// Draw a key index (into [`Self::keys`]) with probability proportional
    /// to its weight.
    pub fn sample_weighted_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let i = rng.random_range(0..self.buckets.len());
        let u: f64 = rng.random();
        let bucket = self.buckets[i];
        if u < bucket.prob {
            i
        } else {
            bucket.alias
        }
    }

    /// Draw a key uniformly, ignoring weights.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> &K {
        &self.keys[rng.random_range(0..self.keys.len())]
    }

    /// Keys in the support, sorted.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Normalized probability of `key`, 0 if absent.
    pub fn probability(&self, key: &K) -> f64 {
        self.keys
            .binary_search(key)
            .map(|i| self.probs[i])
            .unwrap_or(0.0)
    }

    /// Number of keys in the support (never 0).
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn fixture() -> SamplingTable<&'static str> {
        SamplingTable::from_count_entries([("a", 100.0), ("b", 60.0), ("c", 30.0), ("d", 10.0)])
            .expect("valid weights")
    }

    fn frequencies<'a>(draws: impl Iterator<Item = &'a &'static str>, n: usize) -> HashMap<&'static str, f64> {
        let mut out = HashMap::new();
        for k in draws {
            *out.entry(*k).or_insert(0.0) += 1.0 / n as f64;
        }
        out
    }

    #[test]
    fn weighted_draws_match_weights() {
        let table = fixture();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 10_000;
        let freq = frequencies((0..n).map(|_| table.sample_weighted(&mut rng)), n);
        for (k, p) in [("a", 0.5), ("b", 0.3), ("c", 0.15), ("d", 0.05)] {
            let got = freq.get(k).copied().unwrap_or(0.0);
            assert!((got - p).abs() < 0.03, "{k}: {got} vs {p}");
        }
    }

    #[test]
    fn uniform_draws_ignore_weights() {
        let table = fixture();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = 10_000;
        let freq = frequencies((0..n).map(|_| table.sample_uniform(&mut rng)), n);
        for k in ["a", "b", "c", "d"] {
            let got = freq.get(k).copied().unwrap_or(0.0);
            assert!((got - 0.25).abs() < 0.03, "{k}: {got}");
        }
    }

    #[test]
    fn heavy_skew_chi_squared() {
        // One dominant key and many tiny ones still converge.
        let mut entries = vec![(0usize, 10_000.0)];
        entries.extend((1..50).map(|i| (i, 1.0 + i as f64)));
        let table = SamplingTable::from_count_entries(entries.clone()).unwrap();

        let draws = 200_000;
        let mut counts = vec![0usize; 50];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..draws {
            counts[*table.sample_weighted(&mut rng)] += 1;
        }
        let total: f64 = entries.iter().map(|(_, w)| w).sum();
        let chi2: f64 = entries
            .iter()
            .map(|&(k, w)| {
                let expected = draws as f64 * w / total;
                let diff = counts[k] as f64 - expected;
                diff * diff / expected
            })
            .sum();
        // df = 49
        assert!(chi2 < 120.0, "chi2={chi2:.2} counts={counts:?}");
    }

    #[test]
    fn buckets_reconstruct_probabilities() {
        let weights: Vec<(usize, f64)> = (0..500).map(|i| (i, 1.0 / (1.0 + i as f64))).collect();
        let table = SamplingTable::from_count_entries(weights).unwrap();
        let n = table.len() as f64;

        let mut mass = vec![0.0; table.len()];
        for (i, b) in table.buckets.iter().enumerate() {
            assert!(b.alias < table.len());
            mass[i] += b.prob / n;
            mass[b.alias] += (1.0 - b.prob) / n;
        }
        for (i, m) in mass.iter().enumerate() {
            assert!((m - table.probs[i]).abs() < 1e-9, "key {i}: {m} vs {}", table.probs[i]);
        }
    }

    #[test]
    fn degenerate_inputs_fail() {
        let empty: Vec<(u8, f64)> = vec![];
        assert!(matches!(
            SamplingTable::from_count_entries(empty),
            Err(Error::DegenerateDistribution)
        ));
        assert!(matches!(
            SamplingTable::from_count_entries([(1u8, 0.0), (2, 0.0)]),
            Err(Error::DegenerateDistribution)
        ));
        assert!(matches!(
            SamplingTable::from_count_entries([(1u8, -1.0)]),
            Err(Error::InvalidWeight(_))
        ));
    }

    #[test]
    fn singleton_always_returns_its_key() {
        let table = SamplingTable::from_count_entries([("only", 3.0), ("zero", 0.0)]).unwrap();
        assert_eq!(table.len(), 1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(*table.sample_weighted(&mut rng), "only");
            assert_eq!(*table.sample_uniform(&mut rng), "only");
        }
    }

    #[test]
    fn repeated_keys_are_summed() {
        let table = SamplingTable::from_count_entries([("a", 1.0), ("b", 2.0), ("a", 1.0)]).unwrap();
        assert_eq!(table.keys(), &["a", "b"]);
        assert!((table.probability(&"a") - 0.5).abs() < 1e-12);
        assert_eq!(table.probability(&"zz"), 0.0);
    }

    #[test]
    fn from_normalized_requires_normalized() {
        let m = Multinomial::from_entries([("a", 2.0), ("b", 2.0)]).unwrap();
        assert!(matches!(SamplingTable::from_normalized(&m), Err(Error::NotNormalized(_))));
        let table = SamplingTable::from_normalized(&m.normalized()).unwrap();
        assert_eq!(table.len(), 2);
    }
}
