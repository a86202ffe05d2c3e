//! Reservoir sampling over distinct items.
//!
//! Maintains a uniform sample of at most `capacity` *distinct* items from a
//! stream of unknown length that may repeat items.
//!
//! Uses **Algorithm R** (Vitter, 1985) over the stream of first occurrences:
//! the Nth distinct item is kept unconditionally while the reservoir has room,
//! and otherwise replaces a uniformly chosen slot with probability
//! `capacity / N`. Repeats are ignored and do not advance `N`.
//!
//! [`ReservoirSet`] is shared by reference between producers; each
//! [`ReservoirSet::try_add`] runs under one `parking_lot` mutex.
//!
//! ## References
//!
//! - Vitter (1985): reservoir sampling “Algorithm R”.
//!
//! Notes:
//! - Distinctness is tracked over the whole stream, so memory grows with the
//!   number of distinct items seen, not just with `capacity`.

use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::Mutex;
use rand::prelude::*;

#[derive(Debug)]
struct Inner<T> {
    seen: HashSet<T>,
    items: Vec<T>,
}

/// A concurrently fillable uniform sample of distinct items.
#[derive(Debug)]
pub struct ReservoirSet<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
}

impl<T> ReservoirSet<T>
where
    T: Eq + Hash + Clone,
{
    /// Create a reservoir that keeps at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                items: Vec::with_capacity(capacity),
            }),
        }
    }

    /// Offer an item from the stream.
    ///
    /// Returns `true` if the item entered the reservoir. Repeats of an item
    /// already seen return `false` without consuming randomness.
    pub fn try_add<R: Rng + ?Sized>(&self, rng: &mut R, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.seen.contains(&item) {
            return false;
        }
        inner.seen.insert(item.clone());
        let n = inner.seen.len();

        if self.capacity == 0 {
            return false;
        }
        if inner.items.len() < self.capacity {
            inner.items.push(item);
            return true;
        }

        // Algorithm R: keep the Nth distinct item with probability capacity / N.
        let j = rng.random_range(0..n);
        if j < self.capacity {
            inner.items[j] = item;
            return true;
        }
        false
    }

    /// Copy of the current sample (size ≤ capacity).
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().items.clone()
    }

    /// Consume the reservoir, returning the sample.
    pub fn into_items(self) -> Vec<T> {
        self.inner.into_inner().items
    }

    /// Number of distinct items observed so far.
    pub fn distinct_seen(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rayon::prelude::*;

    #[test]
    fn keeps_capacity_items_and_ignores_repeats() {
        let r = ReservoirSet::new(5);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for i in 0..100 {
            r.try_add(&mut rng, i % 40);
        }
        assert_eq!(r.len(), 5);
        assert_eq!(r.distinct_seen(), 40);

        let set: HashSet<_> = r.snapshot().into_iter().collect();
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn repeats_do_not_consume_randomness() {
        let a = ReservoirSet::new(3);
        let b = ReservoirSet::new(3);
        let mut ra = ChaCha8Rng::seed_from_u64(5);
        let mut rb = ChaCha8Rng::seed_from_u64(5);
        for i in 0..50 {
            a.try_add(&mut ra, i);
            b.try_add(&mut rb, i);
            b.try_add(&mut rb, i);
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn deterministic_for_a_fixed_source() {
        let run = |seed| {
            let r = ReservoirSet::new(10);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for i in 0..1000 {
                r.try_add(&mut rng, i);
            }
            r.into_items()
        };
        assert_eq!(run(17), run(17));
        assert_ne!(run(17), run(18));
    }

    #[test]
    fn distribution_uniform() {
        // Deterministic chi-squared smoke test for “looks roughly uniform”.
        let n = 100;
        let k = 10;
        let trials = 5_000;
        let mut counts = vec![0; n];

        for t in 0..trials {
            let r = ReservoirSet::new(k);
            let mut rng = ChaCha8Rng::seed_from_u64(t as u64);
            for i in 0..n {
                r.try_add(&mut rng, i);
                // repeats must not bias anything
                r.try_add(&mut rng, i / 2);
            }
            for item in r.into_items() {
                counts[item] += 1;
            }
        }

        let expected = trials as f64 * (k as f64 / n as f64);
        let chi2: f64 = counts
            .iter()
            .map(|&c| {
                let diff = c as f64 - expected;
                (diff * diff) / expected
            })
            .sum();

        // df = n-1 = 99; conservative cutoff.
        assert!(
            chi2 < 250.0,
            "chi2 too large (chi2={chi2:.2}, expected~{}). counts={counts:?}",
            n - 1
        );
    }

    #[test]
    fn concurrent_producers() {
        let r = ReservoirSet::new(16);
        (0..8u64).into_par_iter().for_each(|p| {
            let mut rng = ChaCha8Rng::seed_from_u64(p);
            for i in 0..500u64 {
                r.try_add(&mut rng, (p * 1000 + i) % 2000);
            }
        });
        assert_eq!(r.len(), 16);
        assert!(r.distinct_seen() <= 2000);
        assert!(r.distinct_seen() >= 500);
    }

    #[test]
    fn zero_capacity_discards() {
        let r = ReservoirSet::new(0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(!r.try_add(&mut rng, 1));
        assert!(r.is_empty());
        assert_eq!(r.distinct_seen(), 1);
    }
}
