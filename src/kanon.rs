//! k-anonymity de-identification of a vocabulary.
//!
//! After [`KAnonDeidentifier::deidentify`], every live value's aggregate
//! frequency (its own count plus the counts of everything merged into it) is
//! at least `k`. Rare values are folded into a similar, sufficiently common
//! value:
//!
//! 1. Live values are visited in ascending aggregate frequency (ties by value).
//! 2. For a value below `k`, a [`BlockingStrategy`] yields keys; every live
//!    value sharing a key is a candidate. Blocks over the size cap are
//!    skipped unless the value has nothing smaller.
//! 3. Among candidates at or above `k` that the [`MergePolicy`] accepts, the
//!    one at minimum edit distance wins (ties: larger aggregate, then smaller
//!    value).
//! 4. With no candidate, the value falls back onto the most frequent other
//!    live value, preferring policy-compatible ones.
//!
//! Merges go through [`Vocabulary::update_index_value`], so chains collapse
//! transitively. A vocabulary that already satisfies the bound is left
//! untouched.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::tag::split_tag;
use crate::vocabulary::Vocabulary;

/// Produces cheap keys; values sharing a key are compared for merging.
pub trait BlockingStrategy {
    fn blocking_keys(&self, value: &str) -> Vec<String>;
}

/// Character n-grams of the lowercased value padded with `^`/`$`.
///
/// Tagged values prefix every key with their tag, so blocks never span a tag
/// boundary.
#[derive(Debug, Clone)]
pub struct NGramBlocking {
    n: usize,
}

impl NGramBlocking {
    pub fn new(n: usize) -> Self {
        Self { n: n.max(1) }
    }
}

impl Default for NGramBlocking {
    fn default() -> Self {
        Self::new(2)
    }
}

impl BlockingStrategy for NGramBlocking {
    fn blocking_keys(&self, value: &str) -> Vec<String> {
        let (prefix, body) = match split_tag(value) {
            Some((tag, rest)) => (format!("{tag}\u{1f}"), rest),
            None => (String::new(), value),
        };
        let padded: Vec<char> = std::iter::once('^')
            .chain(body.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once('$'))
            .collect();
        if padded.len() <= self.n {
            let gram: String = padded.iter().collect();
            return vec![prefix + &gram];
        }
        let mut seen = HashSet::new();
        padded
            .windows(self.n)
            .map(|w| {
                let mut key = prefix.clone();
                key.extend(w.iter());
                key
            })
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }
}

/// Decides whether `source` may be folded into `target`.
pub trait MergePolicy {
    fn compatible(&self, source: &str, target: &str) -> bool;
}

/// Accepts a merge only between values with the same tag (or both literal)
/// and the same character-class shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapePolicy;

impl MergePolicy for ShapePolicy {
    fn compatible(&self, source: &str, target: &str) -> bool {
        match (split_tag(source), split_tag(target)) {
            (Some((a, va)), Some((b, vb))) => a == b && shape(va) == shape(vb),
            (None, None) => shape(source) == shape(target),
            _ => false,
        }
    }
}

/// Accepts every merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMerge;

impl MergePolicy for AnyMerge {
    fn compatible(&self, _source: &str, _target: &str) -> bool {
        true
    }
}

/// Collapse a value to runs of character classes: letters `a`, digits `9`,
/// whitespace ` `, anything else kept as is. `"Apt 12B"` → `"a 9a"`.
pub fn shape(value: &str) -> String {
    let mut out = String::new();
    for c in value.chars() {
        let class = if c.is_alphabetic() {
            'a'
        } else if c.is_numeric() {
            '9'
        } else if c.is_whitespace() {
            ' '
        } else {
            c
        };
        if !out.ends_with(class) {
            out.push(class);
        }
    }
    out
}

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for j in 1..=b.len() {
            let cost = usize::from(ca != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Outcome of a de-identification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeidentifyReport {
    /// Values merged onto a blocking candidate.
    pub merged: usize,
    /// Values merged through the fallback.
    pub fallback: usize,
    /// Live values afterwards.
    pub retained: usize,
}

/// Default cap on the number of values in a block scanned for candidates.
pub const DEFAULT_MAX_BLOCK: usize = 512;

/// Merges rare vocabulary values until every live value has aggregate
/// frequency ≥ k.
#[derive(Debug, Clone)]
pub struct KAnonDeidentifier<B = NGramBlocking, P = ShapePolicy> {
    k: f64,
    max_block: usize,
    blocking: B,
    policy: P,
}

impl KAnonDeidentifier {
    /// Default n-gram blocking and shape policy.
    pub fn new(k: f64) -> Result<Self> {
        if !k.is_finite() || k <= 0.0 {
            return Err(Error::config(format!("k must be finite and > 0 (got {k})")));
        }
        Ok(Self {
            k,
            max_block: DEFAULT_MAX_BLOCK,
            blocking: NGramBlocking::default(),
            policy: ShapePolicy,
        })
    }
}

impl<B, P> KAnonDeidentifier<B, P>
where
    B: BlockingStrategy,
    P: MergePolicy,
{
    pub fn with_blocking<B2: BlockingStrategy>(self, blocking: B2) -> KAnonDeidentifier<B2, P> {
        KAnonDeidentifier {
            k: self.k,
            max_block: self.max_block,
            blocking,
            policy: self.policy,
        }
    }

    pub fn with_policy<P2: MergePolicy>(self, policy: P2) -> KAnonDeidentifier<B, P2> {
        KAnonDeidentifier {
            k: self.k,
            max_block: self.max_block,
            blocking: self.blocking,
            policy,
        }
    }

    /// Skip blocks holding more than `max_block` values when looking for
    /// candidates. If every block of a value is larger, only the smallest
    /// one is scanned.
    pub fn with_max_block(mut self, max_block: usize) -> Self {
        self.max_block = max_block.max(1);
        self
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Aggregate frequency of every live index.
    pub fn aggregates<T, F>(&self, vocab: &Vocabulary<T>, count: F) -> Result<HashMap<usize, f64>>
    where
        T: AsRef<str> + Eq + Hash + Clone + Debug,
        F: Fn(&T) -> f64,
    {
        let mut agg = HashMap::with_capacity(vocab.len());
        for (idx, _) in vocab.iter() {
            let total: f64 = vocab.members(idx)?.into_iter().map(|(_, item)| count(item)).sum();
            agg.insert(idx, total);
        }
        Ok(agg)
    }

    /// Live values whose aggregate frequency is below k, as
    /// `(index, aggregate)` sorted by index.
    pub fn violations<T, F>(&self, vocab: &Vocabulary<T>, count: F) -> Result<Vec<(usize, f64)>>
    where
        T: AsRef<str> + Eq + Hash + Clone + Debug,
        F: Fn(&T) -> f64,
    {
        let mut out: Vec<(usize, f64)> = self
            .aggregates(vocab, count)?
            .into_iter()
            .filter(|(_, a)| *a < self.k)
            .collect();
        out.sort_by_key(|(i, _)| *i);
        Ok(out)
    }

    /// Fail with [`Error::NotKAnonymous`] if any live value is below k.
    pub fn verify<T, F>(&self, field: &str, vocab: &Vocabulary<T>, count: F) -> Result<()>
    where
        T: AsRef<str> + Eq + Hash + Clone + Debug,
        F: Fn(&T) -> f64,
    {
        if let Some(&(idx, agg)) = self.violations(vocab, count)?.first() {
            return Err(Error::NotKAnonymous {
                field: field.to_string(),
                value: vocab.get_for_index(idx)?.as_ref().to_string(),
                count: agg,
                k: self.k,
            });
        }
        Ok(())
    }

    /// Merge rare values in place until every live value reaches k.
    ///
    /// # Errors
    ///
    /// [`Error::KAnonymityUnattainable`] if the whole vocabulary carries less
    /// than k; the vocabulary is not touched in that case.
    pub fn deidentify<T, F>(&self, vocab: &mut Vocabulary<T>, count: F) -> Result<DeidentifyReport>
    where
        T: AsRef<str> + Eq + Hash + Clone + Debug,
        F: Fn(&T) -> f64,
    {
        let mut agg = self.aggregates(vocab, &count)?;
        let mut report = DeidentifyReport::default();
        if agg.values().all(|a| *a >= self.k) {
            report.retained = vocab.len();
            return Ok(report);
        }
        let total: f64 = agg.values().sum();
        if total < self.k {
            return Err(Error::KAnonymityUnattainable { total, k: self.k });
        }

        let mut blocks: HashMap<String, Vec<usize>> = HashMap::new();
        let mut order: Vec<(usize, f64, String)> = Vec::with_capacity(vocab.len());
        for (idx, item) in vocab.iter() {
            for key in self.blocking.blocking_keys(item.as_ref()) {
                blocks.entry(key).or_default().push(idx);
            }
            order.push((idx, agg[&idx], item.as_ref().to_string()));
        }
        order.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.2.cmp(&b.2)));

        let mut leader = leading_index(&agg, None);

        for (idx, _, value) in order {
            if !vocab.is_live(idx) {
                continue;
            }
            let own = agg.get(&idx).copied().unwrap_or(0.0);
            if own >= self.k {
                continue;
            }

            let target = match self.nearest_candidate(vocab, &blocks, &agg, idx, &value)? {
                Some(t) => {
                    report.merged += 1;
                    t
                }
                None => {
                    let t = self.fallback_target(vocab, &agg, idx, &value, leader)?;
                    report.fallback += 1;
                    tracing::debug!(value = %value, aggregate = own, "no similar value above k, using fallback merge");
                    t
                }
            };

            let target_value = vocab.get_for_index(target)?.clone();
            let resolved = vocab.update_index_value(idx, target_value)?;
            agg.remove(&idx);
            let updated = {
                let a = agg.entry(resolved).or_insert(0.0);
                *a += own;
                *a
            };
            if leader == Some(idx) || leader.map_or(true, |l| updated > agg[&l]) {
                leader = leading_index(&agg, None);
            }
        }

        report.retained = vocab.len();
        tracing::debug!(
            merged = report.merged,
            fallback = report.fallback,
            retained = report.retained,
            k = self.k,
            "de-identification finished"
        );
        Ok(report)
    }

    fn nearest_candidate<T>(
        &self,
        vocab: &Vocabulary<T>,
        blocks: &HashMap<String, Vec<usize>>,
        agg: &HashMap<usize, f64>,
        idx: usize,
        value: &str,
    ) -> Result<Option<usize>>
    where
        T: AsRef<str> + Eq + Hash + Clone + Debug,
    {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut best: Option<(usize, f64, String, usize)> = None;
        let mut own_blocks: Vec<&Vec<usize>> = self
            .blocking
            .blocking_keys(value)
            .iter()
            .filter_map(|key| blocks.get(key))
            .collect();
        if own_blocks.iter().any(|b| b.len() <= self.max_block) {
            own_blocks.retain(|b| b.len() <= self.max_block);
        } else if let Some(smallest) = own_blocks.iter().copied().min_by_key(|b| b.len()) {
            own_blocks = vec![smallest];
        }
        for block in own_blocks {
            for &cand in block {
                let resolved = vocab.resolve(cand)?;
                if resolved == idx || !seen.insert(resolved) {
                    continue;
                }
                let cand_agg = agg.get(&resolved).copied().unwrap_or(0.0);
                if cand_agg < self.k {
                    continue;
                }
                let cand_value = vocab.get_for_index(resolved)?.as_ref();
                if !self.policy.compatible(value, cand_value) {
                    continue;
                }
                let dist = levenshtein(value, cand_value);
                let better = match &best {
                    None => true,
                    Some((d, a, v, _)) => {
                        (dist, -cand_agg, cand_value)
                            .partial_cmp(&(*d, -*a, v.as_str()))
                            == Some(std::cmp::Ordering::Less)
                    }
                };
                if better {
                    best = Some((dist, cand_agg, cand_value.to_string(), resolved));
                }
            }
        }
        Ok(best.map(|(_, _, _, i)| i))
    }

    fn fallback_target<T>(
        &self,
        vocab: &Vocabulary<T>,
        agg: &HashMap<usize, f64>,
        idx: usize,
        value: &str,
        leader: Option<usize>,
    ) -> Result<usize>
    where
        T: AsRef<str> + Eq + Hash + Clone + Debug,
    {
        if let Some(l) = leader.filter(|&l| l != idx) {
            if self.policy.compatible(value, vocab.get_for_index(l)?.as_ref()) {
                return Ok(l);
            }
        }
        let mut best_compatible: Option<(f64, &str, usize)> = None;
        for (&cand, &a) in agg {
            if cand == idx {
                continue;
            }
            let cand_value = vocab.get_for_index(cand)?.as_ref();
            if !self.policy.compatible(value, cand_value) {
                continue;
            }
            let better = match best_compatible {
                None => true,
                Some((ba, bv, _)) => a > ba || (a == ba && cand_value < bv),
            };
            if better {
                best_compatible = Some((a, cand_value, cand));
            }
        }
        if let Some((_, _, cand)) = best_compatible {
            return Ok(cand);
        }
        leading_index(agg, Some(idx)).ok_or_else(|| Error::KAnonymityUnattainable {
            total: agg.values().sum(),
            k: self.k,
        })
    }
}

/// Highest-aggregate index (ties: smallest index), optionally excluding one.
fn leading_index(agg: &HashMap<usize, f64>, exclude: Option<usize>) -> Option<usize> {
    agg.iter()
        .filter(|(i, _)| Some(**i) != exclude)
        .max_by(|(ia, a), (ib, b)| a.total_cmp(b).then_with(|| ib.cmp(ia)))
        .map(|(i, _)| *i)
}
