//! Index ↔ value bijection with chained remapping.
//!
//! Items get dense indices in first-seen order, starting at 1; index 0 is
//! [`UNKNOWN_INDEX`] and never names a real item.
//!
//! Remapping is union-find shaped: every slot is either live (holds an item)
//! or retired (redirects to a live index). Redirects are kept flat. When a
//! canonical index is merged into another, every index that resolved to it is
//! repointed at the new target, so resolution is always a single hop.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Sentinel index meaning "unknown".
pub const UNKNOWN_INDEX: usize = 0;

#[derive(Debug, Clone)]
enum Slot<T> {
    Unknown,
    Live {
        item: T,
        /// Retired indices that resolve here (excluding this one).
        merged: Vec<usize>,
    },
    Retired {
        item: T,
        target: usize,
    },
}

/// A growable bijection between items and dense indices.
#[derive(Debug, Clone)]
pub struct Vocabulary<T> {
    slots: Vec<Slot<T>>,
    /// Item -> index it was assigned. Retired items keep their entry and
    /// resolve through the redirect.
    index: HashMap<T, usize>,
    live: usize,
}

impl<T> Default for Vocabulary<T>
where
    T: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Vocabulary<T>
where
    T: Eq + Hash + Clone + Debug,
{
    /// Create an empty vocabulary.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::Unknown],
            index: HashMap::new(),
            live: 0,
        }
    }

    /// Return the (resolved) index for `item`, assigning the next one if absent.
    pub fn put_if_absent(&mut self, item: T) -> usize {
        if let Some(&idx) = self.index.get(&item) {
            return self.resolve_unchecked(idx);
        }
        let idx = self.slots.len();
        self.index.insert(item.clone(), idx);
        self.slots.push(Slot::Live {
            item,
            merged: Vec::new(),
        });
        self.live += 1;
        idx
    }

    /// Item that `index` currently resolves to.
    pub fn get_for_index(&self, index: usize) -> Result<&T> {
        let canonical = self.resolve(index)?;
        match &self.slots[canonical] {
            Slot::Live { item, .. } => Ok(item),
            _ => Err(Error::UnknownIndex(index)),
        }
    }

    /// Canonical index for `item`.
    pub fn get_index_for(&self, item: &T) -> Result<usize> {
        self.index
            .get(item)
            .map(|&idx| self.resolve_unchecked(idx))
            .ok_or_else(|| Error::unknown_item(item))
    }

    /// Follow the redirect (if any) to the live index `index` resolves to.
    pub fn resolve(&self, index: usize) -> Result<usize> {
        match self.slots.get(index) {
            None | Some(Slot::Unknown) => Err(Error::UnknownIndex(index)),
            Some(Slot::Live { .. }) => Ok(index),
            Some(Slot::Retired { target, .. }) => Ok(*target),
        }
    }

    fn resolve_unchecked(&self, index: usize) -> usize {
        match &self.slots[index] {
            Slot::Retired { target, .. } => *target,
            _ => index,
        }
    }

    /// Reassign what `old_index` resolves to.
    ///
    /// If `new_value` is already indexed, the live index behind `old_index`
    /// (and everything previously merged into it) is merged into that index.
    /// Otherwise the value behind `old_index` is replaced in place.
    ///
    /// Returns the live index that `old_index` resolves to afterwards.
    pub fn update_index_value(&mut self, old_index: usize, new_value: T) -> Result<usize> {
        let source = self.resolve(old_index)?;

        let existing = self.index.get(&new_value).copied();
        let Some(existing) = existing else {
            if let Slot::Live { item, .. } = &mut self.slots[source] {
                let renamed = std::mem::replace(item, new_value.clone());
                self.index.remove(&renamed);
            }
            self.index.insert(new_value, source);
            return Ok(source);
        };

        let target = self.resolve_unchecked(existing);
        if target == source {
            return Ok(target);
        }

        let (item, mut moved) = match std::mem::replace(&mut self.slots[source], Slot::Unknown) {
            Slot::Live { item, merged } => (item, merged),
            _ => return Err(Error::UnknownIndex(old_index)),
        };
        for &idx in &moved {
            if let Slot::Retired { target: t, .. } = &mut self.slots[idx] {
                *t = target;
            }
        }
        self.slots[source] = Slot::Retired { item, target };
        moved.push(source);

        if let Slot::Live { merged, .. } = &mut self.slots[target] {
            merged.extend(moved);
        }
        self.live -= 1;
        Ok(target)
    }

    /// Every index resolving to the same live index as `index`, paired with
    /// the item it was assigned. The live index comes first.
    pub fn members(&self, index: usize) -> Result<Vec<(usize, &T)>> {
        let canonical = self.resolve(index)?;
        let Slot::Live { item, merged } = &self.slots[canonical] else {
            return Err(Error::UnknownIndex(index));
        };
        let mut out = Vec::with_capacity(merged.len() + 1);
        out.push((canonical, item));
        for &idx in merged {
            if let Slot::Retired { item, .. } = &self.slots[idx] {
                out.push((idx, item));
            }
        }
        Ok(out)
    }

    /// Whether `index` is a live (canonical) index.
    pub fn is_live(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Slot::Live { .. }))
    }

    /// Live `(index, item)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Live { item, .. } => Some((i, item)),
            _ => None,
        })
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of indices ever assigned (live or retired).
    pub fn assigned(&self) -> usize {
        self.slots.len() - 1
    }
}
