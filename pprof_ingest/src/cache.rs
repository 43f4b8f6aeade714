//! Label-keyed tree caches.
//!
//! [`TreeCache`] collects the trees of the profile being parsed, by sample
//! type and label set. Both are string table indices, so the cache is only
//! meaningful for that one profile. Columns declaring the same sample type
//! share their trees.
//!
//! [`Generation`] holds the trees of cumulative series that survive a call.
//! It is keyed by resolved names so that a later profile, with its own
//! string table, can look its series up.

use fnv::FnvHashMap;

use crate::labels::{Label, LabelSet, SeriesKey};
use crate::tree::CallTree;

type Trees = FnvHashMap<LabelSet, CallTree>;

/// Trees built from the profile being parsed.
#[derive(Debug, Default)]
pub struct TreeCache {
    slots: Vec<(i64, Trees)>,
}

impl TreeCache {
    /// Empty the cache and open one slot per distinct sample type index.
    pub fn reset<I>(&mut self, sample_types: I)
    where
        I: IntoIterator<Item = i64>,
    {
        let mut spare: Vec<Trees> = self
            .slots
            .drain(..)
            .map(|(_, mut trees)| {
                trees.clear();
                trees
            })
            .collect();
        for sample_type in sample_types {
            if self.trees(sample_type).is_none() {
                let trees = spare.pop().unwrap_or_default();
                self.slots.push((sample_type, trees));
            }
        }
    }

    fn trees(&self, sample_type: i64) -> Option<&Trees> {
        self.slots
            .iter()
            .find(|(t, _)| *t == sample_type)
            .map(|(_, trees)| trees)
    }

    /// Insert `stack` with `value` into the tree of (`sample_type`,
    /// `labels`), creating the tree on first use. `labels` must be sorted.
    /// Sample types without a slot are ignored.
    pub fn insert<I>(&mut self, sample_type: i64, labels: &[Label], stack: I, value: u64)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let Some((_, trees)) = self.slots.iter_mut().find(|(t, _)| *t == sample_type) else {
            return;
        };
        match trees.get_mut(labels) {
            Some(tree) => tree.insert_stack(stack, value),
            None => {
                let mut tree = CallTree::new();
                tree.insert_stack(stack, value);
                trees.insert(LabelSet::new(labels.to_vec()), tree);
            }
        }
    }

    pub fn get(&self, sample_type: i64, labels: &[Label]) -> Option<&CallTree> {
        self.trees(sample_type)?.get(labels)
    }

    /// Number of (sample type, label set) entries.
    pub fn len(&self) -> usize {
        self.slots.iter().map(|(_, trees)| trees.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry, yielding `(sample_type, labels, tree)`.
    pub fn drain(&mut self) -> impl Iterator<Item = (i64, LabelSet, CallTree)> + '_ {
        self.slots.iter_mut().flat_map(|(sample_type, trees)| {
            let sample_type = *sample_type;
            trees
                .drain()
                .map(move |(labels, tree)| (sample_type, labels, tree))
        })
    }
}

/// Identity of a series across calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// pprof sample type name.
    pub sample_type: String,
    pub series: SeriesKey,
}

/// Trees retained from the last successful call.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    entries: FnvHashMap<CacheKey, CallTree>,
}

impl Generation {
    pub fn get(&self, key: &CacheKey) -> Option<&CallTree> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, tree: CallTree) {
        self.entries.insert(key, tree);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &CallTree)> {
        self.entries.iter()
    }
}
