//! Sample labels and series keys.

use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Label carrying the id of the individual profile a sample belongs to.
pub const PROFILE_ID: &str = "profile_id";

/// Label holding the series name.
pub const NAME: &str = "__name__";

/// A sample label as key and value string table indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub key: i64,
    pub value: i64,
}

impl Label {
    pub fn new(key: i64, value: i64) -> Self {
        Self { key, value }
    }
}

/// A sorted set of labels, usable as a map key.
///
/// Maps keyed by `LabelSet` can be queried with a sorted `&[Label]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet(Vec<Label>);

impl LabelSet {
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort_unstable();
        labels.dedup();
        Self(labels)
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.0.iter().any(|l| l.key == key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<[Label]> for LabelSet {
    fn borrow(&self) -> &[Label] {
        &self.0
    }
}

// ============================================================================
// Series keys
// ============================================================================

/// Destination key of a stored series: a name plus string labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    labels: BTreeMap<String, String>,
}

impl SeriesKey {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    /// The `__name__` label.
    pub fn name(&self) -> &str {
        self.labels.get(NAME).map_or("", String::as_str)
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Renders as `name{k=v,...}` with labels in key order.
impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name())?;
        let mut first = true;
        for (k, v) in self.labels.iter().filter(|(k, _)| *k != NAME) {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
            first = false;
        }
        f.write_str("}")
    }
}

impl Serialize for SeriesKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
