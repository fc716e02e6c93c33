//! Primary key assignment and duplicate resolution policies.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::feature::Feature;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// The result of a callable id specification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdAssignment {
    /// Use this string as the primary key.
    Id(String),
    /// Take the next value of the autoincrement counter for this base,
    /// yielding `base_1`, `base_2`, and so on.
    Autoincrement(String),
}

/// How to derive a primary key for each feature.
///
/// Attribute key names of the form `:field:` refer to a standard column
/// (e.g. `:seqid:`) instead of an attribute. Whenever a specification does
/// not produce a key, the feature falls back to an autoincremented key based
/// on its feature type: `gene_1`, `gene_2`, and so on.
pub enum IdSpec {
    /// Always autoincrement by feature type.
    Auto,
    /// Use the first value of this attribute key.
    Key(String),
    /// Try these attribute keys in order and use the first hit.
    Keys(Vec<String>),
    /// Dispatch on the feature type; features of unlisted types
    /// autoincrement.
    ByFeatureType(HashMap<String, Vec<String>>),
    /// Derive the key with a caller-supplied function.
    Func(Box<dyn Fn(&Feature) -> Option<IdAssignment>>),
}

impl fmt::Debug for IdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdSpec::Auto => write!(f, "Auto"),
            IdSpec::Key(key) => write!(f, "Key({:?})", key),
            IdSpec::Keys(keys) => write!(f, "Keys({:?})", keys),
            IdSpec::ByFeatureType(map) => write!(f, "ByFeatureType({:?})", map),
            IdSpec::Func(_) => write!(f, "Func(..)"),
        }
    }
}

impl IdSpec {
    /// The id specification used for GFF3 files by default.
    pub fn default_gff3() -> Self {
        IdSpec::Key(String::from("ID"))
    }

    /// The id specification used for GTF files by default: genes are keyed
    /// by `gene_id`, transcripts by `transcript_id`, and everything else
    /// autoincrements.
    pub fn default_gtf() -> Self {
        let mut map = HashMap::new();
        map.insert(String::from("gene"), vec![String::from("gene_id")]);
        map.insert(String::from("transcript"), vec![String::from("transcript_id")]);
        IdSpec::ByFeatureType(map)
    }

    // Tries an attribute key or a `:field:` reference on the feature.
    fn try_key(feature: &Feature, key: &str) -> Option<String> {
        if key.len() >= 3 && key.starts_with(':') && key.ends_with(':') {
            return feature.field_value(&key[1..key.len() - 1]);
        }
        feature.attributes.first(key).map(String::from)
    }

    /// Resolves the primary key for the feature, consulting and updating
    /// the autoincrement counters as needed.
    pub fn resolve(&self, feature: &Feature, counters: &mut Autoincrements) -> String {
        let keys: &[String] = match self {
            IdSpec::Auto => &[],
            IdSpec::Key(key) => std::slice::from_ref(key),
            IdSpec::Keys(keys) => keys,
            IdSpec::ByFeatureType(map) => match map.get(&feature.featuretype) {
                Some(keys) => keys,
                None => return counters.next(&feature.featuretype),
            },
            IdSpec::Func(func) => {
                return match func(feature) {
                    Some(IdAssignment::Id(id)) => id,
                    Some(IdAssignment::Autoincrement(base)) => counters.next(&base),
                    None => counters.next(&feature.featuretype),
                };
            }
        };
        for key in keys {
            if let Some(id) = Self::try_key(feature, key) {
                return id;
            }
        }
        counters.next(&feature.featuretype)
    }
}

//-----------------------------------------------------------------------------

/// Autoincrement counters, one per base string.
///
/// The counters are persisted in the `autoincrements` table so that later
/// ingests into the same database resume numbering where the previous one
/// stopped.
#[derive(Clone, Debug, Default)]
pub struct Autoincrements {
    counters: HashMap<String, i64>,
}

impl Autoincrements {
    /// Creates empty counters.
    pub fn new() -> Self {
        Autoincrements::default()
    }

    /// Creates counters from persisted `(base, n)` rows.
    pub fn from_rows(rows: impl IntoIterator<Item = (String, i64)>) -> Self {
        Autoincrements { counters: rows.into_iter().collect() }
    }

    /// Increments the counter for the base and returns `base_n`.
    pub fn next(&mut self, base: &str) -> String {
        let counter = self.counters.entry(String::from(base)).or_insert(0);
        *counter += 1;
        format!("{}_{}", base, counter)
    }

    /// Iterates over the `(base, n)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.counters.iter().map(|(base, n)| (base.as_str(), *n))
    }

    /// Returns `true` if no counter has been used.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

//-----------------------------------------------------------------------------

/// How to resolve two features that claim the same primary key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Fail with [`Error::DuplicateId`].
    Error,
    /// Log a warning and keep the first feature.
    Warning,
    /// Merge the attributes if all other fields agree; fail with
    /// [`Error::MergeConflict`] otherwise.
    Merge,
    /// Give the new feature an autoincremented key based on the original
    /// one; both features are kept.
    CreateUnique,
    /// Replace the existing feature.
    Replace,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStrategy::Error => "error",
            MergeStrategy::Warning => "warning",
            MergeStrategy::Merge => "merge",
            MergeStrategy::CreateUnique => "create_unique",
            MergeStrategy::Replace => "replace",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "error" => Ok(MergeStrategy::Error),
            "warning" => Ok(MergeStrategy::Warning),
            "merge" => Ok(MergeStrategy::Merge),
            "create_unique" => Ok(MergeStrategy::CreateUnique),
            "replace" => Ok(MergeStrategy::Replace),
            _ => Err(Error::InvalidInput(format!("invalid merge strategy: {}", s))),
        }
    }
}

//-----------------------------------------------------------------------------

/// Returns `true` if the two features agree on every non-attribute field.
///
/// This is the precondition for merging them under
/// [`MergeStrategy::Merge`].
pub fn same_gff_fields(a: &Feature, b: &Feature) -> bool {
    a.seqid == b.seqid
        && a.source == b.source
        && a.featuretype == b.featuretype
        && a.start == b.start
        && a.end == b.end
        && a.score == b.score
        && a.strand == b.strand
        && a.frame == b.frame
}

/// Merges the attributes of `other` into `target`.
///
/// The union preserves the order of first occurrence: existing keys keep
/// their positions and values, new values are appended, and duplicates are
/// dropped.
pub fn merge_attributes(target: &mut Attributes, other: &Attributes) {
    for (key, values) in other.iter() {
        if !target.contains_key(key) {
            let mut deduplicated: Vec<String> = Vec::new();
            for value in values {
                if !deduplicated.contains(value) {
                    deduplicated.push(value.clone());
                }
            }
            target.set(key, deduplicated);
            continue;
        }
        for value in values {
            let existing = target.get(key).unwrap();
            if !existing.contains(value) {
                target.get_mut(key).unwrap().push(value.clone());
            }
        }
    }
}

//-----------------------------------------------------------------------------
