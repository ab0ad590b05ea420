use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved tag for policy text that applies everywhere.
pub const UNIVERSAL_TAG: &str = "GLOBAL";

/// Opaque jurisdiction label (usually a region or country code).
///
/// Compared by equality only. Stored trimmed and upper-cased so that
/// `"jp"` and `"JP"` name the same jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct JurisdictionTag(String);

impl JurisdictionTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_uppercase())
    }

    pub fn universal() -> Self {
        Self(UNIVERSAL_TAG.to_string())
    }

    pub fn is_universal(&self) -> bool {
        self.0 == UNIVERSAL_TAG
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JurisdictionTag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for JurisdictionTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<JurisdictionTag> for String {
    fn from(value: JurisdictionTag) -> Self {
        value.0
    }
}

impl fmt::Display for JurisdictionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of jurisdiction tags with deterministic (sorted) iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JurisdictionSet(BTreeSet<JurisdictionTag>);

impl JurisdictionSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// The most conservative scope: only passages tagged universal.
    pub fn universal_only() -> Self {
        let mut set = BTreeSet::new();
        set.insert(JurisdictionTag::universal());
        Self(set)
    }

    pub fn insert(&mut self, tag: JurisdictionTag) -> bool {
        self.0.insert(tag)
    }

    pub fn extend(&mut self, other: &JurisdictionSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Copy of this set with the universal tag added, as every query scope needs.
    pub fn with_universal(&self) -> Self {
        let mut set = self.clone();
        set.insert(JurisdictionTag::universal());
        set
    }

    pub fn contains(&self, tag: &JurisdictionTag) -> bool {
        self.0.contains(tag)
    }

    pub fn is_universal(&self) -> bool {
        self.contains(&JurisdictionTag::universal())
    }

    /// Plain set overlap. A universal passage reaches a query only because
    /// every query scope carries the universal tag, never the other way round.
    pub fn intersects(&self, other: &JurisdictionSet) -> bool {
        self.0.iter().any(|tag| other.0.contains(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JurisdictionTag> {
        self.0.iter()
    }
}

impl<T: Into<JurisdictionTag>> FromIterator<T> for JurisdictionSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for JurisdictionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.0.iter().map(|t| t.as_str()).collect();
        write!(f, "{{{}}}", tags.join(", "))
    }
}

/// A registry entity found in free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatch {
    /// Canonical entity name from the registry.
    pub name: String,
    /// The alias (as registered) that produced the earliest occurrence.
    pub aliases_matched: String,
    pub jurisdictions: JurisdictionSet,
}
