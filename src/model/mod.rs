use std::fmt;

use indexmap::IndexSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::search::FilterParams;

mod entry;
mod letter;
mod mood;

pub use entry::{EntryPatch, JournalEntry};
pub use letter::{Letter, LetterKind, LetterPatch, LetterStatus};
pub use mood::Mood;

/// Opaque, client-assigned record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordered set of tag names, insertion order preserved.
pub type Tags = IndexSet<String>;

pub fn normalize_tags<I, S>(raw: I) -> Tags
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Number of whitespace-delimited, non-empty tokens.
pub fn word_count(body: &str) -> u32 {
    body.split_whitespace().count() as u32
}

pub fn is_blank(body: &str) -> bool {
    body.trim().is_empty()
}

/// Metrics recomputed whenever a record is snapshotted for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedMetrics {
    pub word_count: u32,
    pub writing_seconds: u32,
}

/// An entity family handled by drafts, gateways and collection stores.
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Patch: Clone + fmt::Debug + Send + Sync + 'static;

    /// Singular noun used in user-facing messages ("entry", "letter").
    const NOUN: &'static str;
    /// Plural noun used in user-facing messages ("entries", "letters").
    const NOUN_PLURAL: &'static str;

    fn id(&self) -> &RecordId;
    fn body(&self) -> &str;
    fn is_favorite(&self) -> bool;
    fn set_favorite(&mut self, favorite: bool);
    fn writing_seconds(&self) -> u32;
    fn apply_patch(&mut self, patch: &Self::Patch);
    fn stamp(&mut self, metrics: DerivedMetrics, now: OffsetDateTime);
    fn matches(&self, filter: &FilterParams) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_repeated_whitespace() {
        assert_eq!(word_count("Hello world"), 2);
        assert_eq!(word_count("  Hello \n\t world  "), 2);
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   \n "), 0);
    }

    #[test]
    fn normalize_tags_trims_and_deduplicates_in_order() {
        let tags = normalize_tags(["  poetry", "", "rain ", "poetry", "  "]);
        let collected: Vec<_> = tags.iter().map(String::as_str).collect();
        assert_eq!(collected, vec!["poetry", "rain"]);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }
}
