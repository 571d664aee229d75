use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{normalize_tags, DerivedMetrics, Mood, Record, RecordId, Tags};
use crate::search::FilterParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: RecordId,
    pub title: Option<String>,
    pub body: String,
    pub tags: Tags,
    pub mood: Mood,
    pub word_count: u32,
    pub writing_seconds: u32,
    pub favorite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl JournalEntry {
    /// Empty template for a new entry; the mood comes from the caller's editor context.
    pub fn blank(mood: Mood) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: RecordId::generate(),
            title: None,
            body: String::new(),
            tags: Tags::new(),
            mood,
            word_count: 0,
            writing_seconds: 0,
            favorite: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_body(mood: Mood, body: impl Into<String>) -> Self {
        let mut entry = Self::blank(mood);
        entry.body = body.into();
        entry.word_count = super::word_count(&entry.body);
        entry
    }

    pub fn display_title(&self) -> &str {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title,
            _ => "Untitled entry",
        }
    }
}

/// Partial change to a journal entry; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub title: Option<Option<String>>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub mood: Option<Mood>,
    pub favorite: Option<bool>,
}

impl EntryPatch {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = Some(title);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.favorite = Some(favorite);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.tags.is_none()
            && self.mood.is_none()
            && self.favorite.is_none()
    }
}

impl Record for JournalEntry {
    type Patch = EntryPatch;

    const NOUN: &'static str = "entry";
    const NOUN_PLURAL: &'static str = "entries";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn body(&self) -> &str {
        &self.body
    }

    fn is_favorite(&self) -> bool {
        self.favorite
    }

    fn set_favorite(&mut self, favorite: bool) {
        self.favorite = favorite;
    }

    fn writing_seconds(&self) -> u32 {
        self.writing_seconds
    }

    fn apply_patch(&mut self, patch: &EntryPatch) {
        if let Some(title) = &patch.title {
            self.title = title
                .as_deref()
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(str::to_string);
        }
        if let Some(body) = &patch.body {
            self.body.clone_from(body);
            self.word_count = super::word_count(&self.body);
        }
        if let Some(tags) = &patch.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(mood) = patch.mood {
            self.mood = mood;
        }
        if let Some(favorite) = patch.favorite {
            self.favorite = favorite;
        }
    }

    fn stamp(&mut self, metrics: DerivedMetrics, now: OffsetDateTime) {
        self.word_count = metrics.word_count;
        self.writing_seconds = metrics.writing_seconds;
        self.updated_at = now;
    }

    fn matches(&self, filter: &FilterParams) -> bool {
        if filter.mood.is_some_and(|mood| mood != self.mood) {
            return false;
        }
        if filter.favorite.is_some_and(|favorite| favorite != self.favorite) {
            return false;
        }
        if !filter.matches_tags(self.tags.iter()) {
            return false;
        }
        if !filter.created.contains(self.created_at.unix_timestamp()) {
            return false;
        }
        filter.matches_text([self.title.as_deref().unwrap_or_default(), self.body.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_recomputes_word_count_and_normalizes_fields() {
        let mut entry = JournalEntry::blank(Mood::Healing);
        entry.apply_patch(
            &EntryPatch::body("a quiet  afternoon with tea")
                .with_title(Some("   ".into()))
                .with_tags(vec![" tea ".into(), "tea".into(), "rain".into()])
                .with_mood(Mood::Joyful),
        );
        assert_eq!(entry.word_count, 5);
        assert_eq!(entry.title, None);
        assert_eq!(entry.tags.len(), 2);
        assert_eq!(entry.mood, Mood::Joyful);
        assert_eq!(entry.display_title(), "Untitled entry");
    }

    #[test]
    fn filter_matches_mood_favorite_and_text() {
        let mut entry = JournalEntry::with_body(Mood::Empowered, "Finished the Brontë novel");
        entry.favorite = true;

        let mut filter = FilterParams::default();
        filter.search = Some("bronte".into());
        assert!(!entry.matches(&filter));

        filter.search = Some("NOVEL".into());
        filter.mood = Some(Mood::Empowered);
        filter.favorite = Some(true);
        assert!(entry.matches(&filter));

        filter.mood = Some(Mood::Healing);
        assert!(!entry.matches(&filter));
    }
}
