use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use time::OffsetDateTime;

use super::{DerivedMetrics, Mood, Record, RecordId};
use crate::search::FilterParams;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LetterKind {
    /// Written to a future self, sealed until the target date.
    #[default]
    Future,
    /// Addressed to a past self.
    Past,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LetterStatus {
    #[default]
    Scheduled,
    Opened,
}

/// Time-capsule letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    pub id: RecordId,
    pub body: String,
    pub mood: Mood,
    pub kind: LetterKind,
    pub status: LetterStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub target_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub opened_at: Option<OffsetDateTime>,
    pub word_count: u32,
    pub writing_seconds: u32,
    pub favorite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Letter {
    pub fn blank(mood: Mood, kind: LetterKind, target_date: OffsetDateTime) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: RecordId::generate(),
            body: String::new(),
            mood,
            kind,
            status: LetterStatus::Scheduled,
            target_date,
            opened_at: None,
            word_count: 0,
            writing_seconds: 0,
            favorite: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Scheduled and due.
    pub fn is_ready(&self, now: OffsetDateTime) -> bool {
        self.status == LetterStatus::Scheduled && self.target_date <= now
    }

    pub fn is_opened(&self) -> bool {
        self.status == LetterStatus::Opened
    }

    pub fn open(&mut self, now: OffsetDateTime) {
        self.status = LetterStatus::Opened;
        self.opened_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LetterPatch {
    pub body: Option<String>,
    pub mood: Option<Mood>,
    pub kind: Option<LetterKind>,
    pub target_date: Option<OffsetDateTime>,
    pub favorite: Option<bool>,
}

impl LetterPatch {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn with_target_date(mut self, target_date: OffsetDateTime) -> Self {
        self.target_date = Some(target_date);
        self
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }
}

impl Record for Letter {
    type Patch = LetterPatch;

    const NOUN: &'static str = "letter";
    const NOUN_PLURAL: &'static str = "letters";

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

    fn apply_patch(&mut self, patch: &LetterPatch) {
        if let Some(body) = &patch.body {
            self.body.clone_from(body);
            self.word_count = super::word_count(&self.body);
        }
        if let Some(mood) = patch.mood {
            self.mood = mood;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(target_date) = patch.target_date {
            self.target_date = target_date;
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
        if !filter.created.contains(self.created_at.unix_timestamp()) {
            return false;
        }
        filter.matches_text([self.body.as_str()])
    }
}
