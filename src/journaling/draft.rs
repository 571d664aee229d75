use time::OffsetDateTime;
use tokio::time::Instant;

use crate::model::{is_blank, word_count, DerivedMetrics, Record, RecordId};

/// Uncommitted edits for exactly one record.
///
/// Every [`DraftBuffer::update`] bumps a generation counter. A snapshot carries
/// the generation it was taken at, and [`DraftBuffer::mark_saved`] only clears
/// the dirty flag when no update landed after that snapshot.
#[derive(Debug, Clone)]
pub struct DraftBuffer<R: Record> {
    working: R,
    dirty: bool,
    generation: u64,
    last_saved: Option<OffsetDateTime>,
    opened_at: Instant,
    base_writing_seconds: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftSnapshot<R> {
    pub generation: u64,
    pub record: R,
}

impl<R: Record> DraftBuffer<R> {
    pub fn load(initial: R) -> Self {
        let base_writing_seconds = initial.writing_seconds();
        Self {
            working: initial,
            dirty: false,
            generation: 0,
            last_saved: None,
            opened_at: Instant::now(),
            base_writing_seconds,
        }
    }

    /// Any touch marks the draft dirty; fields are not diffed.
    pub fn update(&mut self, patch: &R::Patch) {
        self.working.apply_patch(patch);
        self.generation += 1;
        self.dirty = true;
    }

    pub fn snapshot(&self) -> DraftSnapshot<R> {
        let mut record = self.working.clone();
        let elapsed = u32::try_from(self.opened_at.elapsed().as_secs()).unwrap_or(u32::MAX);
        let metrics = DerivedMetrics {
            word_count: word_count(record.body()),
            writing_seconds: self.base_writing_seconds.saturating_add(elapsed),
        };
        record.stamp(metrics, OffsetDateTime::now_utc());
        DraftSnapshot {
            generation: self.generation,
            record,
        }
    }

    /// Records a confirmed save of the snapshot taken at `generation`.
    ///
    /// Returns whether the buffer is clean afterwards.
    pub fn mark_saved(&mut self, generation: u64, at: OffsetDateTime) -> bool {
        self.last_saved = Some(at);
        if generation == self.generation {
            self.dirty = false;
        }
        !self.dirty
    }

    /// Content restored from a crash-recovery snapshot has never been confirmed.
    pub(crate) fn mark_recovered(&mut self) {
        self.generation += 1;
        self.dirty = true;
    }

    pub fn content(&self) -> &R {
        &self.working
    }

    pub fn id(&self) -> &RecordId {
        self.working.id()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_blank(&self) -> bool {
        is_blank(self.working.body())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_saved(&self) -> Option<OffsetDateTime> {
        self.last_saved
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{EntryPatch, JournalEntry, Mood};

    #[test]
    fn load_starts_clean_and_update_marks_dirty() {
        let mut draft = DraftBuffer::load(JournalEntry::blank(Mood::Healing));
        assert!(!draft.is_dirty());
        assert!(draft.last_saved().is_none());
        assert!(draft.is_blank());

        draft.update(&EntryPatch::body("Hello world"));
        assert!(draft.is_dirty());
        assert!(!draft.is_blank());
        assert_eq!(draft.generation(), 1);
    }

    #[test]
    fn snapshot_recomputes_word_count() {
        let mut draft = DraftBuffer::load(JournalEntry::blank(Mood::Joyful));
        draft.update(&EntryPatch::body("  three  little\twords "));
        let snapshot = draft.snapshot();
        assert_eq!(snapshot.record.word_count, 3);
        assert_eq!(snapshot.generation, 1);
    }

    #[test]
    fn update_after_snapshot_keeps_buffer_dirty() {
        let mut draft = DraftBuffer::load(JournalEntry::blank(Mood::Healing));
        draft.update(&EntryPatch::body("first"));
        let snapshot = draft.snapshot();
        draft.update(&EntryPatch::body("first and second"));

        let clean = draft.mark_saved(snapshot.generation, OffsetDateTime::now_utc());
        assert!(!clean);
        assert!(draft.is_dirty());
        assert!(draft.last_saved().is_some());
    }

    #[test]
    fn mark_saved_is_idempotent() {
        let mut draft = DraftBuffer::load(JournalEntry::blank(Mood::Healing));
        draft.update(&EntryPatch::body("steady"));
        let snapshot = draft.snapshot();
        let at = OffsetDateTime::now_utc();

        assert!(draft.mark_saved(snapshot.generation, at));
        assert!(!draft.is_dirty());
        assert!(draft.mark_saved(snapshot.generation, at));
        assert!(!draft.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_accumulates_writing_time() {
        let mut entry = JournalEntry::blank(Mood::Healing);
        entry.writing_seconds = 60;
        let mut draft = DraftBuffer::load(entry);
        draft.update(&EntryPatch::body("slow thoughts"));

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(draft.snapshot().record.writing_seconds, 150);
    }
}
