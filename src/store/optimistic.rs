use crate::model::{Record, RecordId};

/// How to undo an optimistic change if the gateway refuses it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Revert<R> {
    /// Drop a record that was prepended.
    Remove(RecordId),
    /// Put back `original`, but only while the slot still holds `pending`.
    /// A later mutation has since rewritten the slot otherwise, and that
    /// mutation sent the whole record to the gateway.
    Restore { original: R, pending: R },
    /// Flip the favorite flag back.
    Favorite { id: RecordId, favorite: bool },
}

impl<R: Record> Revert<R> {
    pub(crate) fn undo(self, records: &mut Vec<R>) {
        match self {
            Revert::Remove(id) => records.retain(|record| record.id() != &id),
            Revert::Restore { original, pending } => match find_mut(records, original.id()) {
                Some(slot) if *slot == pending => *slot = original,
                Some(_) => {
                    tracing::debug!(id = %original.id(), "{} changed since; keeping newer state", R::NOUN);
                }
                None => {}
            },
            Revert::Favorite { id, favorite } => {
                if let Some(slot) = find_mut(records, &id) {
                    slot.set_favorite(favorite);
                }
            }
        }
    }
}

/// A change already visible in the collection, awaiting confirmation.
#[derive(Debug, Clone)]
pub(crate) struct OptimisticUpdate<R> {
    /// Sent to the gateway.
    pub(crate) pending: R,
    pub(crate) revert: Revert<R>,
}

pub(crate) fn position<R: Record>(records: &[R], id: &RecordId) -> Option<usize> {
    records.iter().position(|record| record.id() == id)
}

pub(crate) fn find_mut<'a, R: Record>(records: &'a mut [R], id: &RecordId) -> Option<&'a mut R> {
    records.iter_mut().find(|record| record.id() == id)
}

/// Replaces the record sharing `canonical`'s id in place. Order is untouched.
pub(crate) fn reconcile<R: Record>(records: &mut [R], canonical: R) -> bool {
    match find_mut(records, canonical.id()) {
        Some(slot) => {
            *slot = canonical;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JournalEntry, Mood};

    fn entries() -> Vec<JournalEntry> {
        vec![
            JournalEntry::with_body(Mood::Healing, "one"),
            JournalEntry::with_body(Mood::Joyful, "two"),
        ]
    }

    #[test]
    fn undo_remove_drops_prepended_record() {
        let before = entries();
        let mut records = before.clone();
        let added = JournalEntry::with_body(Mood::Healing, "new");
        records.insert(0, added.clone());
        Revert::Remove(added.id).undo(&mut records);
        assert_eq!(records, before);
    }

    #[test]
    fn undo_restore_and_favorite_touch_only_target() {
        let mut records = entries();
        let original = records[1].clone();
        records[1].body = "edited".into();
        records[1].favorite = true;

        Revert::Favorite {
            id: original.id.clone(),
            favorite: false,
        }
        .undo(&mut records);
        assert!(!records[1].favorite);
        assert_eq!(records[1].body, "edited");

        Revert::Restore {
            original: original.clone(),
            pending: records[1].clone(),
        }
        .undo(&mut records);
        assert_eq!(records[1], original);
        assert_eq!(records[0].body, "one");
    }

    #[test]
    fn undo_restore_keeps_a_slot_rewritten_since() {
        let mut records = entries();
        let original = records[0].clone();
        records[0].body = "edited".into();
        let pending = records[0].clone();
        records[0].favorite = true;
        let newer = records[0].clone();

        Revert::Restore { original, pending }.undo(&mut records);
        assert_eq!(records[0], newer);
    }

    #[test]
    fn reconcile_keeps_position() {
        let mut records = entries();
        let mut canonical = records[1].clone();
        canonical.word_count = 42;
        assert!(reconcile(&mut records, canonical.clone()));
        assert_eq!(records[1], canonical);
        assert_eq!(position(&records, &canonical.id), Some(1));

        let stranger = JournalEntry::with_body(Mood::Healing, "stranger");
        assert!(!reconcile(&mut records, stranger));
        assert_eq!(records.len(), 2);
    }
}
