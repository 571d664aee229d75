use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;
use strum::IntoEnumIterator;
use time::Date;

use crate::model::{JournalEntry, Mood};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    pub total_entries: usize,
    pub total_words: u64,
    pub total_writing_seconds: u64,
    pub favorites: usize,
    /// Every mood is present, in declaration order.
    pub by_mood: IndexMap<Mood, usize>,
    /// Consecutive days with at least one entry, ending today or yesterday.
    pub streak: u32,
}

impl EntryStats {
    pub fn compute(entries: &[JournalEntry], today: Date) -> Self {
        let mut by_mood: IndexMap<Mood, usize> = Mood::iter().map(|mood| (mood, 0)).collect();
        for entry in entries {
            *by_mood.entry(entry.mood).or_default() += 1;
        }
        Self {
            total_entries: entries.len(),
            total_words: entries.iter().map(|entry| u64::from(entry.word_count)).sum(),
            total_writing_seconds: entries
                .iter()
                .map(|entry| u64::from(entry.writing_seconds))
                .sum(),
            favorites: entries.iter().filter(|entry| entry.favorite).count(),
            by_mood,
            streak: writing_streak(entries.iter().map(|entry| entry.created_at.date()), today),
        }
    }
}

/// Length of the run of consecutive days ending at the latest day, or 0 when
/// the latest day is older than yesterday.
pub fn writing_streak<I>(days: I, today: Date) -> u32
where
    I: IntoIterator<Item = Date>,
{
    let days: BTreeSet<Date> = days.into_iter().collect();
    let Some(&latest) = days.last() else {
        return 0;
    };
    if latest != today && Some(latest) != today.previous_day() {
        return 0;
    }

    let mut streak = 1;
    let mut expected = latest.previous_day();
    for day in days.iter().rev().skip(1) {
        if Some(*day) != expected {
            break;
        }
        streak += 1;
        expected = day.previous_day();
    }
    streak
}

/// `"12m 5s"`
pub fn format_writing_time(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}
