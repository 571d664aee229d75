use std::fmt::Write as _;

use regex::Regex;
use time::macros::format_description;
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::journaling::RecoverySnapshot;
use crate::model::{JournalEntry, Letter, LetterKind, Record};
use crate::stats::{format_writing_time, EntryStats};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub fn format_entries(
    entries: &[JournalEntry],
    highlight: Option<&Regex>,
    excerpt_graphemes: usize,
) -> String {
    if entries.is_empty() {
        return "No entries found.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let mut headline = format!(
            "{}  {}",
            entry.id,
            mark_matches(entry.display_title(), highlight)
        );
        if entry.favorite {
            headline.push_str("  ★");
        }
        let _ = writeln!(out, "{headline}");
        let _ = writeln!(
            out,
            "    {} {} · {} words · {}",
            entry.mood.emoji(),
            entry.mood.label(),
            entry.word_count,
            format_timestamp(entry.updated_at)
        );
        if !entry.tags.is_empty() {
            let tags = entry
                .tags
                .iter()
                .map(|tag| format!("#{tag}"))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "    tags    {tags}");
        }
        let excerpt = excerpt(&entry.body, excerpt_graphemes);
        if !excerpt.is_empty() {
            let _ = writeln!(out, "    {}", mark_matches(&excerpt, highlight));
        }
        out.push('\n');
    }
    out
}

/// Full view of one entry, used after create/edit.
pub fn format_entry(entry: &JournalEntry) -> String {
    let mut out = format_entries(std::slice::from_ref(entry), None, 0);
    let body = entry.body.trim();
    if !body.is_empty() {
        let _ = writeln!(out, "{body}");
    }
    out
}

/// Letters grouped as the inbox shows them: ready, sealed, opened.
pub fn format_letters(letters: &[Letter], now: OffsetDateTime) -> String {
    if letters.is_empty() {
        return "No letters yet.\n".to_string();
    }
    let ready: Vec<_> = letters.iter().filter(|letter| letter.is_ready(now)).collect();
    let sealed: Vec<_> = letters
        .iter()
        .filter(|letter| !letter.is_opened() && !letter.is_ready(now))
        .collect();
    let opened: Vec<_> = letters.iter().filter(|letter| letter.is_opened()).collect();

    let mut out = String::new();
    if !ready.is_empty() {
        let _ = writeln!(out, "Ready to open");
        for letter in ready {
            let _ = writeln!(
                out,
                "  {}  {} · written {}",
                letter.id,
                letter_title(letter),
                format_date(letter.created_at)
            );
        }
    }
    if !sealed.is_empty() {
        let _ = writeln!(out, "Sealed");
        for letter in sealed {
            let _ = writeln!(
                out,
                "  {}  {} · opens {} ({})",
                letter.id,
                letter_title(letter),
                format_time_until(letter.target_date, now),
                format_date(letter.target_date)
            );
        }
    }
    if !opened.is_empty() {
        let _ = writeln!(out, "Opened");
        for letter in opened {
            let opened_at = letter
                .opened_at
                .map(format_date)
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  {}  {} · opened {}",
                letter.id,
                letter_title(letter),
                opened_at
            );
        }
    }
    out
}

pub fn format_opened_letter(letter: &Letter) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} · written {}",
        letter.mood.emoji(),
        letter_title(letter),
        format_date(letter.created_at)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", letter.body.trim());
    out
}

pub fn format_stats(stats: &EntryStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entries        {}", stats.total_entries);
    let _ = writeln!(out, "Words          {}", stats.total_words);
    let _ = writeln!(
        out,
        "Writing time   {}",
        format_writing_time(stats.total_writing_seconds)
    );
    let _ = writeln!(out, "Favorites      {}", stats.favorites);
    let _ = writeln!(
        out,
        "Streak         {} day{}",
        stats.streak,
        if stats.streak == 1 { "" } else { "s" }
    );
    let _ = writeln!(out, "Moods");
    for (mood, count) in &stats.by_mood {
        let _ = writeln!(out, "  {} {:<12} {count}", mood.emoji(), mood.label());
    }
    out
}

pub fn format_snapshots<R: Record>(snapshots: &[RecoverySnapshot<R>], excerpt_graphemes: usize) -> String {
    let mut out = String::new();
    for snapshot in snapshots {
        let _ = writeln!(
            out,
            "{}  {} · {}{}",
            snapshot.record.id(),
            R::NOUN,
            format_timestamp(snapshot.saved_at),
            if snapshot.persisted { "" } else { " · never saved" }
        );
        let excerpt = excerpt(snapshot.record.body(), excerpt_graphemes);
        if !excerpt.is_empty() {
            let _ = writeln!(out, "    {excerpt}");
        }
    }
    out
}

/// `"in 3 days"`, `"in 2 months"`; anything due within a day reads `"in 1 day"`.
pub fn format_time_until(target: OffsetDateTime, now: OffsetDateTime) -> String {
    let seconds = (target - now).whole_seconds();
    let days = (seconds + SECONDS_PER_DAY - 1).div_euclid(SECONDS_PER_DAY);
    match days {
        d if d <= 1 => "in 1 day".to_string(),
        d if d < 30 => format!("in {d} days"),
        d if d < 365 => plural("month", d / 30),
        d => plural("year", d / 365),
    }
}

fn plural(unit: &str, count: i64) -> String {
    if count == 1 {
        format!("in 1 {unit}")
    } else {
        format!("in {count} {unit}s")
    }
}

/// Whitespace-collapsed prefix of `body`, at most `max_graphemes` long.
pub fn excerpt(body: &str, max_graphemes: usize) -> String {
    if max_graphemes == 0 {
        return String::new();
    }
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut graphemes = collapsed.graphemes(true);
    let mut out: String = graphemes.by_ref().take(max_graphemes).collect();
    if graphemes.next().is_some() {
        out.truncate(out.trim_end().len());
        out.push('…');
    }
    out
}

fn mark_matches(text: &str, highlight: Option<&Regex>) -> String {
    match highlight {
        Some(regex) => regex.replace_all(text, "[$0]").into_owned(),
        None => text.to_string(),
    }
}

fn letter_title(letter: &Letter) -> &'static str {
    match letter.kind {
        LetterKind::Future => "Letter to Future Self",
        LetterKind::Past => "Letter to Past Self",
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn format_date(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
