use std::cmp::{max, min};
use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Duration, Time};

use crate::model::Mood;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeFilter {
    pub from: Option<i64>,
    pub to: Option<i64>, // exclusive
}

impl RangeFilter {
    pub fn has_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        if self.from.is_some_and(|from| timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| timestamp >= to) {
            return false;
        }
        true
    }

    pub fn merge(&mut self, other: RangeFilter) {
        if let Some(from) = other.from {
            self.from = Some(match self.from {
                Some(existing) => max(existing, from),
                None => from,
            });
        }
        if let Some(to) = other.to {
            self.to = Some(match self.to {
                Some(existing) => min(existing, to),
                None => to,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortField {
    Updated,
    #[default]
    Created,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Collection filter handed to a gateway. Every field is a best-effort hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterParams {
    pub search: Option<String>,
    pub mood: Option<Mood>,
    pub favorite: Option<bool>,
    pub tags: Vec<String>,
    pub created: RangeFilter,
    pub limit: Option<usize>,
    pub sort: SortSpec,
}

impl FilterParams {
    pub fn search_terms(&self) -> Vec<String> {
        self.search
            .as_deref()
            .map(|search| {
                search
                    .split_whitespace()
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }

    pub fn has_search(&self) -> bool {
        !self.search_terms().is_empty()
    }

    pub fn has_filters(&self) -> bool {
        self.mood.is_some()
            || self.favorite.is_some()
            || !self.tags.is_empty()
            || self.created.has_range()
    }

    /// Every search term must appear (case-insensitively) in at least one field.
    pub fn matches_text<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        let terms = self.search_terms();
        if terms.is_empty() {
            return true;
        }
        let haystacks: Vec<String> = fields.into_iter().map(str::to_lowercase).collect();
        terms
            .iter()
            .all(|term| haystacks.iter().any(|field| field.contains(term.as_str())))
    }

    /// All requested tags must be present (case-insensitive).
    pub fn matches_tags<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let present: HashSet<String> = tags.into_iter().map(|tag| tag.to_lowercase()).collect();
        self.tags
            .iter()
            .all(|wanted| present.contains(&wanted.to_lowercase()))
    }

    /// Case-insensitive regex over the search terms, longest first, for marking hits.
    pub fn highlight_regex(&self) -> Option<Regex> {
        let mut terms = self.search_terms();
        terms.sort_by(|a, b| b.len().cmp(&a.len()));
        terms.dedup();
        if terms.is_empty() {
            return None;
        }
        let pattern = terms
            .iter()
            .map(|term| regex::escape(term))
            .collect::<Vec<_>>()
            .join("|");
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .ok()
    }
}

/// Parses `mood:joyful tag:poetry fav created:2024-01-01..2024-02-01 free text`.
pub fn parse_filter(input: &str) -> FilterParams {
    let mut filter = FilterParams::default();
    let mut words = Vec::new();
    for raw in input.split_whitespace() {
        if let Some(tag) = raw.strip_prefix("tag:") {
            if let Some(value) = sanitize_term(tag) {
                filter.tags.push(value.to_lowercase());
            }
            continue;
        }
        if let Some(mood) = raw.strip_prefix("mood:") {
            match Mood::resolve(mood) {
                Some(mood) => filter.mood = Some(mood),
                None => tracing::warn!(mood, "ignoring unknown mood filter"),
            }
            continue;
        }
        if raw.eq_ignore_ascii_case("fav") || raw.eq_ignore_ascii_case("favorite") {
            filter.favorite = Some(true);
            continue;
        }
        if let Some(flag) = raw.strip_prefix("favorite:") {
            filter.favorite = parse_flag(flag);
            continue;
        }
        if let Some(range) = raw.strip_prefix("created:") {
            filter.created.merge(parse_date_range(range));
            continue;
        }
        if let Some(value) = sanitize_term(raw) {
            words.push(value);
        }
    }
    if !words.is_empty() {
        filter.search = Some(words.join(" "));
    }
    filter
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn sanitize_term(raw: &str) -> Option<String> {
    let term: String = raw
        .chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | '\''))
        .collect();
    if term.is_empty() {
        None
    } else {
        Some(term)
    }
}

fn parse_date_range(spec: &str) -> RangeFilter {
    let mut range = RangeFilter::default();
    let parts: Vec<&str> = spec.split("..").collect();
    match parts.as_slice() {
        [single] => {
            if let Some((from, to)) = parse_single_date(single) {
                range.from = Some(from);
                range.to = Some(to);
            }
        }
        [from, to] => {
            if !from.is_empty() {
                if let Some((start, _)) = parse_single_date(from) {
                    range.from = Some(start);
                }
            }
            if !to.is_empty() {
                if let Some((_, end)) = parse_single_date(to) {
                    range.to = Some(end);
                }
            }
        }
        _ => {}
    }
    range
}

fn parse_single_date(input: &str) -> Option<(i64, i64)> {
    let date = Date::parse(input, format_description!("[year]-[month]-[day]")).ok()?;
    let from = date.with_time(Time::MIDNIGHT).assume_utc().unix_timestamp();
    let to = date
        .checked_add(Duration::days(1))?
        .with_time(Time::MIDNIGHT)
        .assume_utc()
        .unix_timestamp();
    Some((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mood_tags_flags_and_free_text() {
        let filter = parse_filter("mood:joyful tag:Poetry fav rainy afternoon");
        assert_eq!(filter.mood, Some(Mood::Joyful));
        assert_eq!(filter.tags, vec!["poetry".to_string()]);
        assert_eq!(filter.favorite, Some(true));
        assert_eq!(filter.search.as_deref(), Some("rainy afternoon"));
    }

    #[test]
    fn unknown_mood_is_ignored_and_favorite_flag_can_be_negative() {
        let filter = parse_filter("mood:wistful favorite:no");
        assert_eq!(filter.mood, None);
        assert_eq!(filter.favorite, Some(false));
        assert!(filter.search.is_none());
    }

    #[test]
    fn created_range_is_half_open_over_days() {
        let filter = parse_filter("created:2024-03-01..2024-03-02");
        let start = filter.created.from.expect("from");
        let end = filter.created.to.expect("to");
        assert_eq!(end - start, 2 * 86_400);
        assert!(filter.created.contains(start));
        assert!(!filter.created.contains(end));
    }

    #[test]
    fn highlight_prefers_longer_terms() {
        let mut filter = FilterParams::default();
        filter.search = Some("book Bookshelf".into());
        let regex = filter.highlight_regex().expect("regex");
        let hits: Vec<_> = regex.find_iter("my bookshelf").map(|m| m.as_str()).collect();
        assert_eq!(hits, vec!["bookshelf"]);
    }

    #[test]
    fn text_match_requires_every_term() {
        let mut filter = FilterParams::default();
        filter.search = Some("tea rain".into());
        assert!(filter.matches_text(["Rain on the window", "and tea"]));
        assert!(!filter.matches_text(["Rain on the window"]));
    }
}
