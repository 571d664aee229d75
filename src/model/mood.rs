use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Mood {
    Heartbroken,
    #[default]
    Healing,
    Empowered,
    Joyful,
}

impl Mood {
    /// Legacy numeric code used by older clients and the storage schema.
    pub fn code(self) -> u8 {
        match self {
            Mood::Heartbroken => 1,
            Mood::Healing => 2,
            Mood::Empowered => 3,
            Mood::Joyful => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Mood::iter().find(|mood| i64::from(mood.code()) == code)
    }

    /// Accepts a mood key ("joyful") or a legacy code ("4").
    pub fn resolve(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Ok(code) = trimmed.parse::<i64>() {
            return Self::from_code(code);
        }
        trimmed.parse().ok()
    }

    /// Like [`Mood::resolve`], falling back to the default mood.
    pub fn resolve_or_default(raw: &str) -> Self {
        Self::resolve(raw).unwrap_or_default()
    }

    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn label(self) -> &'static str {
        match self {
            Mood::Heartbroken => "Heartbroken",
            Mood::Healing => "Healing",
            Mood::Empowered => "Empowered",
            Mood::Joyful => "Joyful",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Mood::Heartbroken => "💔",
            Mood::Healing => "🌸",
            Mood::Empowered => "🔥",
            Mood::Joyful => "😊",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Mood::Heartbroken => "Processing difficult emotions",
            Mood::Healing => "Finding strength and growth",
            Mood::Empowered => "Feeling strong and capable",
            Mood::Joyful => "Feeling happy and content",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_keys_and_legacy_codes() {
        assert_eq!(Mood::resolve("joyful"), Some(Mood::Joyful));
        assert_eq!(Mood::resolve("Heartbroken"), Some(Mood::Heartbroken));
        assert_eq!(Mood::resolve("3"), Some(Mood::Empowered));
        assert_eq!(Mood::resolve("9"), None);
        assert_eq!(Mood::resolve("wistful"), None);
    }

    #[test]
    fn unknown_moods_fall_back_to_healing() {
        assert_eq!(Mood::resolve_or_default("wistful"), Mood::Healing);
        assert_eq!(Mood::resolve_or_default("0"), Mood::Healing);
    }

    #[test]
    fn codes_round_trip_for_every_mood() {
        for mood in Mood::iter() {
            assert_eq!(Mood::from_code(i64::from(mood.code())), Some(mood));
            assert_eq!(mood.to_string(), mood.key());
        }
    }
}
