//! Voice catalogue and selection

use serde::{Deserialize, Serialize};

/// Voice name fragments tried first, in priority order
pub const DEFAULT_PREFERRED_VOICES: &[&str] = &[
    "Google UK Female",
    "Samantha",
    "Karen",
    "Tessa",
    "Fiona",
    "Moira",
    "Veena",
    "Female",
    "Woman",
];

/// Voices offered by OpenAI-compatible speech endpoints
pub const DEFAULT_ENGINE_VOICES: &[&str] = &[
    "nova", "shimmer", "coral", "sage", "alloy", "ash", "echo", "fable", "onyx",
];

/// A voice offered by the speech engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Engine-specific voice name
    pub name: String,
    /// BCP 47 language tag (e.g. "en-GB")
    pub lang: String,
}

impl Voice {
    /// Create a voice entry
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }

    /// Parse a `name` or `name:lang` entry; the language defaults to `en-US`
    #[must_use]
    pub fn parse(entry: &str) -> Self {
        match entry.rsplit_once(':') {
            Some((name, lang)) if !lang.trim().is_empty() => Self::new(name.trim(), lang.trim()),
            _ => Self::new(entry.trim(), "en-US"),
        }
    }

    /// Whether the voice is tagged as English
    #[must_use]
    pub fn is_english(&self) -> bool {
        self.lang.to_ascii_lowercase().starts_with("en")
    }

    /// Whether the name marks the voice as male
    #[must_use]
    pub fn sounds_male(&self) -> bool {
        self.name.contains("Male") || self.name.contains("Man")
    }
}

/// Pitch, rate and volume applied to an utterance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prosody {
    /// Pitch multiplier (1.0 is the voice's natural pitch)
    pub pitch: f32,
    /// Speaking rate multiplier (1.0 is normal tempo)
    pub rate: f32,
    /// Output volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for Prosody {
    /// Slightly raised pitch at normal tempo, for a younger, softer mascot
    fn default() -> Self {
        Self {
            pitch: 1.2,
            rate: 1.0,
            volume: 1.0,
        }
    }
}

/// Pick a voice from the engine's list
///
/// Priority:
/// 1. the first preferred fragment that appears in some voice name
/// 2. an English voice not named as male
/// 3. any English voice
/// 4. the first voice
#[must_use]
pub fn select_voice<'a, S: AsRef<str>>(voices: &'a [Voice], preferred: &[S]) -> Option<&'a Voice> {
    preferred
        .iter()
        .find_map(|fragment| {
            voices
                .iter()
                .find(|v| v.name.contains(fragment.as_ref()))
        })
        .or_else(|| voices.iter().find(|v| v.is_english() && !v.sounds_male()))
        .or_else(|| voices.iter().find(|v| v.is_english()))
        .or_else(|| voices.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices(entries: &[(&str, &str)]) -> Vec<Voice> {
        entries.iter().map(|(n, l)| Voice::new(*n, *l)).collect()
    }

    #[test]
    fn test_google_uk_female_wins_regardless_of_order() {
        let front = voices(&[
            ("Google UK Female", "en-GB"),
            ("Samantha", "en-US"),
            ("Daniel", "en-GB"),
        ]);
        let back = voices(&[
            ("Daniel", "en-GB"),
            ("Samantha", "en-US"),
            ("Google UK Female", "en-GB"),
        ]);

        for list in [&front, &back] {
            let chosen = select_voice(list, DEFAULT_PREFERRED_VOICES).unwrap();
            assert_eq!(chosen.name, "Google UK Female");
        }
    }

    #[test]
    fn test_male_english_voice_skipped_for_unnamed() {
        let list = voices(&[("Google UK English Male", "en-GB"), ("", "en-US")]);

        let chosen = select_voice(&list, DEFAULT_PREFERRED_VOICES).unwrap();
        assert_eq!(chosen.name, "");
    }

    #[test]
    fn test_any_english_when_all_male() {
        let list = voices(&[("Thomas", "fr-FR"), ("Daniel Man", "en-GB")]);

        let chosen = select_voice(&list, DEFAULT_PREFERRED_VOICES).unwrap();
        assert_eq!(chosen.name, "Daniel Man");
    }

    #[test]
    fn test_first_voice_as_last_resort() {
        let list = voices(&[("Thomas", "fr-FR"), ("Anna", "de-DE")]);

        let chosen = select_voice(&list, DEFAULT_PREFERRED_VOICES).unwrap();
        assert_eq!(chosen.name, "Thomas");
    }

    #[test]
    fn test_empty_list() {
        assert!(select_voice(&[], DEFAULT_PREFERRED_VOICES).is_none());
    }

    #[test]
    fn test_female_is_not_male() {
        let voice = Voice::new("Microsoft Zira Female", "en-US");
        assert!(!voice.sounds_male());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let list = voices(&[("Karen", "en-AU"), ("Moira", "en-IE")]);
        let first = select_voice(&list, DEFAULT_PREFERRED_VOICES).cloned();
        let second = select_voice(&list, DEFAULT_PREFERRED_VOICES).cloned();
        assert_eq!(first, second);
        assert_eq!(first.unwrap().name, "Karen");
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(Voice::parse("Daniel:en-GB"), Voice::new("Daniel", "en-GB"));
        assert_eq!(Voice::parse("nova"), Voice::new("nova", "en-US"));
    }
}
