//! Emotion tagging for answers
//!
//! Keyword overrides first, then lexicon sentiment, then answer length.

use crate::turn::Emotion;

/// Fragments that make an answer sound like advice
const ADVICE_KEYWORDS: &[&str] = &["suggest", "recommend", "should", "consider", "advice"];

/// Fragments that make an answer sound surprised
const SURPRISE_KEYWORDS: &[&str] = &["wow", "amazing", "incredible", "surprising"];

/// Polarity beyond which an answer reads as happy or sad
const POLARITY_THRESHOLD: f32 = 0.3;

/// Answers shorter than this many words stay neutral
const SHORT_ANSWER_WORDS: usize = 5;

/// Words that flip and soften the polarity of the next sentiment word
const NEGATIONS: &[&str] = &["not", "never", "no", "isn't", "aren't", "don't", "doesn't"];

/// Word polarities in `-1.0..=1.0`
const LEXICON: &[(&str, f32)] = &[
    ("awesome", 1.0),
    ("beautiful", 0.85),
    ("best", 1.0),
    ("brilliant", 0.9),
    ("correct", 0.5),
    ("delighted", 0.7),
    ("easy", 0.43),
    ("enjoy", 0.4),
    ("excellent", 1.0),
    ("exciting", 0.3),
    ("fantastic", 0.4),
    ("fun", 0.3),
    ("glad", 0.5),
    ("good", 0.7),
    ("great", 0.8),
    ("happy", 0.8),
    ("interesting", 0.5),
    ("love", 0.5),
    ("lovely", 0.5),
    ("nice", 0.6),
    ("perfect", 1.0),
    ("right", 0.29),
    ("success", 0.3),
    ("well", 0.3),
    ("wonderful", 1.0),
    ("angry", -0.5),
    ("awful", -1.0),
    ("bad", -0.7),
    ("boring", -1.0),
    ("broken", -0.4),
    ("dangerous", -0.6),
    ("difficult", -0.5),
    ("fail", -0.5),
    ("failed", -0.5),
    ("hard", -0.29),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("poor", -0.4),
    ("sad", -0.5),
    ("sorry", -0.5),
    ("terrible", -1.0),
    ("unfortunately", -0.5),
    ("worse", -0.4),
    ("worst", -1.0),
    ("wrong", -0.5),
];

/// Pick the mascot emotion for an answer
#[must_use]
pub fn detect_emotion(answer: &str) -> Emotion {
    if answer.trim().is_empty() {
        return Emotion::Neutral;
    }

    let lower = answer.to_lowercase();

    if ADVICE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Emotion::Thinking;
    }
    if SURPRISE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Emotion::Surprised;
    }

    let polarity = polarity(&lower);
    if polarity > POLARITY_THRESHOLD {
        return Emotion::Happy;
    }
    if polarity < -POLARITY_THRESHOLD {
        return Emotion::Sad;
    }

    if lower.split_whitespace().count() < SHORT_ANSWER_WORDS {
        Emotion::Neutral
    } else {
        Emotion::Explaining
    }
}

/// Mean polarity of the sentiment words in lowercase text, 0.0 if none
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn polarity(lower: &str) -> f32 {
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    let scores: Vec<f32> = words
        .iter()
        .enumerate()
        .filter_map(|(i, word)| {
            let (_, score) = LEXICON.iter().find(|(w, _)| w == word)?;
            let negated = i > 0 && NEGATIONS.contains(&words[i - 1]);
            Some(if negated { -0.5 * score } else { *score })
        })
        .collect();

    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    }
}
