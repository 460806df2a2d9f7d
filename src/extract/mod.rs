//! Opinion extraction from generated text.
//!
//! Each agent's segment of a conversation is resolved independently through
//! a fixed cascade. The first tier that yields a number wins:
//!
//! | Tier | Rule | Example |
//! |------|------|---------|
//! | 1 `ExactLabel` | `OPINION:` immediately followed by a number | `OPINION: -0.7` |
//! | 2 `LabelLine` | any number on a line carrying the label, any case | `Opinion: I'd say 0.6` |
//! | 3 `OpinionWindow` | a number within a few tokens of the word "opinion" | `my opinion is around 0.4` |
//!
//! Emphasis markers are stripped first, so `**OPINION:** 0.85` is a tier 1
//! match. Within a tier the last occurrence wins, since the score is asked for
//! at the end of a turn. Values are clamped to [-1.0, 1.0]. When no tier
//! matches, extraction fails explicitly; it never defaults to zero.
//!
//! The tier order is part of the transcript format and must not change.

mod patterns;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::Opinion;
use crate::conversation::{Conversation, Role};

pub use patterns::NUMBER;
use patterns::{
    ANY_NUMBER, EMPHASIS, LABEL_ANY_CASE, LABEL_NUMBER, OPINION_WORD, SCORE_LINE, TEMPLATE_ECHO,
};

/// Marker that precedes a self-reported score.
pub const CANONICAL_LABEL: &str = "OPINION:";

/// Default token window for tier 3.
pub const DEFAULT_WINDOW: usize = 6;

/// Which cascade tier produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Canonical label followed immediately by a number
    ExactLabel,
    /// Number on the same line as the label
    LabelLine,
    /// Number near the word "opinion"
    OpinionWindow,
}

impl Tier {
    /// 1-based tier number.
    pub fn number(&self) -> u8 {
        match self {
            Tier::ExactLabel => 1,
            Tier::LabelLine => 2,
            Tier::OpinionWindow => 3,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::ExactLabel => "exact-label",
            Tier::LabelLine => "label-line",
            Tier::OpinionWindow => "opinion-window",
        };
        write!(f, "tier {} ({name})", self.number())
    }
}

/// A successfully extracted score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extracted {
    /// Clamped opinion
    pub opinion: Opinion,
    /// Number as written, before clamping
    pub raw_value: f64,
    /// Tier that matched
    pub tier: Tier,
}

/// No tier found a number.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no opinion score found")]
pub struct ExtractionFailure;

/// Extraction outcome for both sides of a conversation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversationScores {
    /// Opener's score
    pub a: Result<Extracted, ExtractionFailure>,
    /// Responder's score
    pub b: Result<Extracted, ExtractionFailure>,
}

/// Cascading score extractor.
#[derive(Debug, Clone, Copy)]
pub struct OpinionExtractor {
    window: usize,
}

impl Default for OpinionExtractor {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl OpinionExtractor {
    /// Extractor with the default tier 3 window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tier 3 token window.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Resolve one agent's segment.
    pub fn extract(&self, segment: &str) -> Result<Extracted, ExtractionFailure> {
        let text = strip_emphasis(segment);

        if let Some(value) = exact_label(&text) {
            return Ok(Self::found(value, Tier::ExactLabel));
        }

        let text = TEMPLATE_ECHO.replace_all(&text, "");
        if let Some(value) = label_line(&text) {
            return Ok(Self::found(value, Tier::LabelLine));
        }
        if let Some(value) = self.opinion_window(&text) {
            return Ok(Self::found(value, Tier::OpinionWindow));
        }
        Err(ExtractionFailure)
    }

    /// Resolve both participants of a conversation from their own turns.
    pub fn extract_conversation(&self, conversation: &Conversation) -> ConversationScores {
        ConversationScores {
            a: self.extract(&conversation.segment(Role::A)),
            b: self.extract(&conversation.segment(Role::B)),
        }
    }

    fn found(raw_value: f64, tier: Tier) -> Extracted {
        Extracted {
            opinion: Opinion::new(raw_value),
            raw_value,
            tier,
        }
    }

    fn opinion_window(&self, text: &str) -> Option<f64> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let anchors = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| OPINION_WORD.is_match(t))
            .map(|(i, _)| i)
            .rev();

        for i in anchors {
            // A number glued to the anchor ("opinion=0.4") counts first.
            let tail = OPINION_WORD
                .find(tokens[i])
                .map_or("", |m| &tokens[i][m.end()..]);
            if let Some(v) = parse_number(tail) {
                return Some(v);
            }
            let after = tokens.iter().skip(i + 1).take(self.window);
            let before = tokens[i.saturating_sub(self.window)..i].iter().rev();
            if let Some(v) = after.chain(before).find_map(|t| parse_number(t)) {
                return Some(v);
            }
        }
        None
    }
}

fn exact_label(text: &str) -> Option<f64> {
    LABEL_NUMBER
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .last()
}

fn label_line(text: &str) -> Option<f64> {
    text.lines().rev().find_map(|line| {
        let label = LABEL_ANY_CASE.find_iter(line).last()?;
        // "moved from 0.2 to 0.5" reads as the later number.
        let after = ANY_NUMBER
            .find_iter(&line[label.end()..])
            .last()
            .and_then(|m| m.as_str().parse::<f64>().ok());
        after.or_else(|| {
            ANY_NUMBER
                .find_iter(&line[..label.start()])
                .last()
                .and_then(|m| m.as_str().parse::<f64>().ok())
        })
    })
}

fn parse_number(token: &str) -> Option<f64> {
    ANY_NUMBER
        .find(token)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Remove inline emphasis markers.
pub fn strip_emphasis(text: &str) -> Cow<'_, str> {
    EMPHASIS.replace_all(text, "")
}

/// Remove score labels from a turn, leaving the spoken text.
///
/// Everything from the label to the end of its line is dropped, wherever the
/// label sits on the line.
pub fn strip_score_lines(text: &str) -> String {
    SCORE_LINE.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::conversation::Turn;

    fn extract(text: &str) -> Result<Extracted, ExtractionFailure> {
        OpinionExtractor::new().extract(text)
    }

    #[test]
    fn test_tier1_exact_label() {
        let e = extract("Nuclear is the bridge fuel we need.\nOPINION: -0.7").unwrap();
        assert_eq!(e.tier, Tier::ExactLabel);
        assert!((e.opinion.value() + 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_tier1_through_markdown() {
        let e = extract("**OPINION:** 0.85 somehow").unwrap();
        assert_eq!(e.tier, Tier::ExactLabel);
        assert!((e.opinion.value() - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_tier1_last_match_wins() {
        let e = extract("Earlier OPINION: 0.1\nOn reflection.\nOPINION: 0.6").unwrap();
        assert!((e.opinion.value() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_tier1_clamps() {
        let e = extract("OPINION: 7.5").unwrap();
        assert_eq!(e.opinion.value(), 1.0);
        assert_eq!(e.raw_value, 7.5);
        let e = extract("OPINION: -2").unwrap();
        assert_eq!(e.opinion.value(), -1.0);
    }

    #[test]
    fn test_tier1_precedence_over_other_numbers() {
        let text = "My opinion is 0.9 overall.\nOpinion: maybe 0.5\nOPINION: -0.2";
        let e = extract(text).unwrap();
        assert_eq!(e.tier, Tier::ExactLabel);
        assert!((e.opinion.value() + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_tier2_label_line() {
        let e = extract("Fine.\nOpinion: I'd put it at 0.6 now").unwrap();
        assert_eq!(e.tier, Tier::LabelLine);
        assert!((e.opinion.value() - 0.6).abs() < 1e-12);

        let e = extract("OPINION: roughly -0.35").unwrap();
        assert_eq!(e.tier, Tier::LabelLine);
        assert!((e.opinion.value() + 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_tier2_beats_tier3() {
        let e = extract("my opinion is 0.2 overall\nOpinion: I'd say 0.6").unwrap();
        assert_eq!(e.tier, Tier::LabelLine);
        assert!((e.opinion.value() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_tier2_last_number_after_label() {
        let e = extract("Opinion: moved from 0.2 to 0.5").unwrap();
        assert_eq!(e.tier, Tier::LabelLine);
        assert!((e.opinion.value() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_tier2_number_before_label() {
        let e = extract("Score 0.25 is my opinion: final").unwrap();
        assert_eq!(e.tier, Tier::LabelLine);
        assert!((e.opinion.value() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_tier3_window() {
        let e = extract("I think my opinion is around 0.4 honestly").unwrap();
        assert_eq!(e.tier, Tier::OpinionWindow);
        assert!((e.opinion.value() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_tier3_respects_window() {
        let text = "opinion one two three four five six seven eight 0.4";
        assert!(OpinionExtractor::new().with_window(3).extract(text).is_err());
        assert!(OpinionExtractor::new().with_window(10).extract(text).is_ok());
    }

    #[test]
    fn test_tier3_number_before_word() {
        let e = extract("I land at -0.3 in my opinion.").unwrap();
        assert_eq!(e.tier, Tier::OpinionWindow);
        assert!((e.opinion.value() + 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_no_number_fails() {
        assert_eq!(extract("I strongly disagree with everything."), Err(ExtractionFailure));
        assert_eq!(extract(""), Err(ExtractionFailure));
        assert_eq!(extract("My opinion has not changed."), Err(ExtractionFailure));
    }

    #[test]
    fn test_echoed_template_fails() {
        let text = "I hold firm.\nOPINION: <your updated opinion as a float from -1.0 to 1.0>";
        assert_eq!(extract(text), Err(ExtractionFailure));
    }

    #[test]
    fn test_conversation_segments_are_independent() {
        let conv = Conversation::new(
            2,
            AgentId(0),
            AgentId(1),
            vec![
                Turn::new(crate::conversation::Role::A, "Opening."),
                Turn::new(crate::conversation::Role::B, "Nope.\nOPINION: -0.5"),
                Turn::new(crate::conversation::Role::A, "I have nothing numeric to add."),
            ],
        );
        let scores = OpinionExtractor::new().extract_conversation(&conv);
        assert_eq!(scores.a, Err(ExtractionFailure));
        assert!((scores.b.unwrap().opinion.value() + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_strip_score_lines() {
        assert_eq!(strip_score_lines("Point made.\nOPINION: 0.4"), "Point made.");
        assert_eq!(strip_score_lines("Point.\n**Opinion:** 0.4\n"), "Point.");
        assert_eq!(strip_score_lines("No label here."), "No label here.");
        assert_eq!(strip_score_lines("I hold firm. OPINION: 0.3"), "I hold firm.");
        assert_eq!(
            strip_score_lines("Nope. **OPINION:** -0.4\nStill nope."),
            "Nope.\nStill nope."
        );
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::ExactLabel.to_string(), "tier 1 (exact-label)");
        assert!(Tier::ExactLabel < Tier::OpinionWindow);
    }
}
