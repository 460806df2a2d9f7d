//! Prompt templates.
//!
//! Turn 1 asks the opener for a position and one argument. Turns 2 and 3 ask
//! for a reply followed by the score line, which is the text protocol the
//! extractor reads back.

use crate::agent::Opinion;
use crate::extract::CANONICAL_LABEL;
use crate::memory::{render_context, MemoryEntry};

/// Instruction added when the two opinions are close.
pub const DEVILS_ADVOCATE: &str = "Challenge the other person's reasoning even if you partly agree. \
     Play devil's advocate to explore weaknesses in their argument.";

/// What one speaker knows when producing a turn.
#[derive(Debug, Clone, Copy)]
pub struct SpeakerContext<'a> {
    /// Discussion topic
    pub topic: &'a str,
    /// Speaker's current opinion
    pub opinion: Opinion,
    /// Listener's current opinion
    pub other_opinion: Opinion,
    /// Speaker's persona/rationale
    pub persona: Option<&'a str>,
    /// Speaker's recent memory, oldest first
    pub memory: &'a [MemoryEntry],
    /// Add the devil's-advocate instruction
    pub devils_advocate: bool,
}

impl SpeakerContext<'_> {
    fn header(&self) -> String {
        let mut out = format!(
            "Topic: \"{}\"\nYour position: {} (score: {:.2})\n",
            self.topic,
            self.opinion.stance(self.topic),
            self.opinion.value()
        );
        if let Some(persona) = self.persona {
            out.push_str(&format!("Your reasoning: {persona}\n"));
        }
        out.push_str(&format!(
            "The other person's position: {} (score: {:.2})\n",
            self.other_opinion.stance(self.topic),
            self.other_opinion.value()
        ));
        if !self.memory.is_empty() {
            out.push_str(&format!(
                "\nYour recent conversation history:\n{}\n",
                render_context(self.memory)
            ));
        }
        out.push('\n');
        if self.devils_advocate {
            out.push_str(DEVILS_ADVOCATE);
            out.push_str("\n\n");
        }
        out
    }
}

fn score_instruction() -> String {
    format!(
        "After your response, on a new line write exactly: \
         {CANONICAL_LABEL} <your updated opinion as a float from -1.0 to 1.0>"
    )
}

/// Turn 1: the opener states a position.
pub fn opening(ctx: &SpeakerContext<'_>) -> String {
    format!(
        "{}State your position on this topic and give ONE specific argument supporting it. \
         Be direct, no hedging or seeking common ground. 1-3 sentences only.",
        ctx.header()
    )
}

/// Turn 2: the responder answers the opening and scores itself.
pub fn response(ctx: &SpeakerContext<'_>, opening: &str) -> String {
    format!(
        "{}Someone said: \"{opening}\"\n\n\
         Respond to their argument. Defend your own position with a specific counterpoint \
         or evidence. Do not simply agree. 1-3 sentences only.\n\n{}",
        ctx.header(),
        score_instruction()
    )
}

/// Turn 3: the opener answers the reply and scores itself.
pub fn closing(ctx: &SpeakerContext<'_>, opening: &str, reply: &str) -> String {
    format!(
        "{}Conversation so far:\nYou said: \"{opening}\"\nThey replied: \"{reply}\"\n\n\
         Respond to their points. You may shift your view if they made a compelling argument, \
         or push back if you disagree. Be specific. 1-3 sentences only.\n\n{}",
        ctx.header(),
        score_instruction()
    )
}

/// One-time rationale for an agent holding `opinion`.
pub fn persona(topic: &str, opinion: Opinion) -> String {
    format!(
        "The topic is: \"{topic}\"\n\
         A person's opinion on this is {:.2} on a scale from -1.0 (strongly against) \
         to +1.0 (strongly in favor).\n\
         Write ONE specific sentence explaining why they hold this position. \
         Be concrete: reference a specific concern, experience, or value. Do not be generic.",
        opinion.value()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;

    fn ctx<'a>(memory: &'a [MemoryEntry], devils_advocate: bool) -> SpeakerContext<'a> {
        SpeakerContext {
            topic: "nuclear power",
            opinion: Opinion::new(0.45),
            other_opinion: Opinion::new(-0.7),
            persona: Some("Grid stability matters."),
            memory,
            devils_advocate,
        }
    }

    #[test]
    fn test_opening_has_no_score_request() {
        let prompt = opening(&ctx(&[], false));
        assert!(prompt.contains("Topic: \"nuclear power\""));
        assert!(prompt.contains("(score: 0.45)"));
        assert!(prompt.contains("(score: -0.70)"));
        assert!(prompt.contains("Your reasoning: Grid stability matters."));
        assert!(!prompt.contains("OPINION:"));
        assert!(!prompt.contains("devil's advocate"));
        assert!(!prompt.contains("history"));
    }

    #[test]
    fn test_response_includes_prior_turn_and_label() {
        let prompt = response(&ctx(&[], true), "Reactors are safe.");
        assert!(prompt.contains("Someone said: \"Reactors are safe.\""));
        assert!(prompt.ends_with("OPINION: <your updated opinion as a float from -1.0 to 1.0>"));
        assert!(prompt.contains(DEVILS_ADVOCATE));
    }

    #[test]
    fn test_closing_includes_memory_oldest_first() {
        let memory = vec![
            MemoryEntry::conversation(1, AgentId(4), "A: first", 0.1, None),
            MemoryEntry::conversation(2, AgentId(5), "A: second", 0.2, None),
        ];
        let prompt = closing(&ctx(&memory, false), "one", "two");
        let first = prompt.find("[Tick 1]").unwrap();
        let second = prompt.find("[Tick 2]").unwrap();
        assert!(first < second);
        assert!(prompt.contains("You said: \"one\"\nThey replied: \"two\""));
    }

    #[test]
    fn test_persona_prompt() {
        let prompt = persona("rent control", Opinion::new(-0.25));
        assert!(prompt.contains("-0.25"));
        assert!(prompt.contains("ONE specific sentence"));
    }
}
