//! Three-turn conversation generation.
//!
//! ```text
//! Turn 1  A  opening          (no score)
//! Turn 2  B  reply to 1       ... OPINION: <b>
//! Turn 3  A  reply to 1 + 2   ... OPINION: <a>
//! ```
//!
//! Turns are generated strictly in order because each prompt embeds the turns
//! before it. A failed backend call is replaced by a canned turn so the tick
//! can still complete; only when every call fails does generation return
//! [`ParleyError::TickFailed`].

pub mod prompt;

use std::time::Duration;

use crate::agent::{AgentId, Opinion};
use crate::backend::{Backend, BackendError, GenerateRequest};
use crate::config::ConversationConfig;
use crate::error::{ParleyError, Result};
use crate::extract::{strip_score_lines, CANONICAL_LABEL};
use crate::memory::MemoryEntry;

use prompt::SpeakerContext;

/// Rationale used when persona generation fails.
pub const NO_RATIONALE: &str = "No specific reason given.";

/// Number of turns in every conversation.
pub const TURNS: usize = 3;

/// Which side of the exchange spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The agent that opens (and closes) the conversation
    A,
    /// The agent that responds
    B,
}

impl Role {
    /// Speaker label used in transcripts and memory.
    pub fn label(&self) -> &'static str {
        match self {
            Role::A => "A",
            Role::B => "B",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Speaker side
    pub role: Role,
    /// Raw text as generated (score line included)
    pub text: String,
    /// Canned text substituted for a failed backend call
    pub substituted: bool,
}

impl Turn {
    /// Turn produced by the backend.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            substituted: false,
        }
    }

    /// Canned turn standing in for a failed call.
    pub fn substituted(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            substituted: true,
        }
    }

    /// Text with score lines removed.
    pub fn display_text(&self) -> String {
        strip_score_lines(&self.text)
    }
}

/// An ordered exchange between two agents at one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    tick: u64,
    agent_a: AgentId,
    agent_b: AgentId,
    turns: Vec<Turn>,
}

impl Conversation {
    /// Assemble a conversation from its turns.
    pub fn new(tick: u64, agent_a: AgentId, agent_b: AgentId, turns: Vec<Turn>) -> Self {
        Self {
            tick,
            agent_a,
            agent_b,
            turns,
        }
    }

    /// Tick the conversation happened at.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// `(a, b)` participant ids.
    pub fn participants(&self) -> (AgentId, AgentId) {
        (self.agent_a, self.agent_b)
    }

    /// Turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Labelled turns with score lines removed, as stored in memory.
    pub fn display_text(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.display_text()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Raw text spoken by one side, turns joined by newlines.
    pub fn segment(&self, role: Role) -> String {
        self.turns
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.text.trim())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Short excerpt of the opening turn for live display.
    pub fn snippet(&self, max_chars: usize) -> String {
        match self.turns.first() {
            Some(turn) => {
                let text = turn.display_text();
                let cut: String = text.chars().take(max_chars).collect();
                format!("{}: {}", turn.role.label(), cut)
            },
            None => "...".to_string(),
        }
    }

    /// Number of turns that were canned substitutes.
    pub fn substituted_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.substituted).count()
    }
}

/// What the generator needs to know about one participant.
#[derive(Debug, Clone, Copy)]
pub struct Participant<'a> {
    /// Agent id
    pub id: AgentId,
    /// Opinion before this tick
    pub opinion: Opinion,
    /// Persona/rationale, if any
    pub persona: Option<&'a str>,
    /// Recent memory, oldest first
    pub memory: &'a [MemoryEntry],
}

/// Input of one conversation.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    /// Tick index
    pub tick: u64,
    /// Discussion topic
    pub topic: &'a str,
    /// Model identifier
    pub model: &'a str,
    /// Opener
    pub a: Participant<'a>,
    /// Responder
    pub b: Participant<'a>,
}

/// Builds conversations by calling a backend once per turn.
#[derive(Debug, Clone)]
pub struct ConversationGenerator {
    config: ConversationConfig,
    timeout: Duration,
}

impl ConversationGenerator {
    /// Create a generator with the given sampling settings.
    pub fn new(config: ConversationConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Whether two opinions are close enough to ask for devil's advocacy.
    pub fn needs_devils_advocate(&self, a: Opinion, b: Opinion) -> bool {
        a.distance(b) < self.config.closeness_threshold
    }

    fn request(&self, prompt: String, model: &str) -> GenerateRequest {
        GenerateRequest::new(prompt, model)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_timeout(self.timeout)
    }

    /// Generate the three turns of `exchange`.
    pub fn generate(&self, backend: &dyn Backend, exchange: &Exchange<'_>) -> Result<Conversation> {
        let Exchange { tick, topic, model, a, b } = *exchange;
        let devils_advocate = self.needs_devils_advocate(a.opinion, b.opinion);
        if devils_advocate {
            tracing::debug!(tick, gap = a.opinion.distance(b.opinion), "Adding devil's advocate instruction");
        }

        let ctx_a = SpeakerContext {
            topic,
            opinion: a.opinion,
            other_opinion: b.opinion,
            persona: a.persona,
            memory: a.memory,
            devils_advocate,
        };
        let ctx_b = SpeakerContext {
            topic,
            opinion: b.opinion,
            other_opinion: a.opinion,
            persona: b.persona,
            memory: b.memory,
            devils_advocate,
        };

        let mut failures = 0;
        let mut last_error: Option<BackendError> = None;
        let mut call = |prompt: String, role: Role, canned: String| -> Turn {
            match backend.generate(&self.request(prompt, model)) {
                Ok(text) if !text.trim().is_empty() => Turn::new(role, text),
                Ok(_) => {
                    tracing::warn!(tick, role = role.label(), "Empty backend reply, using canned turn");
                    Turn::substituted(role, canned)
                },
                Err(e) => {
                    tracing::warn!(tick, role = role.label(), backend = backend.name(), "Turn failed: {e}");
                    failures += 1;
                    last_error = Some(e);
                    Turn::substituted(role, canned)
                },
            }
        };

        let turn1 = call(
            prompt::opening(&ctx_a),
            Role::A,
            format!("I believe {}.", a.opinion.stance(topic)),
        );
        let opening = turn1.display_text();

        let turn2 = call(
            prompt::response(&ctx_b, &opening),
            Role::B,
            format!(
                "I disagree. {}.\n{CANONICAL_LABEL} {:.2}",
                b.opinion.stance(topic),
                b.opinion.value()
            ),
        );
        let reply = turn2.display_text();

        let turn3 = call(
            prompt::closing(&ctx_a, &opening, &reply),
            Role::A,
            format!(
                "That's an interesting point, but I maintain my view.\n{CANONICAL_LABEL} {:.2}",
                a.opinion.value()
            ),
        );

        if failures == TURNS {
            if let Some(source) = last_error {
                return Err(ParleyError::TickFailed {
                    tick,
                    attempts: TURNS,
                    source,
                });
            }
        }

        Ok(Conversation::new(tick, a.id, b.id, vec![turn1, turn2, turn3]))
    }

    /// Generate a one-sentence rationale, falling back to [`NO_RATIONALE`].
    pub fn generate_persona(
        &self,
        backend: &dyn Backend,
        model: &str,
        topic: &str,
        opinion: Opinion,
    ) -> String {
        let request = GenerateRequest::new(prompt::persona(topic, opinion), model)
            .with_max_tokens(self.config.persona_max_tokens)
            .with_temperature(self.config.persona_temperature)
            .with_timeout(self.timeout);

        match backend.generate(&request) {
            Ok(text) => match text.lines().map(str::trim).find(|l| !l.is_empty()) {
                Some(line) => line.to_string(),
                None => NO_RATIONALE.to_string(),
            },
            Err(e) => {
                tracing::warn!(backend = backend.name(), "Persona generation failed: {e}");
                NO_RATIONALE.to_string()
            },
        }
    }
}
