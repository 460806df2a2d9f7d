//! # Parley - LLM-driven opinion dynamics
//!
//! Agents hold a scalar opinion on a topic. Each simulation tick pairs two of
//! them for a short conversation generated by a language model; each agent's
//! self-reported score is read back out of the text and becomes its new
//! opinion.
//!
//! ## Pipeline
//!
//! ```text
//!   Session::run_conversation(a, b, tick)
//!        │
//!        ├─► MemoryStore::recent ──────────► last K entries per agent
//!        ├─► ConversationGenerator ────────► 3 turns via Backend::generate
//!        ├─► OpinionExtractor ─────────────► score per agent (tiers 1-3)
//!        │       └─ failure ─► Perturbation
//!        └─► Run::record_tick ─────────────► agent_<id>.txt, transcript.txt,
//!                                            parse_failures.jsonl
//! ```
//!
//! ## Backends
//!
//! | Kind | Provider | Configured by |
//! |------|----------|---------------|
//! | `local` | Ollama `/api/generate` | `OLLAMA_URL` (default `http://localhost:11434`) |
//! | `remote` | OpenRouter chat completions | `OPENROUTER_API_KEY` |
//!
//! ## Score label
//!
//! Every scored turn is expected to end with `OPINION: <number>`. This label is
//! the text protocol existing transcripts depend on; see [`extract`] for the
//! fallbacks applied when a model strays from it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::{AgentId, Config, Session, SetupParams};
//!
//! let mut session = Session::setup(SetupParams::new(4, "nuclear power"), Config::load(None)?)?;
//! println!("initial: {:?}", session.opinions());
//!
//! let outcome = session.run_conversation(AgentId(0), AgentId(2), 1, None)?;
//! println!("{} -> {} / {}", outcome.snippet, outcome.opinion_a, outcome.opinion_b);
//! ```
//!
//! ## Modules
//!
//! - [`session`]: setup and per-tick orchestration
//! - [`backend`]: Ollama and OpenRouter clients
//! - [`conversation`]: prompt templates and three-turn generation
//! - [`extract`]: score extraction cascade
//! - [`perturb`]: fallback for unreadable scores
//! - [`memory`]: per-agent append-only history
//! - [`run`]: run directories, transcript, failure log, offline summary
//! - [`config`]: configuration management
//! - [`error`]: error types and result aliases

pub mod agent;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod memory;
pub mod perturb;
pub mod run;
pub mod session;

// Re-exports for convenience
pub use agent::{Agent, AgentId, Opinion};
pub use backend::{Backend, BackendError, BackendKind, GenerateRequest};
pub use config::Config;
pub use conversation::{Conversation, ConversationGenerator, Role, Turn};
pub use error::{ParleyError, Result};
pub use extract::{Extracted, ExtractionFailure, OpinionExtractor, Tier, CANONICAL_LABEL};
pub use memory::{MemoryEntry, MemoryStore};
pub use perturb::Perturbation;
pub use run::{FailureRecord, Run, RunSummary};
pub use session::{ConversationOutcome, Resolution, Session, SetupParams};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
