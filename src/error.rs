//! Parley error types.
//!
//! # Error Classification
//!
//! | Variant | Fatal for | Origin |
//! |---------|-----------|--------|
//! | `Config` | setup | missing credential, empty model id, bad values |
//! | `InvalidAgentCount` | setup | fewer than two agents requested |
//! | `UnknownAgent`, `InvalidPair`, `TickOutOfOrder` | one tick | host passed bad arguments |
//! | `TickFailed` | one tick | every turn of the conversation failed at the backend |
//! | `Backend` | one call | a single backend request failed |
//! | `Io`, `Json`, `Toml` | the operation | persistence or config parsing |
//!
//! Extraction failures are deliberately absent: they are resolved inside the
//! tick by the perturbation fallback and only show up in the run's failure log.

use thiserror::Error;

use crate::agent::AgentId;
use crate::backend::BackendError;

/// Parley errors.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Setup was asked for fewer than two agents.
    #[error("Need at least 2 agents, got {0}")]
    InvalidAgentCount(usize),

    /// Agent id is not part of the current session.
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// Both participants of a conversation are the same agent.
    #[error("Agent {0} cannot converse with itself")]
    InvalidPair(AgentId),

    /// Tick is not strictly after the agent's most recent tick.
    #[error("Tick {tick} for agent {agent} is not after its last tick {last}")]
    TickOutOfOrder {
        /// Offending agent.
        agent: AgentId,
        /// Tick that was requested.
        tick: u64,
        /// Most recent tick already recorded for the agent.
        last: u64,
    },

    /// Every turn of a conversation failed at the backend.
    ///
    /// No memory, transcript, or opinion state was touched for this tick.
    #[error("Tick {tick} failed: all {attempts} backend calls failed")]
    TickFailed {
        /// Tick that failed.
        tick: u64,
        /// Number of backend calls attempted.
        attempts: usize,
        /// Error from the last attempt.
        #[source]
        source: BackendError,
    },

    /// A single backend request failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;

impl ParleyError {
    /// Whether the error aborts the whole simulation rather than one tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParleyError::Config(_) | ParleyError::InvalidAgentCount(_) | ParleyError::Io(_)
        )
    }
}
