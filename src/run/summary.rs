//! Offline failure-rate summary of a finished run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::{FailureRecord, FAILURE_LOG_FILE, TRANSCRIPT_FILE};
use crate::agent::AgentId;
use crate::error::Result;

lazy_static! {
    static ref RECORD_HEADER: Regex = Regex::new(r"^=== Tick (\d+) \| Agent (\d+) <-> Agent (\d+) ===")
        .expect("transcript header pattern is valid");
}

/// Extraction counts for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentFailureStats {
    /// Conversations the agent took part in
    pub attempts: usize,
    /// Extractions that fell back to perturbation
    pub failures: usize,
}

/// Extraction failure rates of a run, read from its transcript and failure log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Conversations recorded in the transcript
    pub conversations: usize,
    /// Extractions attempted (two per conversation)
    pub extraction_attempts: usize,
    /// Extractions that failed
    pub failures: usize,
    /// Highest tick seen
    pub last_tick: Option<u64>,
    /// Per-agent breakdown
    pub per_agent: BTreeMap<AgentId, AgentFailureStats>,
}

impl RunSummary {
    /// Read the run directory at `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut summary = Self::default();

        let transcript = fs::read_to_string(dir.join(TRANSCRIPT_FILE))?;
        for caps in transcript.lines().filter_map(|l| RECORD_HEADER.captures(l)) {
            let (Ok(tick), Ok(a), Ok(b)) = (
                caps[1].parse::<u64>(),
                caps[2].parse::<usize>(),
                caps[3].parse::<usize>(),
            ) else {
                continue;
            };
            summary.conversations += 1;
            summary.extraction_attempts += 2;
            summary.last_tick = summary.last_tick.max(Some(tick));
            summary.per_agent.entry(AgentId(a)).or_default().attempts += 1;
            summary.per_agent.entry(AgentId(b)).or_default().attempts += 1;
        }

        let log = fs::read_to_string(dir.join(FAILURE_LOG_FILE))?;
        for line in log.lines().filter(|l| !l.trim().is_empty()) {
            let record: FailureRecord = serde_json::from_str(line)?;
            summary.failures += 1;
            summary.per_agent.entry(record.agent).or_default().failures += 1;
        }

        Ok(summary)
    }

    /// Fraction of extractions that failed (0.0 for an empty run).
    pub fn failure_rate(&self) -> f64 {
        if self.extraction_attempts == 0 {
            0.0
        } else {
            self.failures as f64 / self.extraction_attempts as f64
        }
    }
}

impl AgentFailureStats {
    /// Fraction of this agent's extractions that failed.
    pub fn failure_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.failures as f64 / self.attempts as f64
        }
    }
}
