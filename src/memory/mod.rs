//! Per-agent conversational memory.
//!
//! Each agent owns one append-only text file, `agent_<id>.txt`. Entries are
//! separated by a line containing only `---`:
//!
//! ```text
//! Stance: Somewhat in favor of the position on remote work (opinion score: 0.41)
//! Rationale: Commuting two hours a day wrecked my sleep.
//! ---
//! [Tick 3] Talked with agent 7:
//! A: Remote work keeps teams productive.
//! B: It erodes mentoring.
//! A: Mentoring can move online.
//! Stance: Opinion score 0.38
//! Rationale: Commuting two hours a day wrecked my sleep.
//! ---
//! ```
//!
//! The first entry is written at setup and carries no tick. Every later entry
//! records the conversation tick it came from; ticks are strictly increasing
//! per agent. Nothing is rewritten or removed once appended.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::agent::AgentId;
use crate::error::{ParleyError, Result};

/// Separator written after every entry.
pub const ENTRY_DELIMITER: &str = "\n---\n";

lazy_static! {
    static ref TICK_HEADER: Regex =
        Regex::new(r"^\[Tick (\d+)\]\s?(.*)$").expect("tick header pattern is valid");
    static ref SCORE: Regex =
        Regex::new(r"(?i)opinion score:?\s*([-+]?\d*\.?\d+)").expect("score pattern is valid");
    static ref SETUP_SUFFIX: Regex =
        Regex::new(r"\s*\(opinion score:[^)]*\)\s*$").expect("setup suffix pattern is valid");
}

/// One immutable memory record.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    /// Conversation tick; `None` for the setup entry
    pub tick: Option<u64>,
    /// Stance wording (setup) or conversation excerpt (ticks)
    pub summary: String,
    /// Opinion recorded at this point
    pub opinion: f64,
    /// Rationale carried alongside the stance
    pub rationale: Option<String>,
}

impl MemoryEntry {
    /// Setup entry holding the initial stance.
    pub fn initial(stance: impl Into<String>, opinion: f64, rationale: Option<String>) -> Self {
        Self {
            tick: None,
            summary: stance.into(),
            opinion,
            rationale,
        }
    }

    /// Entry for a conversation with `partner` at `tick`.
    pub fn conversation(
        tick: u64,
        partner: AgentId,
        excerpt: &str,
        opinion: f64,
        rationale: Option<String>,
    ) -> Self {
        Self {
            tick: Some(tick),
            summary: format!("Talked with agent {partner}:\n{}", excerpt.trim_end()),
            opinion,
            rationale,
        }
    }

    /// Text form written to the memory file (without delimiter).
    pub fn render(&self) -> String {
        let summary = sanitize(&self.summary);
        let mut out = match self.tick {
            None => format!("Stance: {} (opinion score: {:.2})", summary, self.opinion),
            Some(tick) => format!(
                "[Tick {tick}] {summary}\nStance: Opinion score {:.2}",
                self.opinion
            ),
        };
        if let Some(rationale) = &self.rationale {
            out.push_str("\nRationale: ");
            out.push_str(&rationale.replace('\n', " "));
        }
        out
    }

    /// Parse one rendered entry. Returns `None` when no stance line is found.
    pub fn parse(block: &str) -> Option<Self> {
        let lines: Vec<&str> = block.trim().lines().collect();
        let stance_idx = lines.iter().rposition(|l| l.starts_with("Stance:"))?;
        let stance_line = lines[stance_idx];
        let opinion = SCORE
            .captures_iter(stance_line)
            .last()
            .and_then(|c| c[1].parse::<f64>().ok())?;
        let rationale = lines[stance_idx + 1..]
            .iter()
            .find_map(|l| l.strip_prefix("Rationale:"))
            .map(|r| r.trim().to_string());

        let header = TICK_HEADER.captures(lines.first()?);
        match header {
            Some(caps) => {
                let tick = caps[1].parse::<u64>().ok()?;
                let mut summary = caps[2].to_string();
                for line in &lines[1..stance_idx] {
                    summary.push('\n');
                    summary.push_str(line);
                }
                Some(Self {
                    tick: Some(tick),
                    summary,
                    opinion,
                    rationale,
                })
            },
            None => {
                let stance = stance_line.trim_start_matches("Stance:").trim();
                Some(Self {
                    tick: None,
                    summary: SETUP_SUFFIX.replace(stance, "").into_owned(),
                    opinion,
                    rationale,
                })
            },
        }
    }
}

/// A bare `---` line inside generated text would split the entry on read.
fn sanitize(text: &str) -> String {
    text.lines()
        .map(|l| if l.trim() == "---" { "- - -" } else { l })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn write_entry(file: &mut File, entry: &MemoryEntry) -> Result<()> {
    file.write_all(entry.render().trim_end().as_bytes())?;
    file.write_all(ENTRY_DELIMITER.as_bytes())?;
    Ok(())
}

/// File-backed memory for all agents of one run.
#[derive(Debug)]
pub struct MemoryStore {
    dir: PathBuf,
    last_ticks: HashMap<AgentId, u64>,
}

impl MemoryStore {
    /// Create the memory directory.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            last_ticks: HashMap::new(),
        })
    }

    /// Directory holding the agent files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an agent's memory file.
    pub fn path_for(&self, agent: AgentId) -> PathBuf {
        self.dir.join(format!("agent_{agent}.txt"))
    }

    /// Create an empty memory file for `agent`.
    pub fn init_agent(&mut self, agent: AgentId) -> Result<()> {
        fs::File::create(self.path_for(agent))?;
        self.last_ticks.remove(&agent);
        Ok(())
    }

    /// Most recent conversation tick recorded for `agent` by this store.
    pub fn last_tick(&self, agent: AgentId) -> Option<u64> {
        self.last_ticks.get(&agent).copied()
    }

    /// Fail unless `tick` is strictly after the agent's last recorded tick.
    pub fn check_tick(&self, agent: AgentId, tick: u64) -> Result<()> {
        match self.last_tick(agent) {
            Some(last) if tick <= last => Err(ParleyError::TickOutOfOrder { agent, tick, last }),
            _ => Ok(()),
        }
    }

    /// Append one entry to the end of the agent's history.
    pub fn append(&mut self, agent: AgentId, entry: &MemoryEntry) -> Result<()> {
        if let Some(tick) = entry.tick {
            self.check_tick(agent, tick)?;
        }
        let mut file = self.open_for_append(agent)?;
        write_entry(&mut file, entry)?;
        if let Some(tick) = entry.tick {
            self.last_ticks.insert(agent, tick);
        }
        Ok(())
    }

    /// Open the agent's file for appending without writing anything.
    pub(crate) fn open_for_append(&self, agent: AgentId) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(agent))?)
    }

    /// Record `tick` as written for `agent` after a staged write.
    pub(crate) fn mark_tick(&mut self, agent: AgentId, tick: u64) {
        self.last_ticks.insert(agent, tick);
    }

    /// Every entry for `agent`, oldest first. Empty if the agent has none.
    pub fn entries(&self, agent: AgentId) -> Result<Vec<MemoryEntry>> {
        let path = self.path_for(agent);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for block in text.split(ENTRY_DELIMITER).filter(|b| !b.trim().is_empty()) {
            match MemoryEntry::parse(block) {
                Some(entry) => entries.push(entry),
                None => tracing::warn!(agent = %agent, "Skipping unreadable memory entry"),
            }
        }
        Ok(entries)
    }

    /// The last `k` entries for `agent`, oldest first.
    pub fn recent(&self, agent: AgentId, k: usize) -> Result<Vec<MemoryEntry>> {
        let mut entries = self.entries(agent)?;
        let skip = entries.len().saturating_sub(k);
        Ok(entries.split_off(skip))
    }

    /// Number of entries recorded for `agent`.
    pub fn len(&self, agent: AgentId) -> Result<usize> {
        Ok(self.entries(agent)?.len())
    }

    /// Whether `agent` has no entries.
    pub fn is_empty(&self, agent: AgentId) -> Result<bool> {
        Ok(self.len(agent)? == 0)
    }
}

/// Join entries the way they appear in prompts.
pub fn render_context(entries: &[MemoryEntry]) -> String {
    entries
        .iter()
        .map(|e| e.render())
        .collect::<Vec<_>>()
        .join(ENTRY_DELIMITER)
}
