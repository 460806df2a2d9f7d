//! Run directories.
//!
//! Every setup creates a fresh directory under the configured output root:
//!
//! ```text
//! runs/run-20260314-091502-3fa2c1d0/
//! ├── run.json              config snapshot
//! ├── transcript.txt        one record per completed conversation
//! ├── parse_failures.jsonl  one line per fallback perturbation
//! └── agent_memories/
//!     ├── agent_0.txt
//!     └── ...
//! ```
//!
//! Files are append-only and written by a single session; nothing here
//! interprets what it writes. [`RunSummary`] reads a finished run back for
//! offline failure-rate analysis.

mod summary;

pub use summary::{AgentFailureStats, RunSummary};

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentId;
use crate::backend::BackendKind;
use crate::conversation::Conversation;
use crate::error::{ParleyError, Result};
use crate::memory::{write_entry, MemoryEntry, MemoryStore};

/// Transcript file name inside a run directory.
pub const TRANSCRIPT_FILE: &str = "transcript.txt";

/// Parse-failure log file name inside a run directory.
pub const FAILURE_LOG_FILE: &str = "parse_failures.jsonl";

/// Config snapshot file name inside a run directory.
pub const SNAPSHOT_FILE: &str = "run.json";

/// Memory subdirectory name inside a run directory.
pub const MEMORY_DIR: &str = "agent_memories";

/// Attempts at finding an unused directory name before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

/// Settings recorded when a run is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Number of agents
    pub agent_count: usize,
    /// Discussion topic
    pub topic: String,
    /// Backend kind
    pub backend: BackendKind,
    /// Model identifier
    pub model: String,
    /// Memory entries per prompt
    pub memory_length: usize,
    /// Devil's-advocate closeness threshold
    pub closeness_threshold: f64,
    /// Fallback perturbation bound
    pub perturbation_bound: f64,
}

/// Contents of `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Directory name of the run
    pub run_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Settings at creation
    #[serde(flatten)]
    pub settings: RunSettings,
}

/// One line of the parse-failure log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Tick of the failed extraction
    pub tick: u64,
    /// Agent whose score could not be read
    pub agent: AgentId,
    /// Opinion before the tick
    pub prior: f64,
    /// Perturbed opinion that replaced it
    pub fallback: f64,
    /// Text that failed to match
    pub raw: String,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

/// An isolated output directory owned by one session.
#[derive(Debug)]
pub struct Run {
    dir: PathBuf,
    snapshot: RunSnapshot,
    memory: MemoryStore,
}

impl Run {
    /// Create a new, uniquely named run directory under `root`.
    pub fn create(root: impl AsRef<Path>, settings: RunSettings) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;

        let created_at = Utc::now();
        let (run_id, dir) = Self::claim_dir(root, &created_at)?;

        let memory = MemoryStore::create(dir.join(MEMORY_DIR))?;
        fs::File::create(dir.join(TRANSCRIPT_FILE))?;
        fs::File::create(dir.join(FAILURE_LOG_FILE))?;

        let snapshot = RunSnapshot {
            run_id,
            created_at,
            settings,
        };
        fs::write(
            dir.join(SNAPSHOT_FILE),
            serde_json::to_string_pretty(&snapshot)?,
        )?;

        tracing::info!(run = %snapshot.run_id, dir = %dir.display(), "Created run");
        Ok(Self {
            dir,
            snapshot,
            memory,
        })
    }

    /// `create_dir` fails on an existing path, so a claimed name is never shared.
    fn claim_dir(root: &Path, created_at: &DateTime<Utc>) -> Result<(String, PathBuf)> {
        let stamp = created_at.format("%Y%m%d-%H%M%S");
        for _ in 0..MAX_NAME_ATTEMPTS {
            let suffix = Uuid::new_v4().simple().to_string();
            let run_id = format!("run-{stamp}-{}", &suffix[..8]);
            let dir = root.join(&run_id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((run_id, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ParleyError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free run directory name under {}", root.display()),
        )))
    }

    /// Run identifier (directory name).
    pub fn id(&self) -> &str {
        &self.snapshot.run_id
    }

    /// Run directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot written at creation.
    pub fn snapshot(&self) -> &RunSnapshot {
        &self.snapshot
    }

    /// Path of the transcript file.
    pub fn transcript_path(&self) -> PathBuf {
        self.dir.join(TRANSCRIPT_FILE)
    }

    /// Path of the parse-failure log.
    pub fn failure_log_path(&self) -> PathBuf {
        self.dir.join(FAILURE_LOG_FILE)
    }

    /// Memory store of this run.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Mutable memory store of this run.
    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    /// Write everything one completed tick produces: both memory entries,
    /// the transcript block, and any parse-failure lines.
    ///
    /// Every target file is opened and every line rendered before the first
    /// byte is written. A failure up to that point leaves the run as it was,
    /// and the tick can be retried.
    pub fn record_tick(&mut self, record: &TickRecord<'_>) -> Result<()> {
        let tick = record.conversation.tick();
        let (a, b) = record.conversation.participants();
        self.memory.check_tick(a, tick)?;
        self.memory.check_tick(b, tick)?;

        let transcript = transcript_block(record.conversation, record.opinion_a, record.opinion_b);
        let mut failures = String::new();
        for failure in &record.failures {
            failures.push_str(&serde_json::to_string(failure)?);
            failures.push('\n');
        }

        let mut memory_a = self.memory.open_for_append(a)?;
        let mut memory_b = self.memory.open_for_append(b)?;
        let mut transcript_file = open_append(&self.transcript_path())?;
        let mut failure_file = if failures.is_empty() {
            None
        } else {
            Some(open_append(&self.failure_log_path())?)
        };

        write_entry(&mut memory_a, &record.entry_a)?;
        write_entry(&mut memory_b, &record.entry_b)?;
        self.memory.mark_tick(a, tick);
        self.memory.mark_tick(b, tick);
        transcript_file.write_all(transcript.as_bytes())?;
        if let Some(file) = failure_file.as_mut() {
            file.write_all(failures.as_bytes())?;
        }
        Ok(())
    }
}

/// Writes of one completed tick, staged for [`Run::record_tick`].
#[derive(Debug, Clone)]
pub struct TickRecord<'a> {
    /// The conversation, raw turns included
    pub conversation: &'a Conversation,
    /// Entry appended to the opener's memory
    pub entry_a: MemoryEntry,
    /// Entry appended to the responder's memory
    pub entry_b: MemoryEntry,
    /// Opener's opinion after the tick
    pub opinion_a: f64,
    /// Responder's opinion after the tick
    pub opinion_b: f64,
    /// Fallbacks taken this tick, opener first
    pub failures: Vec<FailureRecord>,
}

fn transcript_block(conversation: &Conversation, opinion_a: f64, opinion_b: f64) -> String {
    let (a, b) = conversation.participants();
    let mut block = format!(
        "=== Tick {} | Agent {a} <-> Agent {b} ===\n",
        conversation.tick()
    );
    for turn in conversation.turns() {
        block.push_str(&format!("{}: {}\n", turn.role.label(), turn.text.trim_end()));
    }
    block.push_str(&format!(
        "Opinions after: A({a})={opinion_a:.3}, B({b})={opinion_b:.3}\n\n"
    ));
    block
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, Turn};

    pub(super) fn settings() -> RunSettings {
        RunSettings {
            agent_count: 4,
            topic: "universal basic income".to_string(),
            backend: BackendKind::Local,
            model: "phi3:mini".to_string(),
            memory_length: 5,
            closeness_threshold: 0.3,
            perturbation_bound: 0.1,
        }
    }

    #[test]
    fn test_create_lays_out_empty_files() {
        let root = tempfile::tempdir().unwrap();
        let run = Run::create(root.path(), settings()).unwrap();

        assert!(run.id().starts_with("run-"));
        assert_eq!(fs::read_to_string(run.transcript_path()).unwrap(), "");
        assert_eq!(fs::read_to_string(run.failure_log_path()).unwrap(), "");
        assert!(run.dir().join(MEMORY_DIR).is_dir());

        let snapshot: RunSnapshot =
            serde_json::from_str(&fs::read_to_string(run.dir().join(SNAPSHOT_FILE)).unwrap())
                .unwrap();
        assert_eq!(&snapshot, run.snapshot());
        assert_eq!(snapshot.settings.agent_count, 4);
    }

    #[test]
    fn test_runs_never_share_a_directory() {
        let root = tempfile::tempdir().unwrap();
        let first = Run::create(root.path(), settings()).unwrap();
        let second = Run::create(root.path(), settings()).unwrap();
        assert_ne!(first.dir(), second.dir());
    }

    fn conversation(tick: u64, a: usize, b: usize) -> Conversation {
        Conversation::new(
            tick,
            AgentId(a),
            AgentId(b),
            vec![
                Turn::new(Role::A, "Opening."),
                Turn::new(Role::B, "Reply.\nOPINION: 0.2"),
                Turn::new(Role::A, "Closing.\nOPINION: -0.1"),
            ],
        )
    }

    pub(super) fn tick_record(
        conversation: &Conversation,
        failures: Vec<FailureRecord>,
    ) -> TickRecord<'_> {
        let (a, b) = conversation.participants();
        let tick = conversation.tick();
        TickRecord {
            conversation,
            entry_a: MemoryEntry::conversation(tick, b, "A: x", -0.1, None),
            entry_b: MemoryEntry::conversation(tick, a, "A: x", 0.2, None),
            opinion_a: -0.1,
            opinion_b: 0.2,
            failures,
        }
    }

    pub(super) fn failure(tick: u64, agent: usize) -> FailureRecord {
        FailureRecord {
            tick,
            agent: AgentId(agent),
            prior: 0.5,
            fallback: 0.55,
            raw: "no number\nat all".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_transcript_record_format() {
        let root = tempfile::tempdir().unwrap();
        let mut run = Run::create(root.path(), settings()).unwrap();
        let conversation = conversation(9, 1, 3);
        run.record_tick(&tick_record(&conversation, vec![])).unwrap();

        let text = fs::read_to_string(run.transcript_path()).unwrap();
        assert_eq!(
            text,
            "=== Tick 9 | Agent 1 <-> Agent 3 ===\n\
             A: Opening.\n\
             B: Reply.\nOPINION: 0.2\n\
             A: Closing.\nOPINION: -0.1\n\
             Opinions after: A(1)=-0.100, B(3)=0.200\n\n"
        );
        assert_eq!(run.memory().len(AgentId(1)).unwrap(), 1);
        assert_eq!(run.memory().last_tick(AgentId(3)), Some(9));
        assert_eq!(fs::read_to_string(run.failure_log_path()).unwrap(), "");
    }

    #[test]
    fn test_failure_log_is_one_json_line_per_record() {
        let root = tempfile::tempdir().unwrap();
        let mut run = Run::create(root.path(), settings()).unwrap();
        let conversation = conversation(2, 0, 1);
        run.record_tick(&tick_record(&conversation, vec![failure(2, 0), failure(2, 1)]))
            .unwrap();

        let text = fs::read_to_string(run.failure_log_path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: FailureRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.agent, AgentId(1));
        assert_eq!(parsed.raw, "no number\nat all");
    }

    #[test]
    fn test_unopenable_file_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let mut run = Run::create(root.path(), settings()).unwrap();
        let conversation = conversation(4, 0, 1);

        // A directory where the failure log should be cannot be opened.
        fs::remove_file(run.failure_log_path()).unwrap();
        fs::create_dir(run.failure_log_path()).unwrap();
        let record = tick_record(&conversation, vec![failure(4, 1)]);
        assert!(matches!(run.record_tick(&record), Err(ParleyError::Io(_))));

        assert_eq!(run.memory().len(AgentId(0)).unwrap(), 0);
        assert_eq!(run.memory().len(AgentId(1)).unwrap(), 0);
        assert_eq!(run.memory().last_tick(AgentId(0)), None);
        assert_eq!(fs::read_to_string(run.transcript_path()).unwrap(), "");

        fs::remove_dir(run.failure_log_path()).unwrap();
        run.record_tick(&record).unwrap();
        assert_eq!(run.memory().len(AgentId(0)).unwrap(), 1);
        assert_eq!(fs::read_to_string(run.failure_log_path()).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_record_tick_rejects_replayed_tick() {
        let root = tempfile::tempdir().unwrap();
        let mut run = Run::create(root.path(), settings()).unwrap();
        let conversation = conversation(5, 0, 1);
        run.record_tick(&tick_record(&conversation, vec![])).unwrap();
        let err = run.record_tick(&tick_record(&conversation, vec![])).unwrap_err();
        assert!(matches!(err, ParleyError::TickOutOfOrder { tick: 5, last: 5, .. }));
        assert_eq!(run.memory().len(AgentId(0)).unwrap(), 1);
    }
}
