//! Simulation session: the two operations a host calls.
//!
//! A [`Session`] is created by [`Session::setup`] and owns everything a run
//! needs across ticks: the backend, the run directory, the agents' opinions
//! and the RNG. Each [`Session::run_conversation`] call is one tick:
//!
//! ```text
//! validate ─► read memory ─► generate 3 turns ─► extract scores
//!                                                     │ failure
//!                                                     ▼
//!                                               perturb + log
//!        ◄── update opinions ◄── transcript ◄── append memory
//! ```
//!
//! A tick either completes or leaves no trace: everything that can fail at the
//! backend happens before the first write.

use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::agent::{Agent, AgentId, Opinion};
use crate::backend::{self, Backend};
use crate::config::Config;
use crate::conversation::{Conversation, ConversationGenerator, Exchange, Participant, Role};
use crate::error::{ParleyError, Result};
use crate::extract::{Extracted, ExtractionFailure, OpinionExtractor, Tier};
use crate::memory::MemoryEntry;
use crate::perturb::Perturbation;
use crate::run::{FailureRecord, Run, RunSettings, TickRecord};

/// Host-supplied setup arguments.
#[derive(Debug, Clone)]
pub struct SetupParams {
    /// Number of agents, at least 2
    pub agent_count: usize,
    /// Discussion topic
    pub topic: String,
    /// Memory entries per prompt; `None` uses the configured value
    pub memory_length: Option<usize>,
}

impl SetupParams {
    /// Params with the configured memory length.
    pub fn new(agent_count: usize, topic: impl Into<String>) -> Self {
        Self {
            agent_count,
            topic: topic.into(),
            memory_length: None,
        }
    }

    /// Override the memory length.
    pub fn with_memory_length(mut self, memory_length: usize) -> Self {
        self.memory_length = Some(memory_length);
        self
    }
}

/// How an agent's post-tick opinion was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Read from the agent's own turns
    Extracted(Tier),
    /// No score found; prior opinion perturbed
    Perturbed,
}

/// Result of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOutcome {
    /// Tick index
    pub tick: u64,
    /// Opener's opinion after the tick
    pub opinion_a: Opinion,
    /// Responder's opinion after the tick
    pub opinion_b: Opinion,
    /// Short excerpt of the opening turn
    pub snippet: String,
    /// How `opinion_a` was obtained
    pub resolution_a: Resolution,
    /// How `opinion_b` was obtained
    pub resolution_b: Resolution,
    /// Turns replaced by canned text
    pub substituted_turns: usize,
}

/// One simulation, from setup until dropped.
pub struct Session {
    config: Config,
    backend: Box<dyn Backend>,
    generator: ConversationGenerator,
    extractor: OpinionExtractor,
    perturbation: Perturbation,
    rng: StdRng,
    topic: String,
    memory_length: usize,
    agents: Vec<Agent>,
    run: Run,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("run", &self.run.id())
            .field("backend", &self.backend.name())
            .field("topic", &self.topic)
            .field("agents", &self.agents.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate the configuration, connect the configured backend, and set up a
    /// new run.
    pub fn setup(params: SetupParams, config: Config) -> Result<Self> {
        if params.agent_count < 2 {
            return Err(ParleyError::InvalidAgentCount(params.agent_count));
        }
        config.validate()?;
        let backend = backend::connect(&config.backend)?;
        Self::with_backend(params, config, backend)
    }

    /// Set up a new run against an already constructed backend.
    ///
    /// Creates the run directory, draws a uniform initial opinion per agent,
    /// optionally generates a rationale for each, and writes every agent's
    /// setup memory entry.
    pub fn with_backend(
        params: SetupParams,
        config: Config,
        backend: Box<dyn Backend>,
    ) -> Result<Self> {
        if params.agent_count < 2 {
            return Err(ParleyError::InvalidAgentCount(params.agent_count));
        }
        config.validate()?;

        let memory_length = params
            .memory_length
            .unwrap_or(config.simulation.memory_length);
        let mut rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let settings = RunSettings {
            agent_count: params.agent_count,
            topic: params.topic.clone(),
            backend: config.backend.kind,
            model: config.backend.model().to_string(),
            memory_length,
            closeness_threshold: config.conversation.closeness_threshold,
            perturbation_bound: config.simulation.perturbation_bound,
        };
        let mut run = Run::create(&config.simulation.output_dir, settings)?;

        let generator = ConversationGenerator::new(
            config.conversation.clone(),
            Duration::from_secs(config.backend.timeout_secs),
        );

        let mut agents = Vec::with_capacity(params.agent_count);
        for i in 0..params.agent_count {
            let id = AgentId(i);
            let opinion = Opinion::new(rng.gen_range(Opinion::MIN..=Opinion::MAX));
            let mut agent = Agent::new(id, opinion);
            if config.simulation.generate_personas {
                agent.persona = Some(generator.generate_persona(
                    backend.as_ref(),
                    config.backend.model(),
                    &params.topic,
                    opinion,
                ));
            }

            let memory = run.memory_mut();
            memory.init_agent(id)?;
            memory.append(
                id,
                &MemoryEntry::initial(
                    opinion.stance(&params.topic),
                    opinion.value(),
                    agent.persona.clone(),
                ),
            )?;
            tracing::debug!(agent = %id, opinion = %opinion, "Initialised agent");
            agents.push(agent);
        }

        tracing::info!(
            run = run.id(),
            agents = agents.len(),
            topic = %params.topic,
            backend = backend.name(),
            "Setup complete"
        );

        Ok(Self {
            perturbation: Perturbation::new(config.simulation.perturbation_bound),
            extractor: OpinionExtractor::new(),
            config,
            backend,
            generator,
            rng,
            topic: params.topic,
            memory_length,
            agents,
            run,
        })
    }

    /// Current opinions in agent order.
    pub fn opinions(&self) -> Vec<Opinion> {
        self.agents.iter().map(|a| a.opinion).collect()
    }

    /// All agents in id order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// The run this session writes to.
    pub fn run(&self) -> &Run {
        &self.run
    }

    /// Discussion topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn agent(&self, id: AgentId) -> Result<&Agent> {
        self.agents.get(id.0).ok_or(ParleyError::UnknownAgent(id))
    }

    /// Run one conversation between `a` (opener) and `b` at `tick`.
    ///
    /// `memory_length` overrides the session's memory length for this tick.
    /// Extraction failures are absorbed by the perturbation fallback; only a
    /// tick in which every backend call failed returns an error, and in that
    /// case nothing is written.
    pub fn run_conversation(
        &mut self,
        a: AgentId,
        b: AgentId,
        tick: u64,
        memory_length: Option<usize>,
    ) -> Result<ConversationOutcome> {
        if a == b {
            return Err(ParleyError::InvalidPair(a));
        }
        let (agent_a, agent_b) = (self.agent(a)?.clone(), self.agent(b)?.clone());
        self.run.memory().check_tick(a, tick)?;
        self.run.memory().check_tick(b, tick)?;

        let k = memory_length.unwrap_or(self.memory_length);
        let memory_a = self.run.memory().recent(a, k)?;
        let memory_b = self.run.memory().recent(b, k)?;

        let exchange = Exchange {
            tick,
            topic: &self.topic,
            model: self.config.backend.model(),
            a: Participant {
                id: a,
                opinion: agent_a.opinion,
                persona: agent_a.persona.as_deref(),
                memory: &memory_a,
            },
            b: Participant {
                id: b,
                opinion: agent_b.opinion,
                persona: agent_b.persona.as_deref(),
                memory: &memory_b,
            },
        };
        let conversation = self.generator.generate(self.backend.as_ref(), &exchange)?;

        let scores = self.extractor.extract_conversation(&conversation);
        let (opinion_a, resolution_a, failure_a) =
            self.resolve(&conversation, Role::A, &agent_a, scores.a);
        let (opinion_b, resolution_b, failure_b) =
            self.resolve(&conversation, Role::B, &agent_b, scores.b);

        let excerpt = conversation.display_text();
        self.run.record_tick(&TickRecord {
            conversation: &conversation,
            entry_a: MemoryEntry::conversation(
                tick,
                b,
                &excerpt,
                opinion_a.value(),
                agent_a.persona.clone(),
            ),
            entry_b: MemoryEntry::conversation(
                tick,
                a,
                &excerpt,
                opinion_b.value(),
                agent_b.persona.clone(),
            ),
            opinion_a: opinion_a.value(),
            opinion_b: opinion_b.value(),
            failures: failure_a.into_iter().chain(failure_b).collect(),
        })?;

        for (id, opinion) in [(a, opinion_a), (b, opinion_b)] {
            let agent = &mut self.agents[id.0];
            agent.opinion = opinion;
            agent.last_tick = Some(tick);
        }

        tracing::info!(
            tick,
            a = %a,
            b = %b,
            before_a = %agent_a.opinion,
            after_a = %opinion_a,
            before_b = %agent_b.opinion,
            after_b = %opinion_b,
            "Conversation complete"
        );

        Ok(ConversationOutcome {
            tick,
            opinion_a,
            opinion_b,
            snippet: conversation.snippet(self.config.conversation.snippet_chars),
            resolution_a,
            resolution_b,
            substituted_turns: conversation.substituted_turns(),
        })
    }

    /// Opinion for one side, plus the failure record to log when the
    /// fallback was taken. Draws from the session RNG but writes nothing.
    fn resolve(
        &mut self,
        conversation: &Conversation,
        role: Role,
        agent: &Agent,
        score: std::result::Result<Extracted, ExtractionFailure>,
    ) -> (Opinion, Resolution, Option<FailureRecord>) {
        match score {
            Ok(extracted) => {
                tracing::debug!(
                    agent = %agent.id,
                    tier = %extracted.tier,
                    raw = extracted.raw_value,
                    "Extracted opinion"
                );
                (extracted.opinion, Resolution::Extracted(extracted.tier), None)
            },
            Err(failure) => {
                let fallback = self.perturbation.apply(agent.opinion, &mut self.rng);
                tracing::warn!(
                    tick = conversation.tick(),
                    agent = %agent.id,
                    prior = %agent.opinion,
                    fallback = %fallback,
                    "{failure}, using perturbed prior"
                );
                let record = FailureRecord {
                    tick: conversation.tick(),
                    agent: agent.id,
                    prior: agent.opinion.value(),
                    fallback: fallback.value(),
                    raw: conversation.segment(role),
                    timestamp: Utc::now(),
                };
                (fallback, Resolution::Perturbed, Some(record))
            },
        }
    }
}
