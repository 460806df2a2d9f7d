//! Parley CLI binary.
//!
//! A minimal host around the simulation library.
//!
//! # Commands
//!
//! - `simulate` - Set up a run and drive it for a number of ticks
//! - `extract` - Run the score extractor on text
//! - `stats` - Summarise extraction failures of a finished run

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use parley::{
    backend::BackendKind,
    extract::OpinionExtractor,
    run::RunSummary,
    AgentId, Config, ParleyError, Session, SetupParams, VERSION,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser)]
#[command(name = "parley")]
#[command(version = VERSION)]
#[command(about = "Parley - LLM-driven opinion dynamics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up a run and drive it for a number of ticks
    Simulate {
        /// Number of agents
        #[arg(short, long, default_value = "4")]
        agents: usize,

        /// Number of ticks (one conversation each)
        #[arg(short, long, default_value = "10")]
        ticks: u64,

        /// Discussion topic
        #[arg(long)]
        topic: String,

        /// Backend (local, remote)
        #[arg(short, long)]
        backend: Option<String>,

        /// Model identifier
        #[arg(short, long)]
        model: Option<String>,

        /// Memory entries per prompt
        #[arg(long)]
        memory_length: Option<usize>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root directory for run output
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// RNG seed for opinions, pairing and perturbations
        #[arg(long)]
        seed: Option<u64>,

        /// Skip persona generation at setup
        #[arg(long)]
        no_personas: bool,
    },

    /// Run the score extractor on text
    Extract {
        /// Text to read (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Token window for the last tier
        #[arg(short, long, default_value = "6")]
        window: usize,
    },

    /// Summarise extraction failures of a finished run
    Stats {
        /// Run directory
        run_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Simulate {
            agents,
            ticks,
            topic,
            backend,
            model,
            memory_length,
            config,
            output_dir,
            seed,
            no_personas,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(kind) = backend {
                config.backend.kind = kind
                    .parse::<BackendKind>()
                    .map_err(|e| anyhow::anyhow!("{e}. Use: local, remote"))?;
            }
            if model.is_some() {
                config.backend.model = model;
            }
            if let Some(dir) = output_dir {
                config.simulation.output_dir = dir;
            }
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            if no_personas {
                config.simulation.generate_personas = false;
            }
            let mut params = SetupParams::new(agents, topic);
            params.memory_length = memory_length;
            cmd_simulate(params, config, ticks)
        },

        Commands::Extract {
            input,
            file,
            window,
        } => cmd_extract(input, file, window),

        Commands::Stats { run_dir, json } => cmd_stats(&run_dir, json),
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cmd_simulate(params: SetupParams, config: Config, ticks: u64) -> anyhow::Result<()> {
    let mut rng = match config.simulation.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };
    let agent_count = params.agent_count;
    let mut session = Session::setup(params, config)?;

    println!("Run: {}", session.run().dir().display());
    for (i, opinion) in session.opinions().iter().enumerate() {
        println!("  agent {i:>3}: {:>6.2}", opinion.value());
    }

    let mut failed = 0;
    for tick in 1..=ticks {
        let pair = rand::seq::index::sample(&mut rng, agent_count, 2);
        let (a, b) = (AgentId(pair.index(0)), AgentId(pair.index(1)));

        match session.run_conversation(a, b, tick, None) {
            Ok(outcome) => println!(
                "[{tick:>4}] {a} <-> {b}  {} / {}  {}",
                outcome.opinion_a, outcome.opinion_b, outcome.snippet
            ),
            Err(e) if !e.is_fatal() => {
                failed += 1;
                tracing::error!(tick, "Tick failed: {e}");
            },
            Err(e) => return Err(e.into()),
        }
    }

    let summary = RunSummary::load(session.run().dir())?;
    println!();
    println!("Ticks:               {ticks} ({failed} failed)");
    println!(
        "Extraction failures: {}/{} ({:.1}%)",
        summary.failures,
        summary.extraction_attempts,
        summary.failure_rate() * 100.0
    );
    println!("Final opinions:");
    for (i, opinion) in session.opinions().iter().enumerate() {
        println!("  agent {i:>3}: {:>6.2}", opinion.value());
    }
    Ok(())
}

fn cmd_extract(input: Option<String>, file: Option<PathBuf>, window: usize) -> anyhow::Result<()> {
    let text = read_input(input, file)?;
    let extractor = OpinionExtractor::new().with_window(window);

    for (label, segment) in labelled_segments(&text) {
        let name = label.unwrap_or_else(|| "text".to_string());
        match extractor.extract(&segment) {
            Ok(found) => println!(
                "{name}: {:.3} via {}{}",
                found.opinion.value(),
                found.tier,
                clamp_note(found.raw_value)
            ),
            Err(e) => println!("{name}: {e}"),
        }
    }
    Ok(())
}

fn clamp_note(raw: f64) -> String {
    if (-1.0..=1.0).contains(&raw) {
        String::new()
    } else {
        format!(" (clamped from {raw})")
    }
}

/// Group `X: ...` speaker lines by label; unlabelled text is one segment.
fn labelled_segments(text: &str) -> Vec<(Option<String>, String)> {
    let mut segments: Vec<(Option<String>, String)> = Vec::new();
    let mut current: Option<usize> = None;

    for line in text.lines() {
        let label = line
            .split_once(": ")
            .filter(|(l, _)| l.len() == 1 && l.chars().all(|c| c.is_ascii_uppercase()));
        match label {
            Some((l, rest)) => {
                let idx = match segments.iter().position(|(k, _)| k.as_deref() == Some(l)) {
                    Some(idx) => idx,
                    None => {
                        segments.push((Some(l.to_string()), String::new()));
                        segments.len() - 1
                    },
                };
                let seg = &mut segments[idx].1;
                if !seg.is_empty() {
                    seg.push('\n');
                }
                seg.push_str(rest);
                current = Some(idx);
            },
            None => match current {
                Some(idx) => {
                    segments[idx].1.push('\n');
                    segments[idx].1.push_str(line);
                },
                None => {
                    if segments.is_empty() {
                        segments.push((None, String::new()));
                    }
                    let seg = &mut segments[0].1;
                    if !seg.is_empty() {
                        seg.push('\n');
                    }
                    seg.push_str(line);
                },
            },
        }
    }
    if segments.is_empty() {
        segments.push((None, String::new()));
    }
    segments
}

fn cmd_stats(run_dir: &Path, json: bool) -> anyhow::Result<()> {
    let summary = RunSummary::load(run_dir).map_err(|e| match e {
        ParleyError::Io(io) => anyhow::anyhow!("{}: {io}", run_dir.display()),
        other => other.into(),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Run:                 {}", run_dir.display());
    println!("Conversations:       {}", summary.conversations);
    if let Some(tick) = summary.last_tick {
        println!("Last tick:           {tick}");
    }
    println!(
        "Extraction failures: {}/{} ({:.1}%)",
        summary.failures,
        summary.extraction_attempts,
        summary.failure_rate() * 100.0
    );
    println!();
    println!("{:>6}  {:>8}  {:>8}  {:>6}", "agent", "attempts", "failures", "rate");
    for (agent, stats) in &summary.per_agent {
        println!(
            "{:>6}  {:>8}  {:>8}  {:>5.1}%",
            agent.0,
            stats.attempts,
            stats.failures,
            stats.failure_rate() * 100.0
        );
    }
    Ok(())
}

fn read_input(input: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(path) = file {
        Ok(std::fs::read_to_string(path)?)
    } else if let Some(s) = input {
        if s == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        } else {
            Ok(s)
        }
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}
