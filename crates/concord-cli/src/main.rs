//! Concord CLI - command-line interface for the consensus engine

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use concord_core::{
    ConfigSnapshot, ConsensusEngine, EngineConfig, EvaluatorProfile, MemoryStore, ScoreStore,
    TaskTypeRegistry, User, UserScores,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Parser)]
#[command(name = "concord")]
#[command(about = "Concord - authority-weighted feedback consensus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/concord.json")]
        config: PathBuf,
    },
    /// Aggregate a feedback file offline and print the result as JSON
    Aggregate {
        /// Feedback file path
        #[arg(short, long)]
        input: PathBuf,
        /// Configuration file path (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List registered task types
    TaskTypes,
    /// Show devil's-advocate assignment probability per pool size
    Advocates {
        /// Eligible pool sizes
        #[arg(short, long, num_args = 1.., default_values_t = [10usize, 30, 100])]
        eligible: Vec<usize>,
        /// Configuration file path (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration
    Defaults,
}

/// One offline aggregation job.
#[derive(Debug, Deserialize)]
struct AggregateJob {
    task_type: String,
    #[serde(default = "default_task_id")]
    task_id: String,
    #[serde(default = "empty_object")]
    input: Value,
    feedback: Vec<JobFeedback>,
}

#[derive(Debug, Deserialize)]
struct JobFeedback {
    submitter_id: String,
    authority: f64,
    payload: Value,
    #[serde(default)]
    profile: EvaluatorProfile,
}

fn default_task_id() -> String {
    "offline".to_string()
}

fn empty_object() -> Value {
    json!({})
}

fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = EngineConfig::from_json(&text)?;
    Ok(config)
}

fn load_or_default(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    path.map_or_else(|| Ok(EngineConfig::default()), load_config)
}

/// Validates and compiles a config file.
fn check_config(path: &Path) -> anyhow::Result<ConfigSnapshot> {
    let config = load_config(path)?;
    let snapshot = ConfigSnapshot::compile(config, 1)
        .with_context(|| format!("{} rejected", path.display()))?;
    Ok(snapshot)
}

/// Runs one job through a throwaway in-memory engine.
async fn aggregate(config: EngineConfig, job: AggregateJob) -> anyhow::Result<Value> {
    let engine = Arc::new(ConsensusEngine::new(
        config,
        TaskTypeRegistry::with_builtins(),
        MemoryStore::new(),
    )?);
    engine.create_task(&job.task_id, &job.task_type, &job.input)?;

    for item in job.feedback {
        if engine.store().user(&item.submitter_id).is_err() {
            engine.store().insert_user(User {
                id: item.submitter_id.clone(),
                scores: UserScores {
                    authority: item.authority,
                    baseline: 0.0,
                    track_record: 0.0,
                },
                credentials: Vec::new(),
                profile: item.profile,
            })?;
        }
        engine
            .capture_feedback(&job.task_id, &item.submitter_id, item.payload)
            .with_context(|| format!("feedback from {}", item.submitter_id))?;
    }

    let report = Arc::clone(&engine).process_task_async(job.task_id).await?;
    info!(
        revision = report.record.revision,
        excluded = report.excluded.len(),
        "offline aggregation complete"
    );
    Ok(json!({
        "result": report.record.result,
        "needs_discussion": report.record.needs_discussion,
        "bias": report.bias,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Check { config }) => {
            let snapshot = check_config(&config)?;
            let weights = snapshot.authority.weights();
            println!("Configuration OK: {}", config.display());
            println!(
                "  authority   α={} β={} γ={}",
                weights.baseline, weights.track_record, weights.recent_performance
            );
            println!("  smoothing   λ={}", snapshot.track_record.lambda());
            println!(
                "  thresholds  τ={} discussion={}",
                snapshot.config().consensus.disagreement_threshold,
                snapshot.config().consensus.discussion_threshold
            );
        }
        Some(Commands::Aggregate { input, config }) => {
            let config = load_or_default(config.as_deref())?;
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading feedback file {}", input.display()))?;
            let job: AggregateJob = serde_json::from_str(&text)
                .with_context(|| format!("parsing feedback file {}", input.display()))?;
            let output = aggregate(config, job).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Some(Commands::TaskTypes) => {
            let registry = TaskTypeRegistry::with_builtins();
            for tag in registry.tags() {
                let definition = registry.get(tag)?;
                println!("{:<18} {}", tag, definition.description);
            }
        }
        Some(Commands::Advocates { eligible, config }) => {
            let config = load_or_default(config.as_deref())?;
            config.advocate.validate()?;
            println!("{:>10}  {:>11}", "eligible", "probability");
            for n in eligible {
                let p = concord_council::assignment_probability(&config.advocate, n);
                println!("{:>10}  {:>11.4}", n, p);
            }
        }
        Some(Commands::Defaults) => {
            println!("{}", EngineConfig::default().to_json_pretty()?);
        }
        None => {
            println!("Concord v{} - Use --help for commands", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
