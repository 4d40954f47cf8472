//! narrate - turn long documents into narrated audio, one resumable batch at a time

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gen_narration::audio::Encoder;
use gen_narration::batch::plan_document;
use gen_narration::checkpoint::{CheckpointStore, job_key};
use gen_narration::config::{FormatKind, NarrationConfig, Profile};
use gen_narration::extract::{self, open_document};
use gen_narration::runner::{JobOutcome, JobPhase, JobRunner, StopHandle};
use gen_narration::synth::create_pool;
use gen_narration::text::TextSegmenter;

#[derive(Parser, Debug)]
#[command(name = "narrate")]
#[command(about = "Turn long documents into narrated audio with resumable batch TTS", long_about = None)]
#[command(version)]
struct Args {
    /// Document to narrate (.txt, .md or .epub)
    input: Option<PathBuf>,

    /// Output directory for batch audio files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Start fresh, ignore an existing checkpoint
    #[arg(long)]
    no_resume: bool,

    /// Tuning profile: quality, balanced or throughput
    #[arg(long)]
    profile: Option<Profile>,

    /// Engine command template, e.g. "tts --voice {voice} --out {output} {text}"
    #[arg(long)]
    engine_cmd: Option<String>,

    /// Voice identifier passed to the engine
    #[arg(long)]
    voice: Option<String>,

    /// Concurrent engine calls
    #[arg(long)]
    workers: Option<usize>,

    /// Output format: wav or mp3
    #[arg(long)]
    format: Option<FormatKind>,

    /// Skip the merged `_complete` file
    #[arg(long)]
    no_final_merge: bool,

    /// Config file (default: ~/.config/cli-programs/gen-narration.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the batch plan without synthesizing anything
    Plan {
        /// Document to plan
        input: PathBuf,
    },
    /// Show checkpoint progress for a document
    Status {
        /// Document to look up
        input: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_target(false)
        .init();
}

async fn run(args: Args) -> Result<i32> {
    match &args.command {
        Some(Commands::Config { action }) => return handle_config_command(action, &args),
        Some(Commands::Plan { input }) => return handle_plan(input, &args),
        Some(Commands::Status { input }) => return handle_status(input, &args),
        None => {}
    }

    let input = args
        .input
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Input file is required. Run 'narrate --help' for usage."))?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let config = load_config(&args)?;
    if args.debug {
        eprintln!("Input: {}", input.display());
        eprintln!("Output: {}", config.output.dir.display());
        eprintln!("Profile: {}", config.profile.unwrap_or(Profile::Balanced));
        eprintln!("Engine: {:?}", config.synthesis.command);
        eprintln!("Workers: {}", config.synthesis.workers);
    }

    eprintln!("Reading: {}", input.display());
    let document = open_document(&input).context("Failed to read input document")?;
    eprintln!(
        "Source: \"{}\", {} chars{}",
        document.source_id,
        document.text.chars().count(),
        document
            .pages
            .as_ref()
            .map(|p| format!(", {} pages", p.len()))
            .unwrap_or_default()
    );

    if config.output.format == FormatKind::Mp3
        && !Encoder::new(config.output.ffmpeg.clone()).is_ffmpeg_available()
    {
        eprintln!(
            "Warning: {} not found; batches will be written as WAV",
            config.output.ffmpeg.display()
        );
    }

    let pool = create_pool(&config.synthesis).context("Failed to set up synthesis engine")?;
    let store = checkpoint_store(&config)?;
    let key = job_key(&document.source_id, &input);

    let stop = StopHandle::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nStopping; finished batches are kept, rerun to resume.");
                stop.request_stop();
            }
        });
    }

    let mut runner = JobRunner::new(config, store, Arc::new(pool))
        .with_resume(!args.no_resume)
        .with_stop(stop);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} batches ({eta}) {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let summary = runner
        .run(&document, &key, |progress| {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.completed as u64);
            match (progress.phase, progress.batch) {
                (JobPhase::FailedBatch(index), _) => pb.set_message(format!("batch {} failed", index + 1)),
                (_, Some(number)) => pb.set_message(format!("batch {} done", number)),
                _ => {}
            }
        })
        .await
        .context("Narration job failed")?;
    pb.finish_and_clear();

    eprintln!(
        "\nBatches: {}/{} ({} this run), failed chunks: {}",
        summary.completed_batches,
        summary.total_batches,
        summary.processed_batches,
        summary.failed_chunks
    );
    if summary.fallbacks > 0 {
        eprintln!("{} batch(es) written as WAV after MP3 encoding failed", summary.fallbacks);
    }
    if let Some(ref path) = summary.final_artifact {
        eprintln!("Complete file: {}", path.display());
    }
    if let Some(ref path) = summary.manifest {
        eprintln!("Manifest: {}", path.display());
    }

    Ok(match summary.outcome {
        JobOutcome::Complete => 0,
        JobOutcome::Incomplete => {
            eprintln!(
                "Failed batches: {:?}; rerun to retry them",
                summary.failed_batches.iter().map(|i| i + 1).collect::<Vec<_>>()
            );
            2
        }
        JobOutcome::Paused => 2,
    })
}

/// Config file values, then profile, then command-line overrides.
fn load_config(args: &Args) -> Result<NarrationConfig> {
    let mut config = match &args.config {
        Some(path) => NarrationConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => NarrationConfig::load().context("Failed to load configuration")?,
    };

    if let Some(profile) = args.profile {
        config.apply_profile(profile);
    }
    if let Some(ref cmd) = args.engine_cmd {
        config.synthesis.command = cmd.split_whitespace().map(str::to_string).collect();
    }
    if let Some(ref voice) = args.voice {
        config.synthesis.voice = voice.clone();
    }
    if let Some(workers) = args.workers {
        config.synthesis.workers = workers;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if let Some(ref dir) = args.output {
        config.output.dir = dir.clone();
    }
    if args.no_final_merge {
        config.batch.final_merge = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn checkpoint_store(config: &NarrationConfig) -> Result<CheckpointStore> {
    let dir = match &config.output.checkpoint_dir {
        Some(dir) => dir.clone(),
        None => CheckpointStore::default_dir()?,
    };
    Ok(CheckpointStore::new(dir))
}

fn handle_plan(input: &Path, args: &Args) -> Result<i32> {
    let config = load_config(args)?;
    let document = open_document(input).context("Failed to read input document")?;
    let batches = plan_document(&document, &config.batch);
    let segmenter = TextSegmenter::new(config.segment.clone());

    println!("{}: {} batches", document.source_id, batches.len());
    println!();
    println!(
        "{:>5}  {:>8}  {:>8}  {:>6}  {:>11}  {:>9}",
        "batch", "chars", "tokens", "chunks", "paragraphs", "pages"
    );
    for batch in &batches {
        let chunks = segmenter.segment(&batch.text).len();
        let pages = batch
            .page_range
            .map(|(first, last)| format!("{}-{}", first, last))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:>8}  {:>8}  {:>6}  {:>11}  {:>9}",
            batch.number(),
            batch.char_count,
            batch.token_estimate,
            chunks,
            format!("{}-{}", batch.paragraph_range.0 + 1, batch.paragraph_range.1 + 1),
            pages
        );
    }
    Ok(0)
}

fn handle_status(input: &Path, args: &Args) -> Result<i32> {
    let config = load_config(args)?;
    let store = checkpoint_store(&config)?;
    let key = job_key(&extract::source_id(input), input);

    match store.load(&key)? {
        Some(state) => {
            let (completed, total, pct) = state.progress();
            println!("Job: {}", state.job_key);
            println!("Checkpoint: {}", store.path_for(&key).display());
            println!("Started: {}", state.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Updated: {}", state.last_update.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Progress: {}/{} batches ({:.1}%)", completed, total, pct);
            let pending: Vec<usize> = state.pending_indices().iter().map(|i| i + 1).collect();
            if !pending.is_empty() {
                println!("Pending: {:?}", pending);
            }
            for record in state.artifacts.values() {
                println!(
                    "  {:>3}  {}  {:.1}s{}",
                    record.batch_index + 1,
                    record.path.display(),
                    record.duration_secs,
                    if record.failed_chunks > 0 {
                        format!("  ({} failed chunks)", record.failed_chunks)
                    } else {
                        String::new()
                    }
                );
            }
        }
        None => println!("No checkpoint for {}", input.display()),
    }
    Ok(0)
}

fn handle_config_command(action: &ConfigAction, args: &Args) -> Result<i32> {
    match action {
        ConfigAction::Show => {
            let config = load_config(args)?;
            let path = match &args.config {
                Some(path) => path.clone(),
                None => NarrationConfig::config_path()?,
            };
            println!("Configuration file: {}", path.display());
            println!();
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
        }
        ConfigAction::Path => {
            println!("{}", NarrationConfig::config_path()?.display());
        }
        ConfigAction::Init { force } => {
            let path = NarrationConfig::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            let path = NarrationConfig::default().save()?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(0)
}
