use crate::config::{load_config, save_config};
use crate::daemon::{result_sink, run_daemon, WatchOptions, MIN_FPS};
use crate::dispatch::{Dispatcher, Pipeline};
use crate::frame::load_photo;
use crate::gate::GateError;
use crate::ipc::{send_command, ControlMessage, ControlReply};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "snackgate",
    version,
    about = "Snack classifier with bounded camera frame admission"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify a frame stream through the admission gate
    Watch {
        /// Directory of images replayed as the stream
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Read from the first camera instead of a directory
        #[arg(long, conflicts_with = "dir")]
        camera: bool,
        /// Frames allowed in dispatch at once
        #[arg(short = 'k', long)]
        capacity: Option<usize>,
        /// Maximum frames per second pulled from the source
        #[arg(long)]
        fps: Option<f32>,
        /// Passes over the directory, 0 for endless
        #[arg(long)]
        loops: Option<u32>,
        /// Print reports as JSON lines on stdout
        #[arg(long)]
        json: bool,
    },
    /// Classify a single photo in this process
    Photo {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Send a photo to a running watcher
    Submit { path: PathBuf },
    /// Print the running watcher's gate counters
    Status,
    /// Show or change the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigSubcommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,
    /// Set the admission capacity
    Capacity { capacity: usize },
    /// Set the stream frame rate
    Fps { fps: f32 },
    /// Set the confidence above which a label is reported as certain
    Threshold { threshold: f32 },
}

pub fn run_cli() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Watch {
            dir,
            camera,
            capacity,
            fps,
            loops,
            json,
        } => run_daemon(WatchOptions {
            dir,
            camera,
            capacity,
            fps,
            loops,
            json,
        }),
        Commands::Photo { path, json } => classify_photo(path, json),
        Commands::Submit { path } => submit_photo(path),
        Commands::Status => print_status(),
        Commands::Config { action } => configure(action),
    }
}

fn classify_photo(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let cfg = load_config();
    let dispatcher = Dispatcher::spawn(Pipeline::from_config(&cfg, result_sink(json))?)?;
    dispatcher.photo_submitter().admit_photo(load_photo(&path)?)?;
    dispatcher.shutdown();
    Ok(())
}

fn submit_photo(path: PathBuf) -> anyhow::Result<()> {
    // The watcher resolves the path itself.
    let path = std::fs::canonicalize(&path)
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    match send_command(ControlMessage::SubmitPhoto(path)).context("watcher not reachable")? {
        ControlReply::Accepted => {
            info!("photo accepted");
            Ok(())
        }
        ControlReply::Error(msg) => bail!("watcher rejected photo: {msg}"),
        other => bail!("unexpected reply: {other:?}"),
    }
}

fn print_status() -> anyhow::Result<()> {
    match send_command(ControlMessage::Status).context("watcher not reachable")? {
        ControlReply::Status(stats) => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        ControlReply::Error(msg) => bail!("{msg}"),
        other => bail!("unexpected reply: {other:?}"),
    }
}

fn configure(action: ConfigSubcommand) -> anyhow::Result<()> {
    let mut cfg = load_config();
    match action {
        ConfigSubcommand::Show => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            return Ok(());
        }
        ConfigSubcommand::Capacity { capacity } => {
            if capacity == 0 {
                return Err(GateError::ZeroCapacity.into());
            }
            cfg.capacity = capacity;
            info!("admission capacity set to {capacity}");
        }
        ConfigSubcommand::Fps { fps } => {
            if !fps.is_finite() || fps < MIN_FPS {
                bail!("fps must be a number of at least {MIN_FPS}");
            }
            cfg.fps = fps;
            info!("stream fps set to {fps}");
        }
        ConfigSubcommand::Threshold { threshold } => {
            if !(0.0..=1.0).contains(&threshold) {
                bail!("threshold must be between 0 and 1");
            }
            cfg.confident_threshold = threshold;
            info!("confidence threshold set to {threshold}");
        }
    }
    save_config(&cfg);
    Ok(())
}
