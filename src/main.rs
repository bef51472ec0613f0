//! X-Moto Replay Tool
//!
//! Inspects `.rpl` files with the simulation core's replay codec.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use xmoto_sim::{Replay, SimConfig, VERSION};

#[derive(Parser)]
#[command(name = "xmoto-sim", version, about = "Inspect X-Moto replays")]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a replay header
    Info {
        /// Replay name or path
        replay: String,
    },
    /// Decode a whole replay
    Inspect {
        /// Replay name or path
        replay: String,
        /// List the scene events
        #[arg(long)]
        events: bool,
        /// List the state chunks
        #[arg(long)]
        chunks: bool,
    },
    /// List the replays of a directory
    List {
        /// Replay directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?
            .with_overrides(|key| std::env::var(key).ok()),
        None => SimConfig::from_env(),
    };
    info!("X-Moto sim v{}", VERSION);

    match cli.command {
        Command::Info { replay } => info_command(&replay, &config),
        Command::Inspect { replay, events, chunks } => inspect_command(&replay, &config, events, chunks),
        Command::List { dir } => list_command(dir.unwrap_or_else(|| config.replay_dir.clone())),
    }
}

fn format_time(time: i32) -> String {
    if time < 0 {
        return "unfinished".to_string();
    }
    format!("{}:{:02}:{:02}", time / 6000, (time / 100) % 60, time % 100)
}

fn info_command(name: &str, config: &SimConfig) -> Result<()> {
    let info = Replay::probe_info(name, &config.replay_dir)
        .with_context(|| format!("Unable to read the header of {name}"))?;

    println!("{:<20}: {}", "Replay", info.name);
    println!("{:<20}: {}", "Version", info.version);
    println!("{:<20}: {}", "Level Id", info.level_id);
    println!("{:<20}: {}", "Player", info.player);
    println!("{:<20}: {}", "Finish time", format_time(info.finish_time));
    Ok(())
}

fn inspect_command(name: &str, config: &SimConfig, show_events: bool, show_chunks: bool) -> Result<()> {
    let replay = Replay::open(name, &config.replay_dir).with_context(|| format!("Unable to open {name}"))?;

    let finish = if replay.is_finished() { replay.finish_time() } else { -1 };
    println!("{:<20}: {}", "Version", replay.header().version);
    println!("{:<20}: {}", "Level Id", replay.level_id());
    println!("{:<20}: {}", "Player", replay.player_name());
    println!("{:<20}: {}", "Frame rate", replay.frame_rate());
    println!("{:<20}: {}", "State size", replay.state_size());
    println!("{:<20}: {}", "Finish time", format_time(finish));
    println!("{:<20}: {}", "Chunks", replay.chunks().len());
    println!("{:<20}: {}", "States", replay.num_states());
    println!("{:<20}: {}", "Events", replay.events().len());
    println!("{:<20}: {}", "Moving blocks", replay.moving_blocks().len());
    println!("{:<20}: {}", "Digest", replay.digest_hex());

    if show_events {
        for recorded in replay.events() {
            println!("  {:>8}  {}", format_time(recorded.event.time), recorded.event);
        }
    }
    if show_chunks {
        for (i, chunk) in replay.chunks().iter().enumerate() {
            println!("  chunk {i:02}: {} states", chunk.num_states);
        }
    }
    Ok(())
}

fn list_command(dir: PathBuf) -> Result<()> {
    let entries = std::fs::read_dir(&dir).with_context(|| format!("Unable to read {}", dir.display()))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "rpl"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();

    for name in names {
        match Replay::probe_info(&name, &dir) {
            Some(info) => println!(
                "{:<30} {:<20} {:<16} {}",
                info.name,
                info.level_id,
                info.player,
                format_time(info.finish_time)
            ),
            None => warn!(replay = %name, "Skipping unreadable replay"),
        }
    }
    Ok(())
}
