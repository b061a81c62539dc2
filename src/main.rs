// lampctl - drive lamps from a MIDI timeline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lampctl::config::Config;
use lampctl::messaging::NotificationLevel;
use lampctl::registry::{MemoryProvider, Provider, Registry};
use lampctl::sequencer::decoder::load_raw_events;
use lampctl::sequencer::{PlaybackState, Sequencer, Timeline};
use lampctl::create_notification_channel;
use ringbuf::traits::Consumer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Parser)]
#[command(name = "lampctl", version, about = "Play MIDI timelines on lighting providers")]
struct Cli {
    /// Configuration file (RON)
    #[arg(short, long, env = "LAMPCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, env = "DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load and compile a timeline, then print a summary
    Check {
        #[arg(long)]
        midi: PathBuf,
        #[arg(long)]
        mapping: PathBuf,
    },
    /// Play a timeline to the end on the configured providers
    Play {
        #[arg(long)]
        midi: PathBuf,
        #[arg(long)]
        mapping: PathBuf,
    },
    /// Print the decoded note events of a MIDI file
    Events {
        #[arg(long)]
        midi: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref()).context("loading configuration")?;
    init_logging(&config, cli.debug);

    match cli.command {
        Commands::Check { midi, mapping } => check(&config, midi, mapping),
        Commands::Play { midi, mapping } => play(&config, midi, mapping),
        Commands::Events { midi } => events(midi),
    }
}

/// `RUST_LOG` wins, then `--debug`, then the configured filter
fn init_logging(config: &Config, debug: bool) {
    let fallback = if debug {
        "debug".to_string()
    } else {
        config.log_filter.clone().unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_registry(config: &Config) -> Result<(Registry, Vec<Arc<MemoryProvider>>)> {
    let mut registry = Registry::new();
    let mut providers = Vec::with_capacity(config.providers.len());

    for provider_config in &config.providers {
        let provider = Arc::new(MemoryProvider::from_config(provider_config));
        registry
            .register(provider.clone())
            .with_context(|| format!("registering provider {}", provider_config.id))?;
        providers.push(provider);
    }

    tracing::info!(providers = registry.len(), "registry ready");
    Ok((registry, providers))
}

fn check(config: &Config, midi: PathBuf, mapping: PathBuf) -> Result<()> {
    let (registry, _) = build_registry(config)?;
    let timeline = Timeline::load(&midi, &mapping, &registry)
        .with_context(|| format!("compiling {}", midi.display()))?;

    println!(
        "{}: {} groups, {} changes, {:.3}s",
        midi.display(),
        timeline.len(),
        timeline.change_count(),
        timeline.duration().as_secs_f64()
    );
    for (index, group) in timeline.groups().iter().enumerate() {
        println!("  #{:<4} {:>10.3}s", index, group.offset.as_secs_f64());
        for batch in &group.batches {
            let changes: Vec<String> = batch
                .changes
                .iter()
                .map(|c| format!("{}/{}={}", c.group_id, c.lamp_id, if c.state { "on" } else { "off" }))
                .collect();
            println!("        {}: {}", batch.provider_id(), changes.join(" "));
        }
    }

    registry.close();
    Ok(())
}

fn play(config: &Config, midi: PathBuf, mapping: PathBuf) -> Result<()> {
    let (registry, providers) = build_registry(config)?;
    let registry = Arc::new(registry);

    let (producer, mut notifications) =
        create_notification_channel(config.sequencer.notification_capacity);
    let sequencer =
        Sequencer::with_notifications(registry.clone(), config.sequencer.clone(), producer)?;

    sequencer
        .load(&midi, &mapping)
        .with_context(|| format!("loading {}", midi.display()))?;
    sequencer.play()?;

    loop {
        let finished = sequencer.status()?.state == PlaybackState::Idle;
        while let Some(notification) = notifications.try_pop() {
            let tag = match notification.level {
                NotificationLevel::Info => "info",
                NotificationLevel::Warning => "warning",
                NotificationLevel::Error => "error",
            };
            println!("[{}] {}", tag, notification.message);
        }

        if finished {
            break;
        }
        std::thread::sleep(STATUS_POLL_INTERVAL);
    }

    sequencer.close();
    for provider in &providers {
        println!("{}: {} batches applied", provider.id(), provider.apply_count());
    }
    registry.close();
    Ok(())
}

fn events(midi: PathBuf) -> Result<()> {
    let events = load_raw_events(&midi)?;

    for event in &events {
        println!(
            "{:>10.3}s  note {:>3}  {}",
            event.offset.as_secs_f64(),
            event.note,
            if event.is_on { "on" } else { "off" }
        );
    }
    println!("{} events", events.len());
    Ok(())
}
