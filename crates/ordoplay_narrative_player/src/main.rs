// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` Narrative Player - headless runner for narrative spaces
//!
//! Plays a narrative space without presentation: media calls go to the
//! log, the playhead advances by fixed ticks and sessions can be saved
//! and resumed.
//!
//! ```text
//! ordoplay-narrative play story.ron --settings player.ron --resume
//! ordoplay-narrative validate story.ron
//! ```

mod console;
mod session;
mod settings;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ordoplay_narrative_graph::NarrativeSpace;
use ordoplay_narrative_sequencer::StrategyRegistry;
use session::PlaySession;
use settings::PlayerSettings;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ordoplay-narrative")]
#[command(about = "Play and check OrdoPlay narrative spaces")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a narrative space
    Play {
        /// Narrative space file (RON)
        space: PathBuf,

        /// Player settings file (RON)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Continue from the session file named in the settings
        #[arg(short, long)]
        resume: bool,

        /// Stop after this much narrative time
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// Report authoring problems in a narrative space
    Validate {
        /// Narrative space file (RON)
        space: PathBuf,
    },
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ordoplay_narrative=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Play {
            space,
            settings,
            resume,
            seconds,
        } => cmd_play(&space, settings.as_deref(), resume, seconds),
        Commands::Validate { space } => cmd_validate(&space),
    }
}

fn load_space(path: &Path) -> Result<NarrativeSpace> {
    NarrativeSpace::load_file(path).with_context(|| format!("loading narrative space {}", path.display()))
}

fn cmd_play(space: &Path, settings: Option<&Path>, resume: bool, seconds: Option<f64>) -> Result<()> {
    let settings = match settings {
        Some(path) => PlayerSettings::load(path)
            .with_context(|| format!("loading player settings {}", path.display()))?,
        None => PlayerSettings::default(),
    };
    let seconds = seconds.unwrap_or(settings.max_seconds);
    let space = load_space(space)?;
    tracing::info!("Playing '{}' ({} nodes)", space.name, space.nodes().count());

    let mut session = PlaySession::open(space, settings, resume)?;
    let summary = session.run(seconds)?;

    if summary.finished {
        tracing::info!("Finished at {:.2}s after {} ticks", summary.playhead, summary.ticks);
    } else {
        tracing::info!("Stopped at {:.2}s after {} ticks", summary.playhead, summary.ticks);
    }
    let failures = session.sequencer().failures();
    if let Some(first) = failures.first() {
        bail!(
            "{} traversal branch(es) failed, first on layer {}: {}",
            failures.len(),
            first.layer,
            first.error
        );
    }
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<()> {
    let space = load_space(path)?;
    let mut problems = 0;

    for issue in space.validate() {
        println!("  {issue}");
        problems += 1;
    }
    for (decision, strategy) in StrategyRegistry::with_builtins().unresolved(&space) {
        println!("  Decision point '{decision}' uses unknown strategy '{strategy}'");
        problems += 1;
    }

    if problems > 0 {
        bail!("{} has {problems} problem(s)", path.display());
    }
    println!("{} is valid", path.display());
    Ok(())
}
