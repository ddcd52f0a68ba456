//! pipeplay entry point.
//!
//! Reads raw interleaved PCM from standard input and plays it on the default
//! output device until the pipe closes or stays idle past `-t` seconds.
//!
//! ## Logging
//!
//! All logs go to stderr. `RUST_LOG` wins when set; otherwise `-v` picks the
//! level (0 off, 1 error, 2 warn, 3 info, 4 debug, 5+ trace).

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pipeplay_core::{PipeReader, Player, Termination};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn level_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "off",
        1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level_filter(verbosity))),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run<F>(settings: cli::Settings, play: F) -> Result<Termination>
where
    F: FnOnce(&Player) -> pipeplay_core::Result<Termination>,
{
    let player = Player::new(settings.config).context("invalid playback settings")?;
    play(&player).context("playback failed")
}

/// Run playback and map the outcome to the process exit status. Every
/// graceful ending is a success.
fn run_to_exit<F>(settings: cli::Settings, play: F) -> ExitCode
where
    F: FnOnce(&Player) -> pipeplay_core::Result<Termination>,
{
    match run(settings, play) {
        Ok(termination) => {
            info!("finished: {termination}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let settings = cli::Args::parse().into_settings();
    for warning in &settings.warnings {
        eprintln!("{warning}");
    }

    init_tracing(settings.verbosity);

    run_to_exit(settings, |player| {
        let mut input = PipeReader::stdin()?;
        player.play(&mut input)
    })
}
