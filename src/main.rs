use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

mod config;
mod error;
mod handler;
mod metadata;
mod scrobble;
mod service;

use crate::config::{default_config_path, load_config};
use crate::handler::{Outcome, handle, plan};
use crate::metadata::{Event, read_track};
use crate::service::ServiceConnector;

#[derive(Parser, Debug)]
#[command(
    name = "pianobar-scrobble",
    version,
    about = "Scrobble, love and ban pianobar songs from its event_command hook"
)]
struct Cli {
    #[arg(help = "Event name passed by pianobar, e.g. songfinish")]
    event: String,
    #[arg(long, value_name = "PATH", env = "PIANOBAR_SCROBBLE_CONFIG")]
    config_path: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = false,
        help = "Evaluate the song without contacting the service"
    )]
    dry_run: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Log raw API responses at debug level"
    )]
    debug_response: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let event: Event = cli.event.parse()?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed reading song metadata from stdin")?;

    let config_path = cli.config_path.unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path)?;
    config.apply_env(|name| std::env::var(name).ok());

    let track = read_track(&input, config.parse_mode())?;

    if cli.dry_run {
        let outcome = plan(&event, &track, &config.policy, Utc::now());
        for line in dry_run_summary(&event, &outcome) {
            log::info!("{line}");
        }
    } else {
        let connector = ServiceConnector::new(&config, cli.debug_response);
        handle(&event, &track, &config.policy, &connector, Utc::now())?;
    }
    Ok(())
}

fn dry_run_summary(event: &Event, outcome: &Outcome) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(scrobble) = &outcome.scrobbled {
        lines.push(format!(
            "Would scrobble {} - {} at {}",
            scrobble.artist, scrobble.title, scrobble.timestamp
        ));
    }
    if let Some(action) = outcome.rated {
        lines.push(format!("Would send {action:?}"));
    }
    if outcome.is_noop() {
        lines.push(format!("Nothing to do for {event}"));
    }
    lines
}
