mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use quartet_core::{
    Fetcher, HttpFetcher, Output, Part, PlayerSession, SchemeFetcher, TrackLoad, TrackLoader,
};
use quartet_engine::EngineConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::Input;
use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Play up to four parts of a composition, alone or in sync.
///
/// Type 0-3 to toggle drum, bass, guitar or melody, `a` to toggle all parts
/// together, `s` for status, `r` to reload and `q` to quit.
#[derive(Parser, Debug)]
#[command(name = "quartet", version)]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Fetch timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Write the effective config back to the config file
    #[arg(long)]
    save_config: bool,

    /// Track locations (URL, file:// or path) in part order; `-` leaves a part empty
    #[arg(num_args = 0..=4)]
    tracks: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref());
    if let Some(device) = args.device {
        config.engine.output_device = Some(device);
    }
    if let Some(timeout) = args.timeout {
        config.loader.timeout_secs = timeout;
    }
    if args.save_config {
        let path = config.save(args.config.as_deref())?;
        log::info!("config written to {}", path.display());
    }

    let mut engine = quartet_engine::start(&EngineConfig {
        output_device: config.engine.output_device.clone(),
    })?;

    let http = HttpFetcher::new(
        Duration::from_secs(config.loader.timeout_secs),
        &config.loader.user_agent,
    )?;
    let loader = Arc::new(TrackLoader::new(SchemeFetcher::new(http), engine.sample_rate()));
    let mut session = PlayerSession::new(
        loader,
        engine.output().clone(),
        tokio::runtime::Handle::current(),
    );
    session.set_tracks(
        args.tracks
            .iter()
            .map(|track| (track != "-").then(|| track.clone()))
            .collect(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    let mut announced = false;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                session.poll();
                engine.collect();

                for update in session.updates() {
                    let verb = if update.playing { "playing" } else { "stopped" };
                    println!("{}: {verb}", update.part);
                }
                if !announced && session.all_loaded() {
                    announced = true;
                    print_status(&session);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Input>() {
                    Ok(Input::Toggle(part)) => session.toggle_play_pause(part),
                    Ok(Input::ToggleAll) => session.toggle_play_pause_all(),
                    Ok(Input::Status) => print_status(&session),
                    Ok(Input::Reload) => {
                        announced = false;
                        session.reload();
                    }
                    Ok(Input::Quit) => break,
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }

    drop(session);
    engine.collect();
    Ok(())
}

fn print_status<F: Fetcher, O: Output>(session: &PlayerSession<F, O>) {
    for part in Part::REAL {
        let load = match session.load(part) {
            Some(TrackLoad::Absent) | None => "no track".to_string(),
            Some(TrackLoad::Loading) => "loading".to_string(),
            Some(TrackLoad::Ready(audio)) => format!("{:.1}s", audio.duration_secs()),
            Some(TrackLoad::Failed(err)) => format!("failed: {err}"),
        };
        let state = if session.is_playing(part) { "playing" } else { "stopped" };
        println!("  {} {:<7} {state:<8} {load}", part.index(), part.name());
    }
    let group = if session.is_playing(Part::All) { "playing" } else { "stopped" };
    println!("  a all     {group}");
}
