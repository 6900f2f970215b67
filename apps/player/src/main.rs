//! Livewatch Player - headless live-stream player.
//!
//! Hosts a Livewatch playback session around an external player process.
//! Commands typed on stdin drive the session (retry, quality changes, and
//! simulated background/foreground transitions), which makes the binary
//! useful both for watching a stream and for exercising the controller
//! against a real admission API.

mod commands;
mod config;
mod process_engine;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use livewatch_core::{
    bootstrap_session, BootstrappedSession, BroadcastEvent, FailureEvent, HostSignal,
    SessionEvent, SessionStatus, StaticCredentials,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

use crate::commands::{Command, HELP};
use crate::config::PlayerConfig;
use crate::process_engine::ProcessEngine;

/// Livewatch Player - resilient headless live-stream player.
#[derive(Parser, Debug)]
#[command(name = "livewatch-player")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "LIVEWATCH_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Admission API base URL (overrides config file).
    #[arg(long)]
    api_url: Option<String>,

    /// Media server base URL (overrides config file).
    #[arg(long)]
    media_url: Option<String>,

    /// External player command, `{uri}` is replaced by the playlist URI.
    #[arg(long, value_name = "CMD")]
    player_cmd: Option<String>,

    /// Quality to switch to once playback starts.
    #[arg(short, long)]
    quality: Option<String>,

    /// Bearer credential of the signed-in user.
    #[arg(long, env = "LIVEWATCH_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Livewatch Player v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(url) = args.media_url {
        config.media_url = url;
    }
    if let Some(cmd) = args.player_cmd {
        config.player_command = cmd;
    }
    if let Some(quality) = args.quality {
        config.preferred_quality = Some(quality);
    }

    log::info!(
        "Configuration: api={}, media={}, player='{}'",
        config.api_url,
        config.media_url,
        config.player_command
    );
    if args.auth_token.is_none() {
        log::warn!("LIVEWATCH_AUTH_TOKEN is not set; stream tokens cannot be issued");
    }

    let engine = ProcessEngine::new(&config.player_command)
        .context("Invalid player command")?
        .with_startup_grace(config.startup_grace());
    let credentials = Arc::new(StaticCredentials::new(args.auth_token));
    let services = bootstrap_session(&config.to_core_config(), credentials, Arc::new(engine))
        .context("Failed to bootstrap session")?;

    let signals = services.spawn_lifecycle(8);
    tokio::spawn(log_status(services.clone()));
    tokio::spawn(log_events(services.clone()));
    if let Some(quality) = config.preferred_quality.clone() {
        tokio::spawn(apply_preferred_quality(services.clone(), quality));
    }

    services.session.start().await?;
    println!("{}", HELP);

    tokio::select! {
        result = command_loop(&services, &signals) => {
            if let Err(e) = result {
                log::error!("Command loop failed: {:#}", e);
            }
        }
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
    }

    // Graceful shutdown
    services.shutdown().await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Reads commands from stdin until `quit` or end of input.
async fn command_loop(services: &BootstrappedSession, signals: &mpsc::Sender<HostSignal>) -> Result<()> {
    let session = &services.session;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let result = match command {
            Command::Start => session.start().await,
            Command::Stop => session.stop().await,
            Command::Retry => session.manual_retry().await,
            Command::TogglePause => session.toggle_play_pause().await,
            Command::Quality(name) => session.change_quality(name).await,
            Command::Background => {
                signals.send(HostSignal::Inactive).await?;
                Ok(())
            }
            Command::Foreground => {
                signals.send(HostSignal::Active).await?;
                Ok(())
            }
            Command::Status => {
                println!("{:#?}", session.snapshot());
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => break,
        };

        if let Err(e) = result {
            println!("error: {}", e);
        }
    }

    Ok(())
}

/// Logs every snapshot change.
async fn log_status(services: BootstrappedSession) {
    let mut rx = services.session.subscribe();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        log::info!(
            "Status: {:?} | quality: {} | online: {:?} | retries: {} | active: {}{}",
            snapshot.status,
            snapshot.current_quality.as_deref().unwrap_or("-"),
            snapshot.stream_online,
            snapshot.retry_count,
            snapshot.is_active,
            if snapshot.buffering { " | buffering" } else { "" }
        );
    }
}

/// Logs user-facing events from the event bridge.
async fn log_events(services: BootstrappedSession) {
    let mut events = services.event_bridge.subscribe();
    loop {
        match events.recv().await {
            Ok(BroadcastEvent::Failure(FailureEvent::Reported {
                code,
                error,
                retry_count,
                ..
            })) => {
                log::warn!("Playback problem [{}]: {} (retries: {})", code, error, retry_count);
            }
            Ok(BroadcastEvent::Session(SessionEvent::RetryScheduled {
                attempt,
                max_attempts,
                delay_ms,
                ..
            })) => {
                log::info!("Retrying ({}/{}) in {} ms", attempt, max_attempts, delay_ms);
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                log::debug!("Event logger lagged by {} event(s)", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Switches to the preferred quality the first time playback starts.
async fn apply_preferred_quality(services: BootstrappedSession, quality: String) {
    let mut rx = services.session.subscribe();
    if rx
        .wait_for(|s| s.status == SessionStatus::Playing)
        .await
        .is_err()
    {
        return;
    }
    if rx.borrow().current_quality.as_deref() == Some(quality.as_str()) {
        return;
    }
    if let Err(e) = services.session.change_quality(quality.as_str()).await {
        log::warn!("Preferred quality '{}' not applied: {}", quality, e);
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
