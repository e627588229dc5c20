use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use frameplayer::engine::{SyntheticEngineFactory, SyntheticOptions};
use frameplayer::player::{MediaPlayerBuilder, MediaPlayerRef, PlayerEvent, UpdateSignal};
use frameplayer::utils::{format_position, Config};
use frameplayer::MediaSource;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// frameplayer - headless, tick-driven media playback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file or URL to play
    #[arg(value_name = "INPUT", required_unless_present = "test_pattern")]
    input: Option<String>,

    /// Play the built-in synthetic test pattern instead of a file
    #[arg(long)]
    test_pattern: bool,

    /// Use the CPU bitmap render path
    #[arg(long)]
    software: bool,

    /// Disable audio output
    #[arg(long)]
    no_audio: bool,

    /// Ignore video streams
    #[arg(long)]
    audio_only: bool,

    /// Audio output device name
    #[arg(long, value_name = "NAME")]
    audio_device: Option<String>,

    /// Initial volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Initial playback rate
    #[arg(long)]
    rate: Option<f64>,

    /// Loop playback
    #[arg(long = "loop")]
    looping: bool,

    /// Configuration file to use instead of the default locations
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print status as JSON lines on stdout
    #[arg(long)]
    status_json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// One status line
#[derive(Debug, Serialize)]
struct Status {
    position: f64,
    duration: f64,
    playing: bool,
    seeking: bool,
    complete: bool,
    ready: bool,
    muted: bool,
    volume: f32,
    rate: f64,
    width: u32,
    height: u32,
    hardware_accelerated: bool,
    frames: u64,
}

impl Status {
    fn capture(player: &MediaPlayerRef, frames: u64) -> Self {
        let (width, height) = player.size();
        Self {
            position: player.position_in_seconds(),
            duration: player.duration_in_seconds(),
            playing: player.is_playing(),
            seeking: player.is_seeking(),
            complete: player.is_complete(),
            ready: player.is_ready(),
            muted: player.is_muted(),
            volume: player.volume(),
            rate: player.playback_rate(),
            width,
            height,
            hardware_accelerated: player.is_hardware_accelerated(),
            frames,
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };

    let player = &mut config.player;
    if args.software {
        player.hardware_accelerated = false;
    }
    if args.no_audio {
        player.audio_enabled = false;
    }
    if args.audio_only {
        player.audio_only = true;
    }
    if let Some(device) = &args.audio_device {
        player.audio_device_id = Some(device.clone());
    }
    if let Some(volume) = args.volume {
        player.volume = volume;
    }
    if let Some(rate) = args.rate {
        player.playback_rate = rate;
    }
    if args.looping {
        player.loop_playback = true;
    }
    if args.debug {
        config.general.log_level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

fn source_for(input: &str) -> MediaSource {
    if input.contains("://") {
        MediaSource::url(input)
    } else {
        MediaSource::file(input)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    env_logger::Builder::from_env(Env::default().default_filter_or(config.general.log_level.as_str()))
        .format_timestamp_millis()
        .init();

    info!("Starting frameplayer v{}", env!("CARGO_PKG_VERSION"));

    let signal = UpdateSignal::global();
    let mut builder = if args.test_pattern {
        MediaPlayerBuilder::new(MediaSource::url("synthetic://test-pattern"))
            .with_engine_factory(Arc::new(SyntheticEngineFactory::new(SyntheticOptions::default())))
    } else {
        let input = args.input.as_deref().context("No input given")?;
        MediaPlayerBuilder::new(source_for(input))
    };
    builder = builder
        .with_format(config.player.media_format())
        .with_update_signal(Arc::clone(&signal));

    let player = builder.build().context("Failed to create player")?;

    let settings = &config.player;
    player.set_loop(settings.loop_playback);
    player.set_volume(settings.volume);
    if (settings.playback_rate - 1.0).abs() > f64::EPSILON && !player.set_playback_rate(settings.playback_rate) {
        warn!("Playback rate {} is not supported, staying at {}", settings.playback_rate, player.playback_rate());
    }

    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);
    let looping = settings.loop_playback;
    let _subscription = player.subscribe(move |event| match event {
        PlayerEvent::Error(code) => {
            error!("Playback failed: {}", code);
            done.store(true, Ordering::Release);
        }
        PlayerEvent::Complete if !looping => {
            info!("Playback complete");
            done.store(true, Ordering::Release);
        }
        PlayerEvent::Complete => info!("Looped"),
        other => debug!("Player event: {}", other),
    });

    player.play();

    let tick_rate = config.playback.tick_rate_hz.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let status_every = config.playback.status_interval_secs;
    let mut status = tokio::time::interval(Duration::from_secs(status_every.max(1)));

    let mut frames: u64 = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                signal.emit();
                if player.check_new_frame() {
                    let lease = player.texture();
                    if lease.is_valid() {
                        frames += 1;
                    }
                }
                if finished.load(Ordering::Acquire) {
                    break;
                }
            }
            _ = status.tick(), if status_every > 0 => {
                let current = Status::capture(&player, frames);
                if args.status_json {
                    println!("{}", serde_json::to_string(&current)?);
                } else {
                    info!(
                        "{} / {} ({} frames)",
                        format_position(current.position),
                        format_position(current.duration),
                        current.frames
                    );
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    let last = player.last_error();
    info!("Shutting down ({} frames presented)", frames);
    drop(player);

    if last != frameplayer::ErrorCode::NoError {
        anyhow::bail!("Playback ended with error: {}", frameplayer::error_to_string(last));
    }
    Ok(())
}
