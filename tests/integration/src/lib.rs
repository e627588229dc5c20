//! Integration test utilities for frameplayer
//!
//! This module provides common utilities for integration testing including:
//! - Players wired to a scriptable synthetic engine
//! - Event recording
//! - Frame comparison against the synthetic test pattern
//! - Temporary configuration files

use anyhow::{Context, Result};
use frameplayer::engine::synthetic::pattern_pixel;
use frameplayer::engine::{SyntheticControl, SyntheticEngineFactory, SyntheticOptions};
use frameplayer::{MediaFormat, MediaPlayerBuilder, MediaPlayerRef, MediaSource, PlayerEvent, Surface, UpdateSignal};
use frameplayer::EventSubscription;
use image::{Rgba, RgbaImage};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A player on a synthetic engine and a private tick source
pub struct PlayerFixture {
    pub player: MediaPlayerRef,
    pub control: SyntheticControl,
    pub signal: Arc<UpdateSignal>,
}

impl PlayerFixture {
    /// Software-rendered player with default synthetic media
    pub fn new() -> Result<Self> {
        Self::with(SyntheticOptions::default(), MediaFormat::default().hardware_accelerated(false))
    }

    pub fn with(options: SyntheticOptions, format: MediaFormat) -> Result<Self> {
        let factory = SyntheticEngineFactory::new(options);
        let control = factory.control();
        let signal = UpdateSignal::new();
        let player = MediaPlayerBuilder::new(MediaSource::url("synthetic://fixture"))
            .with_format(format)
            .with_engine_factory(Arc::new(factory))
            .with_update_signal(Arc::clone(&signal))
            .build()
            .context("synthetic player should build")?;

        Ok(Self { player, control, signal })
    }

    /// Emit the tick source `count` times
    pub fn tick(&self, count: usize) {
        for _ in 0..count {
            self.signal.emit();
        }
    }

    /// Tick until metadata is in, then make one fresh frame available
    pub fn ready_with_frame(&self) {
        self.tick(1);
        self.control.push_frame();
        self.tick(1);
    }
}

/// Records every notification a player raises
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl EventLog {
    /// Subscribe a new log; the log stops recording when the subscription drops
    pub fn attach(player: &MediaPlayerRef) -> (Self, EventSubscription) {
        let log = Self::default();
        let sink = log.clone();
        let subscription = player.subscribe(move |event| sink.push(event));
        (log, subscription)
    }

    fn push(&self, event: PlayerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded events, clearing the log
    pub fn take(&self) -> Vec<PlayerEvent> {
        self.events.lock().map(|mut e| std::mem::take(&mut *e)).unwrap_or_default()
    }

    pub fn count(&self, event: PlayerEvent) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }
}

/// A surface as an RGBA image
pub fn surface_image(surface: &Surface) -> Result<RgbaImage> {
    let (width, height) = surface.size();
    RgbaImage::from_raw(width, height, surface.to_rgba8()).context("surface size does not match its pixels")
}

/// The synthetic pattern for `frame`, as an RGBA image
pub fn expected_pattern(width: u32, height: u32, frame: u64) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let [b, g, r, a] = pattern_pixel(x, y, width, height, frame);
        Rgba([r, g, b, a])
    })
}

/// Temporary directory for config files
pub struct ConfigDir {
    pub temp_dir: TempDir,
}

impl ConfigDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Write `contents` as a config file and return its path
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}
