//! High-level media player API for frameplayer
//!
//! [`MediaPlayer`] is the shared handle consumers hold. It owns one
//! [`PlaybackController`], registers itself with an [`UpdateSignal`] so it is
//! updated once per tick, and delivers notifications to subscribers after
//! each update with the controller unlocked, so callbacks may call straight
//! back into the player.

use super::controller::PlaybackController;
use super::events::{EventDispatcher, EventSubscription};
use super::tick::{Connection, UpdateSignal};
use super::{Bounds, ErrorCode, MediaFormat, PlayerEvent};
use crate::engine::{EngineFactory, FfmpegEngineFactory, MediaSource};
use crate::render::{FrameLease, Surface};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared player handle
pub type MediaPlayerRef = Arc<MediaPlayer>;

static LIVE_PLAYERS: AtomicUsize = AtomicUsize::new(0);

/// Players currently alive in this process
pub fn live_player_count() -> usize {
    LIVE_PLAYERS.load(Ordering::Acquire)
}

/// Media player builder for customized construction
pub struct MediaPlayerBuilder {
    source: MediaSource,
    format: MediaFormat,
    factory: Option<Arc<dyn EngineFactory>>,
    signal: Option<Arc<UpdateSignal>>,
}

impl MediaPlayerBuilder {
    pub fn new(source: MediaSource) -> Self {
        Self {
            source,
            format: MediaFormat::default(),
            factory: None,
            signal: None,
        }
    }

    pub fn with_format(mut self, format: MediaFormat) -> Self {
        self.format = format;
        self
    }

    /// Engine factory to use instead of FFmpeg
    pub fn with_engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Tick source to register with instead of [`UpdateSignal::global`]
    pub fn with_update_signal(mut self, signal: Arc<UpdateSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Build the player; `None` if the source or engine is unusable
    pub fn build(self) -> Option<MediaPlayerRef> {
        if !self.source.is_url() && !self.source.is_available() {
            error!("Media file not found: {}", self.source);
            return None;
        }

        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(FfmpegEngineFactory::new()));
        let controller = match PlaybackController::new(&self.source, &self.format, factory.as_ref()) {
            Ok(controller) => controller,
            Err(e) => {
                error!("Failed to create player for {}: {}", self.source, e);
                return None;
            }
        };

        let signal = self.signal.unwrap_or_else(UpdateSignal::global);
        let source = self.source;
        let format = self.format;
        let player = Arc::new_cyclic(|weak| MediaPlayer {
            connection: signal.connect(weak.clone()),
            controller: Mutex::new(controller),
            dispatcher: EventDispatcher::new(),
            last_error: Mutex::new(ErrorCode::NoError),
            source,
            format,
        });

        let live = LIVE_PLAYERS.fetch_add(1, Ordering::AcqRel) + 1;
        info!("Player created for {} ({} live)", player.source, live);
        Some(player)
    }
}

/// Shared, ticked media player
pub struct MediaPlayer {
    // Disconnect from the tick source before anything else goes
    connection: Connection,
    controller: Mutex<PlaybackController>,
    dispatcher: EventDispatcher,
    last_error: Mutex<ErrorCode>,
    source: MediaSource,
    format: MediaFormat,
}

impl MediaPlayer {
    /// Create a player on the FFmpeg engine and the global tick source
    pub fn create(source: MediaSource, format: MediaFormat) -> Option<MediaPlayerRef> {
        MediaPlayerBuilder::new(source).with_format(format).build()
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    /// Whether frames go through the shared texture path
    ///
    /// False when acceleration was requested but unavailable.
    pub fn is_hardware_accelerated(&self) -> bool {
        self.controller.lock().is_hardware_accelerated()
    }

    /// Whether this player is still registered with its tick source
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Run one tick and deliver the notifications it raised
    ///
    /// Normally driven by [`UpdateSignal::emit`]. Always returns false.
    pub fn update(&self) -> bool {
        let (result, notifications) = {
            let mut controller = self.controller.lock();
            let result = controller.update();
            (result, controller.take_notifications())
        };

        for event in notifications {
            if let PlayerEvent::Error(code) = event {
                error!("Playback error on {}: {}", self.source, code);
                *self.last_error.lock() = code;
            }
            self.dispatcher.dispatch(event);
        }
        result
    }

    /// Call `callback` for every notification until the subscription drops
    pub fn subscribe<F>(&self, callback: F) -> EventSubscription
    where
        F: Fn(PlayerEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(callback)
    }

    /// Code of the most recent error notification
    pub fn last_error(&self) -> ErrorCode {
        *self.last_error.lock()
    }

    pub fn play(&self) {
        self.controller.lock().play();
    }

    pub fn pause(&self) {
        self.controller.lock().pause();
    }

    pub fn toggle_playback(&self) {
        self.controller.lock().toggle_playback();
    }

    pub fn set_playback_rate(&self, rate: f64) -> bool {
        self.controller.lock().set_playback_rate(rate)
    }

    pub fn playback_rate(&self) -> f64 {
        self.controller.lock().playback_rate()
    }

    pub fn is_playback_rate_supported(&self, rate: f64) -> bool {
        self.controller.lock().is_playback_rate_supported(rate)
    }

    /// Blocks until the engine has applied the change
    pub fn set_muted(&self, muted: bool) {
        self.controller.lock().set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.controller.lock().is_muted()
    }

    /// Blocks until the engine has applied the change
    pub fn set_volume(&self, volume: f32) {
        self.controller.lock().set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.controller.lock().volume()
    }

    pub fn set_loop(&self, looping: bool) {
        self.controller.lock().set_loop(looping);
    }

    pub fn is_looping(&self) -> bool {
        self.controller.lock().is_looping()
    }

    pub fn seek_to_seconds(&self, seconds: f64, approximate: bool) {
        self.controller.lock().seek_to_seconds(seconds, approximate);
    }

    pub fn seek_to_percentage(&self, percentage: f64, approximate: bool) {
        self.controller.lock().seek_to_percentage(percentage, approximate);
    }

    pub fn frame_step(&self, delta: i32) {
        self.controller.lock().frame_step(delta);
    }

    pub fn size(&self) -> (u32, u32) {
        self.controller.lock().size()
    }

    pub fn bounds(&self) -> Bounds {
        self.controller.lock().bounds()
    }

    pub fn is_complete(&self) -> bool {
        self.controller.lock().is_complete()
    }

    pub fn is_playing(&self) -> bool {
        self.controller.lock().is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.controller.lock().is_paused()
    }

    pub fn is_seeking(&self) -> bool {
        self.controller.lock().is_seeking()
    }

    pub fn is_ready(&self) -> bool {
        self.controller.lock().is_ready()
    }

    pub fn has_audio(&self) -> bool {
        self.controller.lock().has_audio()
    }

    pub fn has_video(&self) -> bool {
        self.controller.lock().has_video()
    }

    pub fn position_in_seconds(&self) -> f64 {
        self.controller.lock().position_in_seconds()
    }

    pub fn duration_in_seconds(&self) -> f64 {
        self.controller.lock().duration_in_seconds()
    }

    pub fn check_new_frame(&self) -> bool {
        self.controller.lock().check_new_frame()
    }

    /// CPU pixels of the latest frame; `None` on the shared texture path
    pub fn surface(&self) -> Option<Arc<Surface>> {
        self.controller.lock().surface()
    }

    /// Lease on the latest frame; drop it before the next tick
    pub fn texture(&self) -> FrameLease {
        self.controller.lock().frame_lease()
    }
}

impl Drop for MediaPlayer {
    fn drop(&mut self) {
        let live = LIVE_PLAYERS.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        debug!("Player for {} dropped ({} live)", self.source, live);
    }
}
