//! Playback controller for frameplayer
//!
//! Owns one engine, its render path and the queue the engine reports into.
//! All state transitions happen in [`PlaybackController::update`] on the
//! consumer thread; engine threads only ever touch the queue.

use super::events::{EngineEventQueue, QueuedEvent};
use super::{Bounds, ErrorCode, MediaFormat, PlayerEvent};
use crate::engine::affinity;
use crate::engine::{
    EngineAttributes, EngineCreateFlags, EngineEvent, EngineFactory, EngineNotify, MediaEngine,
    MediaSource, SeekMode,
};
use crate::render::{FrameLease, RenderPath, Surface};
use crate::utils::error::{PlayerError, Result};
use crate::utils::unit_interval;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Post-seek position below which a loop may have happened, in seconds
const LOOP_POSITION_THRESHOLD: f64 = 0.05;

/// Maximum movement across a seek that still counts as a loop, in seconds
const LOOP_DELTA_THRESHOLD: f64 = 0.01;

pub struct PlaybackController {
    engine: Option<Arc<dyn MediaEngine>>,
    /// `None` only while tearing down
    render_path: Option<RenderPath>,
    events: Arc<EngineEventQueue>,
    duration: f64,
    size: (u32, u32),
    has_metadata: bool,
    has_new_frame: AtomicBool,
    /// A stream tick was consumed but its frame is not yet in the render path
    frame_pending: bool,
    seek_start_time: f64,
    /// Notifications raised by the last update, not yet delivered
    pending: Vec<PlayerEvent>,
}

impl PlaybackController {
    /// Create the engine for `source` and start loading it
    pub fn new(source: &MediaSource, format: &MediaFormat, factory: &dyn EngineFactory) -> Result<Self> {
        let mut render_path = RenderPath::for_format(format.is_hardware_accelerated());

        let events = Arc::new(EngineEventQueue::new());
        let notify: Weak<dyn EngineNotify> = Arc::downgrade(&events) as Weak<dyn EngineNotify>;
        let mut attributes = EngineAttributes::new(notify);

        if !render_path.initialize(&mut attributes) {
            return Err(PlayerError::Renderer("Failed to initialize render path".to_string()));
        }

        if let Some(endpoint) = format.audio_device().filter(|id| !id.is_empty()) {
            warn!("Requested non-default audio endpoint '{}'", endpoint);
            attributes.audio_endpoint_id = Some(endpoint.to_string());
        }

        let flags = EngineCreateFlags {
            real_time: true,
            force_mute: !format.is_audio_enabled(),
            audio_only: format.is_audio_only(),
        };

        let engine = factory.create_engine(flags, attributes, source)?;
        engine.load()?;
        info!(
            "Loading {} ({} render path)",
            source,
            if render_path.is_hardware_accelerated() { "shared texture" } else { "bitmap" }
        );

        Ok(Self {
            engine: Some(engine),
            render_path: Some(render_path),
            events,
            duration: 0.0,
            size: (0, 0),
            has_metadata: false,
            has_new_frame: AtomicBool::new(false),
            frame_pending: false,
            seek_start_time: 0.0,
            pending: Vec::new(),
        })
    }

    pub fn play(&self) {
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.play() {
                warn!("Play failed: {}", e);
            }
        }
    }

    pub fn pause(&self) {
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.pause() {
                warn!("Pause failed: {}", e);
            }
        }
    }

    pub fn toggle_playback(&self) {
        if self.is_paused() {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Change the rate; false when the engine does not support it
    pub fn set_playback_rate(&self, rate: f64) -> bool {
        let Some(engine) = &self.engine else {
            return false;
        };
        if !self.is_playback_rate_supported(rate) {
            debug!("Playback rate {} not supported", rate);
            return false;
        }
        match engine.set_playback_rate(rate) {
            Ok(()) => true,
            Err(e) => {
                debug!("Playback rate {} rejected: {}", rate, e);
                false
            }
        }
    }

    pub fn playback_rate(&self) -> f64 {
        self.engine.as_ref().map(|e| e.playback_rate()).unwrap_or(1.0)
    }

    pub fn is_playback_rate_supported(&self, rate: f64) -> bool {
        self.engine
            .as_ref()
            .and_then(|e| e.extended().map(|ex| ex.is_playback_rate_supported(rate)))
            .unwrap_or(false)
    }

    /// Applied on the engine worker; returns once the engine has it
    pub fn set_muted(&self, muted: bool) {
        if let Some(engine) = &self.engine {
            let engine = Arc::clone(engine);
            if let Err(e) = affinity::run_synchronous(move || engine.set_muted(muted)) {
                warn!("Failed to set mute: {}", e);
            }
        }
    }

    pub fn is_muted(&self) -> bool {
        self.engine.as_ref().map(|e| e.is_muted()).unwrap_or(false)
    }

    /// Applied on the engine worker; returns once the engine has it
    pub fn set_volume(&self, volume: f32) {
        if let Some(engine) = &self.engine {
            let engine = Arc::clone(engine);
            let volume = unit_interval(volume as f64);
            if let Err(e) = affinity::run_synchronous(move || engine.set_volume(volume)) {
                warn!("Failed to set volume: {}", e);
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.engine.as_ref().map(|e| e.volume() as f32).unwrap_or(1.0)
    }

    pub fn set_loop(&self, looping: bool) {
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.set_loop(looping) {
                warn!("Failed to set loop: {}", e);
            }
        }
    }

    pub fn is_looping(&self) -> bool {
        self.engine.as_ref().map(|e| e.is_looping()).unwrap_or(false)
    }

    pub fn seek_to_seconds(&self, seconds: f64, approximate: bool) {
        let Some(engine) = &self.engine else {
            return;
        };
        let result = match engine.extended() {
            Some(ex) => {
                let mode = if approximate { SeekMode::Approximate } else { SeekMode::Normal };
                ex.set_current_time_ex(seconds, mode)
            }
            None => engine.set_current_time(seconds),
        };
        if let Err(e) = result {
            warn!("Seek to {:.3}s failed: {}", seconds, e);
        }
    }

    /// Seek to a fraction of the duration; nothing happens while it is unknown
    pub fn seek_to_percentage(&self, percentage: f64, approximate: bool) {
        if self.duration > 0.0 {
            self.seek_to_seconds(unit_interval(percentage) * self.duration, approximate);
        }
    }

    pub fn frame_step(&self, delta: i32) {
        let Some(ex) = self.engine.as_ref().and_then(|e| e.extended()) else {
            return;
        };
        if let Err(e) = ex.frame_step(delta > 0) {
            warn!("Frame step failed: {}", e);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.engine.as_ref().map(|e| e.is_ended()).unwrap_or(true)
    }

    pub fn is_playing(&self) -> bool {
        self.engine.as_ref().map(|e| !e.is_paused()).unwrap_or(false)
    }

    pub fn is_paused(&self) -> bool {
        self.engine.as_ref().map(|e| e.is_paused()).unwrap_or(false)
    }

    pub fn is_seeking(&self) -> bool {
        self.engine.as_ref().map(|e| e.is_seeking()).unwrap_or(false)
    }

    /// Set at the first metadata load and never cleared
    pub fn is_ready(&self) -> bool {
        self.has_metadata
    }

    pub fn has_audio(&self) -> bool {
        self.engine.as_ref().map(|e| e.has_audio()).unwrap_or(false)
    }

    pub fn has_video(&self) -> bool {
        self.engine.as_ref().map(|e| e.has_video()).unwrap_or(false)
    }

    /// Current position, or -1 without an engine
    pub fn position_in_seconds(&self) -> f64 {
        self.engine.as_ref().map(|e| e.current_time()).unwrap_or(-1.0)
    }

    pub fn duration_in_seconds(&self) -> f64 {
        self.duration
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_size(self.size)
    }

    pub fn is_hardware_accelerated(&self) -> bool {
        self.render_path
            .as_ref()
            .map(RenderPath::is_hardware_accelerated)
            .unwrap_or(false)
    }

    /// Whether a frame arrived since the last surface or lease request
    pub fn check_new_frame(&self) -> bool {
        self.has_new_frame.load(Ordering::Acquire)
    }

    /// CPU pixels of the last frame (bitmap path only)
    pub fn surface(&self) -> Option<Arc<Surface>> {
        self.has_new_frame.store(false, Ordering::Release);
        self.render_path.as_ref().and_then(RenderPath::surface)
    }

    pub fn frame_lease(&self) -> FrameLease {
        self.has_new_frame.store(false, Ordering::Release);
        self.render_path
            .as_ref()
            .map(RenderPath::frame_lease)
            .unwrap_or(FrameLease::Empty)
    }

    /// Run one tick: materialize a new frame, then apply queued engine events
    ///
    /// A frame the render path could not take (no render target yet, or the
    /// shared texture is leased) is retried on later ticks until it lands.
    /// Notifications raised here are collected for [`Self::take_notifications`].
    /// Always returns false.
    pub fn update(&mut self) -> bool {
        if let (Some(engine), Some(path)) = (&self.engine, self.render_path.as_mut()) {
            if engine.has_video() {
                if engine.on_video_stream_tick().is_some() {
                    self.frame_pending = true;
                }
                if self.frame_pending && path.process_frame(engine.as_ref()) {
                    self.frame_pending = false;
                    self.has_new_frame.store(true, Ordering::Release);
                }
            }
        }

        for queued in self.events.drain() {
            self.process_event(queued);
        }
        false
    }

    /// Notifications raised since the last call, in emission order
    pub fn take_notifications(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.pending)
    }

    fn process_event(&mut self, queued: QueuedEvent) {
        debug!("{}", queued.event);
        let Some(engine) = self.engine.clone() else {
            return;
        };

        match queued.event {
            EngineEvent::DurationChange => {
                self.duration = known_duration(engine.duration());
            }
            EngineEvent::LoadedMetadata => {
                self.duration = known_duration(engine.duration());
                if let Some(size) = engine.native_video_size() {
                    self.size = size;
                    if let Some(path) = self.render_path.as_mut() {
                        if !path.initialize_render_target(size) {
                            warn!("Failed to create {}x{} render target", size.0, size.1);
                        }
                    }
                    info!("Metadata loaded: {}x{}, {:.2}s", size.0, size.1, self.duration);
                } else {
                    info!("Metadata loaded: no video, {:.2}s", self.duration);
                }
                self.has_metadata = true;
                self.pending.push(PlayerEvent::Ready);
            }
            EngineEvent::Play => self.pending.push(PlayerEvent::Play),
            EngineEvent::Pause => self.pending.push(PlayerEvent::Pause),
            EngineEvent::Ended => self.pending.push(PlayerEvent::Complete),
            EngineEvent::Seeking => {
                self.pending.push(PlayerEvent::SeekStart);
                self.seek_start_time = self.position_in_seconds();
            }
            EngineEvent::Seeked => {
                self.pending.push(PlayerEvent::SeekEnd);
                // The engine raises nothing when it loops; a seek that starts
                // and lands at zero is taken as one. This can misfire on a
                // manual seek to the start.
                if self.is_looping() {
                    let now = self.position_in_seconds();
                    if now < LOOP_POSITION_THRESHOLD && now - self.seek_start_time < LOOP_DELTA_THRESHOLD {
                        self.pending.push(PlayerEvent::Complete);
                    }
                }
            }
            EngineEvent::BufferingStarted => self.pending.push(PlayerEvent::BufferingStart),
            EngineEvent::BufferingEnded => self.pending.push(PlayerEvent::BufferingEnd),
            EngineEvent::Error => {
                let code = ErrorCode::from_native(queued.param1);
                warn!("Engine error: {} (native {}, {})", code, queued.param1, queued.param2);
                self.pending.push(PlayerEvent::Error(code));
            }
            _ => {}
        }
    }
}

fn known_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.render_path.take();
        self.has_new_frame.store(false, Ordering::Release);

        if let Some(engine) = self.engine.take() {
            if let Err(e) = affinity::run_synchronous(move || engine.shutdown()) {
                warn!("Engine shutdown failed: {}", e);
            }
        }
    }
}
