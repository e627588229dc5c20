//! Synthetic test-pattern engine
//!
//! Behaves like a native engine (own clock, event stream, frame transfer)
//! without touching any media file. Every frame is a gradient whose blue
//! channel encodes the frame index, so consumers can check exactly which
//! frame they received. A [`SyntheticControl`] handle lets tests and demos
//! move the clock, inject frames and emit arbitrary engine events from any
//! thread.

use super::clock::PlaybackClock;
use super::{
    EngineAttributes, EngineCreateFlags, EngineEvent, EngineFactory, FrameView, MediaEngine,
    MediaEngineEx, MediaSource, SeekMode, VideoFrameTarget,
};
use crate::utils::error::{PlayerError, Result};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

/// Extra bytes per row in transferred frames, so targets must honor stride
const ROW_PADDING: usize = 16;

/// Shape of the synthetic media
#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    /// Reported duration in seconds
    pub duration: f64,

    /// Native video size
    pub size: (u32, u32),

    pub frame_rate: f64,
    pub has_audio: bool,
    pub has_video: bool,

    /// Emit the loading sequence (DurationChange, LoadedMetadata, ...) from `load`
    pub emit_load_events: bool,

    /// Expose the extended interface (rate queries, approximate seek, frame step)
    pub extended: bool,

    /// Inclusive playback rate range the engine accepts
    pub supported_rates: (f64, f64),
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            duration: 10.0,
            size: (320, 240),
            frame_rate: 30.0,
            has_audio: true,
            has_video: true,
            emit_load_events: true,
            extended: true,
            supported_rates: (0.25, 4.0),
        }
    }
}

#[derive(Debug)]
struct SyntheticState {
    clock: PlaybackClock,
    duration: f64,
    loaded: bool,
    paused: bool,
    ended: bool,
    seeking: bool,
    muted: bool,
    volume: f64,
    looping: bool,
    /// Frames injected on top of the clock-derived index
    injected_frames: u64,
    last_presented: Option<u64>,
    shut_down: bool,
    flags: Option<EngineCreateFlags>,
    seek_log: Vec<(f64, Option<SeekMode>)>,
    frame_steps: Vec<bool>,
    audio_thread: Option<String>,
}

struct SyntheticShared {
    options: SyntheticOptions,
    attributes: Mutex<Option<EngineAttributes>>,
    state: Mutex<SyntheticState>,
}

impl SyntheticShared {
    fn emit(&self, events: &[EngineEvent]) {
        let attributes = self.attributes.lock().clone();
        if let Some(attributes) = attributes {
            for event in events {
                attributes.notify(*event, 0, 0);
            }
        }
    }

    fn emit_with(&self, event: EngineEvent, param1: usize, param2: u32) {
        let attributes = self.attributes.lock().clone();
        if let Some(attributes) = attributes {
            attributes.notify(event, param1, param2);
        }
    }

    fn frame_index(&self, state: &SyntheticState) -> u64 {
        let position = state.clock.position().min(state.duration).max(0.0);
        (position * self.options.frame_rate).floor() as u64 + state.injected_frames
    }

    /// Handle reaching the end of the media; returns the events to emit
    fn advance(&self, state: &mut SyntheticState) -> Vec<EngineEvent> {
        if !state.clock.is_running() || state.duration <= 0.0 {
            return Vec::new();
        }
        if state.clock.position() < state.duration {
            return Vec::new();
        }

        if state.looping {
            state.clock.set_position(0.0);
            state.last_presented = None;
            vec![EngineEvent::Seeking, EngineEvent::Seeked]
        } else {
            state.clock.pause();
            state.clock.set_position(state.duration);
            state.paused = true;
            state.ended = true;
            vec![EngineEvent::Pause, EngineEvent::Ended]
        }
    }

    fn seek(&self, seconds: f64, mode: Option<SeekMode>) {
        {
            let mut state = self.state.lock();
            state.seeking = true;
            state.seek_log.push((seconds, mode));
        }
        self.emit(&[EngineEvent::Seeking]);
        {
            let mut state = self.state.lock();
            let target = seconds.clamp(0.0, state.duration.max(0.0));
            state.clock.set_position(target);
            state.ended = false;
            state.seeking = false;
            state.last_presented = None;
        }
        self.emit(&[EngineEvent::Seeked]);
    }
}

/// Gradient pixel (BGRA) for frame `frame` at (x, y) of a `width` x `height` image
pub fn pattern_pixel(x: u32, y: u32, width: u32, height: u32, frame: u64) -> [u8; 4] {
    let r = (x * 255 / width.max(1)) as u8;
    let g = (y * 255 / height.max(1)) as u8;
    let b = (frame % 256) as u8;
    [b, g, r, 255]
}

/// Engine producing the synthetic pattern
pub struct SyntheticEngine {
    shared: Arc<SyntheticShared>,
}

impl MediaEngine for SyntheticEngine {
    fn load(&self) -> Result<()> {
        let (duration, emit) = {
            let mut state = self.shared.state.lock();
            state.loaded = true;
            (state.duration, self.shared.options.emit_load_events)
        };
        debug!("Synthetic engine loaded: {:.2}s", duration);

        if emit {
            self.shared.emit(&[
                EngineEvent::LoadStart,
                EngineEvent::DurationChange,
                EngineEvent::LoadedMetadata,
                EngineEvent::LoadedData,
                EngineEvent::CanPlay,
                EngineEvent::CanPlayThrough,
            ]);
        }
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let restarted = {
            let mut state = self.shared.state.lock();
            let restart = state.ended;
            if restart {
                state.clock.set_position(0.0);
                state.ended = false;
                state.last_presented = None;
            }
            state.paused = false;
            state.clock.start();
            restart
        };
        if restarted {
            self.shared.emit(&[EngineEvent::Seeking, EngineEvent::Seeked]);
        }
        self.shared.emit(&[EngineEvent::Play, EngineEvent::Playing]);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.paused = true;
            state.clock.pause();
        }
        self.shared.emit(&[EngineEvent::Pause]);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    fn is_ended(&self) -> bool {
        let events = {
            let mut state = self.shared.state.lock();
            self.shared.advance(&mut state)
        };
        self.shared.emit(&events);
        self.shared.state.lock().ended
    }

    fn is_seeking(&self) -> bool {
        self.shared.state.lock().seeking
    }

    fn has_audio(&self) -> bool {
        self.shared.options.has_audio
    }

    fn has_video(&self) -> bool {
        self.shared.options.has_video
            && !self
                .shared
                .state
                .lock()
                .flags
                .map(|f| f.audio_only)
                .unwrap_or(false)
    }

    fn playback_rate(&self) -> f64 {
        self.shared.state.lock().clock.rate()
    }

    fn set_playback_rate(&self, rate: f64) -> Result<()> {
        let (min, max) = self.shared.options.supported_rates;
        if !(min..=max).contains(&rate) {
            return Err(PlayerError::InvalidInput(format!("Unsupported rate {}", rate)));
        }
        self.shared.state.lock().clock.set_rate(rate);
        self.shared.emit(&[EngineEvent::RateChange]);
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.shared.state.lock().muted
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.muted = muted;
            state.audio_thread = thread::current().name().map(str::to_string);
        }
        self.shared.emit(&[EngineEvent::VolumeChange]);
        Ok(())
    }

    fn volume(&self) -> f64 {
        self.shared.state.lock().volume
    }

    fn set_volume(&self, volume: f64) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.volume = volume.clamp(0.0, 1.0);
            state.audio_thread = thread::current().name().map(str::to_string);
        }
        self.shared.emit(&[EngineEvent::VolumeChange]);
        Ok(())
    }

    fn is_looping(&self) -> bool {
        self.shared.state.lock().looping
    }

    fn set_loop(&self, looping: bool) -> Result<()> {
        self.shared.state.lock().looping = looping;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        let events = {
            let mut state = self.shared.state.lock();
            self.shared.advance(&mut state)
        };
        self.shared.emit(&events);
        let state = self.shared.state.lock();
        state.clock.position().min(state.duration.max(0.0))
    }

    fn set_current_time(&self, seconds: f64) -> Result<()> {
        self.shared.seek(seconds, None);
        Ok(())
    }

    fn duration(&self) -> f64 {
        self.shared.state.lock().duration
    }

    fn native_video_size(&self) -> Option<(u32, u32)> {
        if self.has_video() {
            Some(self.shared.options.size)
        } else {
            None
        }
    }

    fn on_video_stream_tick(&self) -> Option<i64> {
        let events = {
            let mut state = self.shared.state.lock();
            self.shared.advance(&mut state)
        };
        self.shared.emit(&events);

        let mut state = self.shared.state.lock();
        if !state.loaded || state.shut_down {
            return None;
        }
        let index = self.shared.frame_index(&state);
        if state.last_presented == Some(index) {
            return None;
        }
        state.last_presented = Some(index);
        let pts = index as f64 / self.shared.options.frame_rate * 10_000_000.0;
        Some(pts as i64)
    }

    fn transfer_video_frame(&self, target: &mut dyn VideoFrameTarget) -> Result<()> {
        let frame = {
            let state = self.shared.state.lock();
            state.last_presented.unwrap_or_else(|| self.shared.frame_index(&state))
        };

        let (width, height) = target.target_size();
        if width == 0 || height == 0 {
            return Err(PlayerError::InvalidInput("Empty transfer target".to_string()));
        }

        let stride = width as usize * 4 + ROW_PADDING;
        let mut data = vec![0u8; stride * height as usize];
        for y in 0..height {
            let row = &mut data[y as usize * stride..];
            for x in 0..width {
                let offset = x as usize * 4;
                row[offset..offset + 4].copy_from_slice(&pattern_pixel(x, y, width, height, frame));
            }
        }

        target.write_frame(FrameView {
            width,
            height,
            stride,
            data: &data,
        })
    }

    fn extended(&self) -> Option<&dyn MediaEngineEx> {
        if self.shared.options.extended {
            Some(self)
        } else {
            None
        }
    }

    fn shutdown(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.shut_down = true;
        state.clock.pause();
        drop(state);
        self.shared.attributes.lock().take();
        Ok(())
    }
}

impl MediaEngineEx for SyntheticEngine {
    fn is_playback_rate_supported(&self, rate: f64) -> bool {
        let (min, max) = self.shared.options.supported_rates;
        (min..=max).contains(&rate)
    }

    fn set_current_time_ex(&self, seconds: f64, mode: SeekMode) -> Result<()> {
        self.shared.seek(seconds, Some(mode));
        Ok(())
    }

    fn frame_step(&self, forward: bool) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.frame_steps.push(forward);
            let step = 1.0 / self.shared.options.frame_rate;
            let position = state.clock.position();
            let target = if forward { position + step } else { (position - step).max(0.0) };
            let limit = state.duration;
            state.clock.set_position(target.min(limit));
        }
        self.shared.emit(&[EngineEvent::FrameStepCompleted]);
        Ok(())
    }
}

/// Factory for [`SyntheticEngine`]s sharing one control handle
pub struct SyntheticEngineFactory {
    shared: Arc<SyntheticShared>,
}

impl SyntheticEngineFactory {
    pub fn new(options: SyntheticOptions) -> Self {
        let state = SyntheticState {
            clock: PlaybackClock::new(),
            duration: options.duration,
            loaded: false,
            paused: true,
            ended: false,
            seeking: false,
            muted: false,
            volume: 1.0,
            looping: false,
            injected_frames: 0,
            last_presented: None,
            shut_down: false,
            flags: None,
            seek_log: Vec::new(),
            frame_steps: Vec::new(),
            audio_thread: None,
        };
        Self {
            shared: Arc::new(SyntheticShared {
                options,
                attributes: Mutex::new(None),
                state: Mutex::new(state),
            }),
        }
    }

    /// Handle to the engine this factory creates
    pub fn control(&self) -> SyntheticControl {
        SyntheticControl {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SyntheticEngineFactory {
    fn default() -> Self {
        Self::new(SyntheticOptions::default())
    }
}

impl EngineFactory for SyntheticEngineFactory {
    fn create_engine(
        &self,
        flags: EngineCreateFlags,
        attributes: EngineAttributes,
        source: &MediaSource,
    ) -> Result<Arc<dyn MediaEngine>> {
        debug!("Creating synthetic engine for {} ({:?})", source, flags);
        {
            let mut state = self.shared.state.lock();
            state.flags = Some(flags);
            state.muted = flags.force_mute;
        }
        *self.shared.attributes.lock() = Some(attributes);
        Ok(Arc::new(SyntheticEngine {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Scripting handle for a synthetic engine
#[derive(Clone)]
pub struct SyntheticControl {
    shared: Arc<SyntheticShared>,
}

impl SyntheticControl {
    /// Deliver an engine event as if the engine raised it on this thread
    pub fn emit(&self, event: EngineEvent) {
        self.shared.emit(&[event]);
    }

    /// Deliver an event with explicit parameters
    pub fn emit_with(&self, event: EngineEvent, param1: usize, param2: u32) {
        self.shared.emit_with(event, param1, param2);
    }

    /// Move the clock without raising seek events
    pub fn set_position(&self, seconds: f64) {
        self.shared.state.lock().clock.set_position(seconds);
    }

    pub fn set_duration(&self, seconds: f64) {
        self.shared.state.lock().duration = seconds;
    }

    /// Make a new frame available on the next stream tick
    pub fn push_frame(&self) {
        self.shared.state.lock().injected_frames += 1;
    }

    /// Frame index the next transfer will draw
    pub fn current_frame(&self) -> u64 {
        let state = self.shared.state.lock();
        state.last_presented.unwrap_or_else(|| self.shared.frame_index(&state))
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.state.lock().loaded
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Flags the engine was created with
    pub fn flags(&self) -> Option<EngineCreateFlags> {
        self.shared.state.lock().flags
    }

    /// Attributes the engine was created with
    pub fn attributes(&self) -> Option<EngineAttributes> {
        self.shared.attributes.lock().clone()
    }

    /// Every seek so far: target and mode (`None` for a plain seek)
    pub fn seek_log(&self) -> Vec<(f64, Option<SeekMode>)> {
        self.shared.state.lock().seek_log.clone()
    }

    /// Every frame step so far (`true` for forward)
    pub fn frame_steps(&self) -> Vec<bool> {
        self.shared.state.lock().frame_steps.clone()
    }

    /// Name of the thread that last changed volume or mute
    pub fn audio_thread(&self) -> Option<String> {
        self.shared.state.lock().audio_thread.clone()
    }
}
