//! FFmpeg-backed media engine
//!
//! Each engine owns one decode thread. The thread opens the source, decodes
//! video into BGRA frames queued by presentation time and audio into the cpal
//! sink, and presents frames against a wall clock. Everything observable
//! from outside (paused, seeking, duration, the current frame) lives behind
//! one mutex; control calls post commands to the thread and update that
//! state immediately so queries reflect them at once.

use super::audio::{AudioControls, AudioSink};
use super::clock::PlaybackClock;
use super::{
    native_error, EngineAttributes, EngineCreateFlags, EngineEvent, EngineFactory, FrameView,
    MediaEngine, MediaEngineEx, MediaSource, SeekMode, VideoFrameTarget,
};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, error, info, trace, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Decoded frames kept ahead of the clock
const VIDEO_QUEUE_DEPTH: usize = 6;

/// Idle wait between decode loop iterations
const IDLE_WAIT: Duration = Duration::from_millis(4);

/// Interval between TimeUpdate notifications while playing
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

/// Playback rates the engine accepts
const SUPPORTED_RATES: (f64, f64) = (0.25, 4.0);

/// Units per second of container-level timestamps
const AV_TIME_BASE: f64 = 1_000_000.0;

static FFMPEG_INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();

/// Initialize the FFmpeg libraries once per process
///
/// A failure is logged the first time only; later calls return the same
/// error silently.
fn ensure_initialized() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(|| match ffmpeg::init() {
            Ok(()) => {
                ffmpeg::log::set_level(ffmpeg::log::Level::Warning);
                debug!("FFmpeg initialized");
                Ok(())
            }
            Err(e) => {
                error!("FFmpeg initialization failed: {}", e);
                Err(e.to_string())
            }
        })
        .clone()
        .engine_err("FFmpeg unavailable")
}

static LIVE_ENGINES: Mutex<usize> = parking_lot::const_mutex(0);

/// Keeps FFmpeg networking up while any engine is alive
struct NetworkGuard;

impl NetworkGuard {
    fn acquire() -> Self {
        let mut live = LIVE_ENGINES.lock();
        if *live == 0 {
            format::network::init();
            debug!("FFmpeg network support started");
        }
        *live += 1;
        NetworkGuard
    }
}

impl Drop for NetworkGuard {
    fn drop(&mut self) {
        let mut live = LIVE_ENGINES.lock();
        *live = live.saturating_sub(1);
        if *live == 0 {
            format::network::deinit();
            debug!("FFmpeg network support stopped");
        }
    }
}

/// One BGRA frame at native size
struct DecodedFrame {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
    /// Presentation time in seconds
    pts: f64,
}

impl DecodedFrame {
    fn from_video(frame: &ffmpeg::frame::Video, pts: f64) -> Self {
        let stride = frame.stride(0);
        let height = frame.height();
        let len = stride * height as usize;
        Self {
            width: frame.width(),
            height,
            stride,
            data: frame.data(0)[..len].to_vec(),
            pts,
        }
    }

    fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.width,
            height: self.height,
            stride: self.stride,
            data: &self.data,
        }
    }
}

/// State visible to engine queries
struct Status {
    clock: PlaybackClock,
    paused: bool,
    ended: bool,
    seeking: bool,
    looping: bool,
    duration: f64,
    has_audio: bool,
    has_video: bool,
    size: Option<(u32, u32)>,
    current: Option<DecodedFrame>,
    frame_serial: u64,
    presented_serial: u64,
}

enum Command {
    Play,
    Pause,
    Seek { seconds: f64, mode: SeekMode },
    Step { forward: bool },
    Shutdown,
}

struct Shared {
    attributes: EngineAttributes,
    flags: EngineCreateFlags,
    source: MediaSource,
    status: Mutex<Status>,
    audio: Arc<AudioControls>,
}

impl Shared {
    fn notify(&self, event: EngineEvent) {
        trace!("{} -> {}", self.source, event);
        self.attributes.notify(event, 0, 0);
    }

    fn notify_error(&self, code: usize, detail: &str) {
        warn!("Engine error {} for {}: {}", code, self.source, detail);
        self.attributes.notify(EngineEvent::Error, code, 0);
    }
}

/// Media engine decoding through FFmpeg
pub struct FfmpegEngine {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    receiver: Mutex<Option<Receiver<Command>>>,
    decode_thread: Mutex<Option<JoinHandle<()>>>,
    _network: NetworkGuard,
}

impl FfmpegEngine {
    fn new(flags: EngineCreateFlags, attributes: EngineAttributes, source: MediaSource) -> Self {
        let (commands, receiver) = unbounded();
        let status = Status {
            clock: PlaybackClock::new(),
            paused: true,
            ended: false,
            seeking: false,
            looping: false,
            duration: 0.0,
            has_audio: false,
            has_video: false,
            size: None,
            current: None,
            frame_serial: 0,
            presented_serial: 0,
        };

        Self {
            shared: Arc::new(Shared {
                attributes,
                flags,
                source,
                status: Mutex::new(status),
                audio: Arc::new(AudioControls::new(flags.force_mute)),
            }),
            commands,
            receiver: Mutex::new(Some(receiver)),
            decode_thread: Mutex::new(None),
            _network: NetworkGuard::acquire(),
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PlayerError::Engine("Decode thread has exited".to_string()))
    }

    fn stop_thread(&self) {
        if let Some(handle) = self.decode_thread.lock().take() {
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                error!("Decode thread for {} panicked", self.shared.source);
            }
        }
    }
}

impl MediaEngine for FfmpegEngine {
    fn load(&self) -> Result<()> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| PlayerError::Engine("Source already loaded".to_string()))?;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("ffmpeg-decode".to_string())
            .spawn(move || {
                shared.notify(EngineEvent::LoadStart);
                match Decoder::open(Arc::clone(&shared)) {
                    Ok(mut decoder) => decoder.run(&receiver),
                    Err(e) => {
                        let code = match e {
                            PlayerError::UnsupportedFormat(_) | PlayerError::NotFound(_) => {
                                native_error::SRC_NOT_SUPPORTED
                            }
                            _ if shared.source.is_url() => native_error::NETWORK,
                            _ => native_error::DECODE,
                        };
                        shared.notify_error(code, &e.to_string());
                    }
                }
            })
            .engine_err("Failed to spawn decode thread")?;

        *self.decode_thread.lock() = Some(handle);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        self.shared.status.lock().paused = false;
        self.send(Command::Play)
    }

    fn pause(&self) -> Result<()> {
        self.shared.status.lock().paused = true;
        self.send(Command::Pause)
    }

    fn is_paused(&self) -> bool {
        self.shared.status.lock().paused
    }

    fn is_ended(&self) -> bool {
        self.shared.status.lock().ended
    }

    fn is_seeking(&self) -> bool {
        self.shared.status.lock().seeking
    }

    fn has_audio(&self) -> bool {
        self.shared.status.lock().has_audio
    }

    fn has_video(&self) -> bool {
        self.shared.status.lock().has_video
    }

    fn playback_rate(&self) -> f64 {
        self.shared.status.lock().clock.rate()
    }

    fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if !self.is_playback_rate_supported(rate) {
            return Err(PlayerError::InvalidInput(format!("Unsupported playback rate {}", rate)));
        }
        self.shared.status.lock().clock.set_rate(rate);
        self.shared.notify(EngineEvent::RateChange);
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.shared.audio.is_muted()
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.shared.audio.set_muted(muted);
        self.shared.notify(EngineEvent::VolumeChange);
        Ok(())
    }

    fn volume(&self) -> f64 {
        self.shared.audio.volume() as f64
    }

    fn set_volume(&self, volume: f64) -> Result<()> {
        self.shared.audio.set_volume(volume as f32);
        self.shared.notify(EngineEvent::VolumeChange);
        Ok(())
    }

    fn is_looping(&self) -> bool {
        self.shared.status.lock().looping
    }

    fn set_loop(&self, looping: bool) -> Result<()> {
        self.shared.status.lock().looping = looping;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        let status = self.shared.status.lock();
        let position = status.clock.position();
        if status.duration > 0.0 {
            position.min(status.duration)
        } else {
            position
        }
    }

    fn set_current_time(&self, seconds: f64) -> Result<()> {
        self.set_current_time_ex(seconds, SeekMode::Normal)
    }

    fn duration(&self) -> f64 {
        self.shared.status.lock().duration
    }

    fn native_video_size(&self) -> Option<(u32, u32)> {
        self.shared.status.lock().size
    }

    fn on_video_stream_tick(&self) -> Option<i64> {
        let mut status = self.shared.status.lock();
        if status.frame_serial == status.presented_serial {
            return None;
        }
        status.presented_serial = status.frame_serial;
        status
            .current
            .as_ref()
            .map(|frame| (frame.pts * 10_000_000.0) as i64)
    }

    fn transfer_video_frame(&self, target: &mut dyn VideoFrameTarget) -> Result<()> {
        let status = self.shared.status.lock();
        let frame = status
            .current
            .as_ref()
            .ok_or_else(|| PlayerError::Engine("No frame available".to_string()))?;

        let (width, height) = target.target_size();
        if (width, height) == (frame.width, frame.height) {
            return target.write_frame(frame.view());
        }

        let scaled = scale_nearest(frame, width, height);
        target.write_frame(FrameView {
            width,
            height,
            stride: width as usize * 4,
            data: &scaled,
        })
    }

    fn extended(&self) -> Option<&dyn MediaEngineEx> {
        Some(self)
    }

    fn shutdown(&self) -> Result<()> {
        self.stop_thread();
        self.shared.audio.set_running(false);
        info!("Engine for {} shut down", self.shared.source);
        Ok(())
    }
}

impl MediaEngineEx for FfmpegEngine {
    fn is_playback_rate_supported(&self, rate: f64) -> bool {
        (SUPPORTED_RATES.0..=SUPPORTED_RATES.1).contains(&rate)
    }

    fn set_current_time_ex(&self, seconds: f64, mode: SeekMode) -> Result<()> {
        self.shared.status.lock().seeking = true;
        self.send(Command::Seek { seconds, mode })
    }

    fn frame_step(&self, forward: bool) -> Result<()> {
        self.send(Command::Step { forward })
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Resize a BGRA frame by nearest-neighbor sampling
fn scale_nearest(frame: &DecodedFrame, width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0u8; width as usize * height as usize * 4];
    if frame.width == 0 || frame.height == 0 {
        return out;
    }
    for y in 0..height {
        let sy = (y as u64 * frame.height as u64 / height.max(1) as u64) as usize;
        let src_row = &frame.data[sy * frame.stride..];
        let dst_row = &mut out[y as usize * width as usize * 4..];
        for x in 0..width {
            let sx = (x as u64 * frame.width as u64 / width.max(1) as u64) as usize;
            dst_row[x as usize * 4..x as usize * 4 + 4].copy_from_slice(&src_row[sx * 4..sx * 4 + 4]);
        }
    }
    out
}

struct VideoStream {
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    index: usize,
    time_base: f64,
    frame_interval: f64,
}

struct AudioStream {
    decoder: ffmpeg::codec::decoder::Audio,
    resampler: Option<ffmpeg::software::resampling::Context>,
    index: usize,
}

/// Decode loop state, owned by the decode thread
struct Decoder {
    shared: Arc<Shared>,
    input: format::context::Input,
    video: Option<VideoStream>,
    audio: Option<AudioStream>,
    sink: Option<AudioSink>,
    queue: VecDeque<DecodedFrame>,
    /// Frames before this time are dropped after a precise seek
    skip_until: Option<f64>,
    eof: bool,
    buffering: bool,
    announced_data: bool,
    last_time_update: Instant,
}

impl Decoder {
    fn open(shared: Arc<Shared>) -> Result<Self> {
        let location = shared.source.location();
        let input = format::input(&location).map_err(|e| match e {
            ffmpeg::Error::InvalidData => PlayerError::UnsupportedFormat(location.clone()),
            other => PlayerError::Engine(format!("Failed to open {}: {}", location, other)),
        })?;

        let video = if shared.flags.audio_only {
            None
        } else {
            open_video_stream(&input)?
        };
        let audio = open_audio_stream(&input)?;

        if video.is_none() && audio.is_none() {
            return Err(PlayerError::UnsupportedFormat(format!("{} has no playable streams", location)));
        }

        let sink = if audio.is_some() && !shared.flags.force_mute {
            match AudioSink::open(shared.attributes.audio_endpoint_id.as_deref(), Arc::clone(&shared.audio)) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    warn!("Playing {} without audio output: {}", location, e);
                    None
                }
            }
        } else {
            None
        };

        let duration = if input.duration() > 0 {
            input.duration() as f64 / AV_TIME_BASE
        } else {
            0.0
        };

        {
            let mut status = shared.status.lock();
            status.duration = duration;
            status.has_audio = audio.is_some();
            status.has_video = video.is_some();
            status.size = video
                .as_ref()
                .map(|v| (v.decoder.width(), v.decoder.height()));
        }

        info!(
            "Opened {}: {:.2}s, video {:?}, audio {}",
            location,
            duration,
            video.as_ref().map(|v| (v.decoder.width(), v.decoder.height())),
            audio.is_some()
        );

        shared.notify(EngineEvent::DurationChange);
        shared.notify(EngineEvent::LoadedMetadata);

        Ok(Self {
            shared,
            input,
            video,
            audio,
            sink,
            queue: VecDeque::with_capacity(VIDEO_QUEUE_DEPTH),
            skip_until: None,
            eof: false,
            buffering: false,
            announced_data: false,
            last_time_update: Instant::now(),
        })
    }

    fn run(&mut self, commands: &Receiver<Command>) {
        loop {
            let wait = if self.wants_input() { Duration::ZERO } else { IDLE_WAIT };
            match commands.recv_timeout(wait) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.wants_input() {
                self.read_packet();
            }

            self.present();
            self.check_end();
        }
        debug!("Decode thread for {} exiting", self.shared.source);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Play => {
                let restart = {
                    let mut status = self.shared.status.lock();
                    status.paused = false;
                    status.ended
                };
                if restart {
                    self.seek(0.0, SeekMode::Normal);
                }
                self.shared.status.lock().clock.start();
                self.shared.audio.set_running(true);
                self.shared.notify(EngineEvent::Play);
                self.shared.notify(EngineEvent::Playing);
            }
            Command::Pause => {
                {
                    let mut status = self.shared.status.lock();
                    status.paused = true;
                    status.clock.pause();
                }
                self.shared.audio.set_running(false);
                self.shared.notify(EngineEvent::Pause);
            }
            Command::Seek { seconds, mode } => self.seek(seconds, mode),
            Command::Step { forward } => self.step(forward),
            Command::Shutdown => {}
        }
    }

    fn wants_input(&self) -> bool {
        if self.eof {
            return false;
        }
        match self.video {
            Some(_) => self.queue.len() < VIDEO_QUEUE_DEPTH,
            None => self.sink.as_ref().map(|s| s.vacant() > 4096).unwrap_or(true),
        }
    }

    fn read_packet(&mut self) {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {
                let index = packet.stream();
                if let Some(video) = self.video.as_mut() {
                    if video.index == index {
                        if let Err(e) = video.decoder.send_packet(&packet) {
                            debug!("Dropping video packet: {}", e);
                        }
                        self.drain_video();
                        return;
                    }
                }
                if let Some(audio) = self.audio.as_mut() {
                    if audio.index == index {
                        if let Err(e) = audio.decoder.send_packet(&packet) {
                            debug!("Dropping audio packet: {}", e);
                        }
                        self.drain_audio();
                    }
                }
            }
            Err(ffmpeg::Error::Eof) => {
                self.eof = true;
                if let Some(video) = self.video.as_mut() {
                    let _ = video.decoder.send_eof();
                }
                if let Some(audio) = self.audio.as_mut() {
                    let _ = audio.decoder.send_eof();
                }
                self.drain_video();
                self.drain_audio();
                debug!("End of input for {}", self.shared.source);
            }
            Err(e) => {
                let code = if self.shared.source.is_url() {
                    native_error::NETWORK
                } else {
                    native_error::DECODE
                };
                self.eof = true;
                self.shared.notify_error(code, &e.to_string());
            }
        }
    }

    fn drain_video(&mut self) {
        let Some(video) = self.video.as_mut() else {
            return;
        };

        let mut decoded = ffmpeg::frame::Video::empty();
        while video.decoder.receive_frame(&mut decoded).is_ok() {
            let last = self.queue.back().map(|f| f.pts + video.frame_interval).unwrap_or(0.0);
            let pts = decoded
                .timestamp()
                .map(|t| t as f64 * video.time_base)
                .unwrap_or(last);

            if let Some(target) = self.skip_until {
                if pts + video.frame_interval <= target {
                    continue;
                }
                self.skip_until = None;
            }

            let mut bgra = ffmpeg::frame::Video::empty();
            if let Err(e) = video.scaler.run(&decoded, &mut bgra) {
                warn!("Failed to convert frame: {}", e);
                continue;
            }
            self.queue.push_back(DecodedFrame::from_video(&bgra, pts));
        }
    }

    fn drain_audio(&mut self) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };

        let rate = self.shared.status.lock().clock.rate();
        let mut decoded = ffmpeg::frame::Audio::empty();
        while audio.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(sink) = self.sink.as_mut() else {
                continue;
            };
            // Only 1x audio is rendered; other rates play silently
            if (rate - 1.0).abs() > f64::EPSILON {
                continue;
            }

            if audio.resampler.is_none() {
                let layout = if sink.channels() == 1 {
                    ffmpeg::channel_layout::ChannelLayout::MONO
                } else {
                    ffmpeg::channel_layout::ChannelLayout::STEREO
                };
                match audio.decoder.resampler(
                    ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Planar),
                    layout,
                    sink.sample_rate(),
                ) {
                    Ok(resampler) => audio.resampler = Some(resampler),
                    Err(e) => {
                        warn!("Audio resampler unavailable, dropping audio: {}", e);
                        self.sink = None;
                        return;
                    }
                }
            }

            let Some(resampler) = audio.resampler.as_mut() else {
                continue;
            };
            let mut resampled = ffmpeg::frame::Audio::empty();
            if let Err(e) = resampler.run(&decoded, &mut resampled) {
                debug!("Resampling failed: {}", e);
                continue;
            }

            let planes = resampled.planes().min(2);
            let device_channels = sink.channels() as usize;
            let frames = resampled.samples();
            let mut interleaved = vec![0.0f32; frames * device_channels];
            for plane in 0..planes {
                let samples = resampled.plane::<f32>(plane);
                for (i, sample) in samples.iter().enumerate().take(frames) {
                    interleaved[i * device_channels + plane.min(device_channels - 1)] = *sample;
                }
            }

            let accepted = sink.push(&interleaved);
            if accepted < interleaved.len() {
                trace!("Audio ring full, dropped {} samples", interleaved.len() - accepted);
            }
        }
    }

    fn seek(&mut self, seconds: f64, mode: SeekMode) {
        self.shared.notify(EngineEvent::Seeking);

        let duration = self.shared.status.lock().duration;
        let target = if duration > 0.0 { seconds.clamp(0.0, duration) } else { seconds.max(0.0) };
        let timestamp = (target * AV_TIME_BASE) as i64;

        if let Err(e) = self.input.seek(timestamp, ..timestamp) {
            warn!("Seek to {:.3}s failed: {}", target, e);
        }
        if let Some(video) = self.video.as_mut() {
            video.decoder.flush();
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.decoder.flush();
        }
        self.shared.audio.request_flush();
        self.queue.clear();
        self.eof = false;
        self.skip_until = match mode {
            SeekMode::Normal => Some(target),
            SeekMode::Approximate => None,
        };

        // Decode up to the first frame at the new position so it can be shown while paused
        if self.video.is_some() {
            while self.queue.is_empty() && !self.eof {
                self.read_packet();
            }
        }
        let landed = match mode {
            SeekMode::Approximate => self.queue.front().map(|f| f.pts).unwrap_or(target),
            SeekMode::Normal => target,
        };

        {
            let mut status = self.shared.status.lock();
            status.clock.set_position(landed);
            status.ended = false;
            status.seeking = false;
            if let Some(frame) = self.queue.pop_front() {
                status.current = Some(frame);
                status.frame_serial += 1;
            }
        }
        self.shared.notify(EngineEvent::Seeked);
    }

    fn step(&mut self, forward: bool) {
        if !self.shared.status.lock().paused {
            return;
        }

        if forward {
            while self.queue.is_empty() && !self.eof {
                self.read_packet();
            }
            if let Some(frame) = self.queue.pop_front() {
                let mut status = self.shared.status.lock();
                status.clock.set_position(frame.pts);
                status.current = Some(frame);
                status.frame_serial += 1;
            }
        } else {
            let interval = self.video.as_ref().map(|v| v.frame_interval).unwrap_or(0.04);
            let position = self.shared.status.lock().clock.position();
            self.seek((position - interval).max(0.0), SeekMode::Normal);
        }
        self.shared.notify(EngineEvent::FrameStepCompleted);
    }

    fn present(&mut self) {
        let mut status = self.shared.status.lock();
        let position = status.clock.position();
        let playing = !status.paused;

        // The first frame is shown as soon as it exists, even while paused
        if status.current.is_none() {
            if let Some(frame) = self.queue.pop_front() {
                status.current = Some(frame);
                status.frame_serial += 1;
            }
        }

        let mut newest = None;
        while self.queue.front().map(|f| f.pts <= position).unwrap_or(false) {
            newest = self.queue.pop_front();
        }
        if let Some(frame) = newest {
            status.current = Some(frame);
            status.frame_serial += 1;
        }

        let first_frame = !self.announced_data && status.current.is_some();
        let interval = self.video.as_ref().map(|v| v.frame_interval).unwrap_or(0.0);
        let behind = status
            .current
            .as_ref()
            .map(|f| position - f.pts > 2.0 * interval)
            .unwrap_or(false);
        let starving = playing && behind && self.queue.is_empty() && !self.eof;
        let time_update = playing && self.last_time_update.elapsed() >= TIME_UPDATE_INTERVAL;
        drop(status);

        if first_frame {
            self.announced_data = true;
            self.shared.notify(EngineEvent::LoadedData);
            self.shared.notify(EngineEvent::FirstFrameReady);
            self.shared.notify(EngineEvent::CanPlay);
            self.shared.notify(EngineEvent::CanPlayThrough);
        }

        if starving && !self.buffering && self.announced_data {
            self.buffering = true;
            self.shared.status.lock().clock.pause();
            self.shared.notify(EngineEvent::BufferingStarted);
        } else if self.buffering && (!self.queue.is_empty() || self.eof || !playing) {
            self.buffering = false;
            if playing {
                self.shared.status.lock().clock.start();
            }
            self.shared.notify(EngineEvent::BufferingEnded);
        }

        if time_update {
            self.last_time_update = Instant::now();
            self.shared.notify(EngineEvent::TimeUpdate);
        }
    }

    fn check_end(&mut self) {
        if !self.eof || !self.queue.is_empty() {
            return;
        }

        let (playing, looping, position, duration, ended) = {
            let status = self.shared.status.lock();
            (!status.paused, status.looping, status.clock.position(), status.duration, status.ended)
        };
        if !playing || ended {
            return;
        }
        // Audio-only media finishes with the clock; video finishes with its last frame
        if self.video.is_none() && duration > 0.0 && position < duration {
            return;
        }

        if looping {
            self.seek(0.0, SeekMode::Normal);
            return;
        }

        {
            let mut status = self.shared.status.lock();
            status.ended = true;
            status.paused = true;
            status.clock.pause();
        }
        self.shared.audio.set_running(false);
        self.shared.notify(EngineEvent::Pause);
        self.shared.notify(EngineEvent::Ended);
    }
}

fn open_video_stream(input: &format::context::Input) -> Result<Option<VideoStream>> {
    let Some(stream) = input.streams().best(media::Type::Video) else {
        return Ok(None);
    };

    let index = stream.index();
    let time_base = f64::from(stream.time_base());
    let rate = f64::from(stream.avg_frame_rate());
    let frame_interval = if rate > 0.0 { 1.0 / rate } else { 1.0 / 30.0 };

    let mut context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
    context.set_threading(ffmpeg::codec::threading::Config {
        kind: ffmpeg::codec::threading::Type::Frame,
        count: 0,
    });
    let decoder = context.decoder().video()?;

    let scaler = ffmpeg::software::scaling::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::format::Pixel::BGRA,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::Flags::BILINEAR,
    )?;

    Ok(Some(VideoStream {
        decoder,
        scaler,
        index,
        time_base,
        frame_interval,
    }))
}

fn open_audio_stream(input: &format::context::Input) -> Result<Option<AudioStream>> {
    let Some(stream) = input.streams().best(media::Type::Audio) else {
        return Ok(None);
    };

    let index = stream.index();
    let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = context.decoder().audio()?;

    Ok(Some(AudioStream {
        decoder,
        resampler: None,
        index,
    }))
}

/// Creates [`FfmpegEngine`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEngineFactory;

impl FfmpegEngineFactory {
    pub fn new() -> Self {
        Self
    }
}

impl EngineFactory for FfmpegEngineFactory {
    fn create_engine(
        &self,
        flags: EngineCreateFlags,
        attributes: EngineAttributes,
        source: &MediaSource,
    ) -> Result<Arc<dyn MediaEngine>> {
        ensure_initialized()?;

        if !source.is_available() {
            return Err(PlayerError::NotFound(source.location()));
        }

        debug!("Creating FFmpeg engine for {} ({:?})", source, flags);
        if attributes.shared_device.is_some() {
            debug!("Shared GPU device offered; decoding on the CPU and uploading on transfer");
        }
        Ok(Arc::new(FfmpegEngine::new(flags, attributes, source.clone())))
    }
}
