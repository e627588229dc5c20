//! Native engine seam for frameplayer
//!
//! A media engine demuxes, decodes and times a source on threads it owns,
//! and reports what happens through an [`EngineNotify`] sink from whichever
//! thread it is on. The player never decodes anything itself: it drives the
//! engine through [`MediaEngine`], pulls frames through
//! [`MediaEngine::transfer_video_frame`], and reacts to the event stream.
//!
//! Two engines ship with the crate:
//! - [`FfmpegEngineFactory`] plays real files and URLs through FFmpeg and cpal
//! - [`SyntheticEngineFactory`] produces a deterministic test pattern whose
//!   clock, frames and events can be scripted

pub mod affinity;
pub mod audio;
pub mod clock;
pub mod ffmpeg;
pub mod synthetic;

pub use ffmpeg::FfmpegEngineFactory;
pub use synthetic::{SyntheticControl, SyntheticEngineFactory, SyntheticOptions};

use crate::render::interop::InteropContext;
use crate::utils::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Where a player reads its media from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Local file
    File(PathBuf),

    /// Network stream or any location FFmpeg can open by URL
    Url(String),
}

impl MediaSource {
    /// Local file source
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        MediaSource::File(path.as_ref().to_path_buf())
    }

    /// URL source
    pub fn url<S: Into<String>>(url: S) -> Self {
        MediaSource::Url(url.into())
    }

    /// Whether the source names a URL rather than a local file
    pub fn is_url(&self) -> bool {
        matches!(self, MediaSource::Url(_))
    }

    /// A file source that does not exist cannot be opened; URLs are only
    /// checked by the engine
    pub fn is_available(&self) -> bool {
        match self {
            MediaSource::File(path) => path.exists(),
            MediaSource::Url(url) => !url.is_empty(),
        }
    }

    /// Location string handed to the demuxer
    pub fn location(&self) -> String {
        match self {
            MediaSource::File(path) => path.to_string_lossy().into_owned(),
            MediaSource::Url(url) => url.clone(),
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location())
    }
}

/// Engine notifications, numbered the way native media engines number them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    LoadStart,
    Progress,
    Suspend,
    Abort,
    Error,
    Emptied,
    Stalled,
    Play,
    Pause,
    LoadedMetadata,
    LoadedData,
    Waiting,
    Playing,
    CanPlay,
    CanPlayThrough,
    Seeking,
    Seeked,
    TimeUpdate,
    Ended,
    RateChange,
    DurationChange,
    VolumeChange,
    FormatChange,
    PurgeQueuedEvents,
    TimelineMarker,
    BalanceChange,
    DownloadComplete,
    BufferingStarted,
    BufferingEnded,
    FrameStepCompleted,
    NotifyStableState,
    FirstFrameReady,
    TracksChange,
    OpmInfo,
    ResourceLost,
    DelayLoadEventChanged,
    StreamRenderingError,
    SupportedRatesChanged,
    AudioEndpointChange,
    /// An id this crate does not know
    Other(u32),
}

/// (event, native id, diagnostic name)
const EVENT_TABLE: &[(EngineEvent, u32, &str)] = &[
    (EngineEvent::LoadStart, 1, "LOADSTART"),
    (EngineEvent::Progress, 2, "PROGRESS"),
    (EngineEvent::Suspend, 3, "SUSPEND"),
    (EngineEvent::Abort, 4, "ABORT"),
    (EngineEvent::Error, 5, "ERROR"),
    (EngineEvent::Emptied, 6, "EMPTIED"),
    (EngineEvent::Stalled, 7, "STALLED"),
    (EngineEvent::Play, 8, "PLAY"),
    (EngineEvent::Pause, 9, "PAUSE"),
    (EngineEvent::LoadedMetadata, 10, "LOADEDMETADATA"),
    (EngineEvent::LoadedData, 11, "LOADEDDATA"),
    (EngineEvent::Waiting, 12, "WAITING"),
    (EngineEvent::Playing, 13, "PLAYING"),
    (EngineEvent::CanPlay, 14, "CANPLAY"),
    (EngineEvent::CanPlayThrough, 15, "CANPLAYTHROUGH"),
    (EngineEvent::Seeking, 16, "SEEKING"),
    (EngineEvent::Seeked, 17, "SEEKED"),
    (EngineEvent::TimeUpdate, 18, "TIMEUPDATE"),
    (EngineEvent::Ended, 19, "ENDED"),
    (EngineEvent::RateChange, 20, "RATECHANGE"),
    (EngineEvent::DurationChange, 21, "DURATIONCHANGE"),
    (EngineEvent::VolumeChange, 22, "VOLUMECHANGE"),
    (EngineEvent::FormatChange, 1000, "FORMATCHANGE"),
    (EngineEvent::PurgeQueuedEvents, 1001, "PURGEQUEUEDEVENTS"),
    (EngineEvent::TimelineMarker, 1002, "TIMELINE_MARKER"),
    (EngineEvent::BalanceChange, 1003, "BALANCECHANGE"),
    (EngineEvent::DownloadComplete, 1004, "DOWNLOADCOMPLETE"),
    (EngineEvent::BufferingStarted, 1005, "BUFFERINGSTARTED"),
    (EngineEvent::BufferingEnded, 1006, "BUFFERINGENDED"),
    (EngineEvent::FrameStepCompleted, 1007, "FRAMESTEPCOMPLETED"),
    (EngineEvent::NotifyStableState, 1008, "NOTIFYSTABLESTATE"),
    (EngineEvent::FirstFrameReady, 1009, "FIRSTFRAMEREADY"),
    (EngineEvent::TracksChange, 1010, "TRACKSCHANGE"),
    (EngineEvent::OpmInfo, 1011, "OPMINFO"),
    (EngineEvent::ResourceLost, 1012, "RESOURCELOST"),
    (EngineEvent::DelayLoadEventChanged, 1013, "DELAYLOADEVENT_CHANGED"),
    (EngineEvent::StreamRenderingError, 1014, "STREAMRENDERINGERROR"),
    (EngineEvent::SupportedRatesChanged, 1015, "SUPPORTEDRATES_CHANGED"),
    (EngineEvent::AudioEndpointChange, 1016, "AUDIOENDPOINTCHANGE"),
];

impl EngineEvent {
    /// Decode a native event id
    pub fn from_code(code: u32) -> Self {
        EVENT_TABLE
            .iter()
            .find(|(_, id, _)| *id == code)
            .map(|(event, _, _)| *event)
            .unwrap_or(EngineEvent::Other(code))
    }

    /// Native event id
    pub fn code(self) -> u32 {
        if let EngineEvent::Other(code) = self {
            return code;
        }
        EVENT_TABLE
            .iter()
            .find(|(event, _, _)| *event == self)
            .map(|(_, id, _)| *id)
            .unwrap_or(0)
    }

    /// Diagnostic name used in logs
    pub fn name(self) -> String {
        match EVENT_TABLE.iter().find(|(event, _, _)| *event == self) {
            Some((_, _, name)) => format!("MEDIA_ENGINE_EVENT_{}", name),
            None => format!("Unknown event: {}", self.code()),
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Native error codes carried in `param1` of an [`EngineEvent::Error`]
pub mod native_error {
    pub const NOERROR: usize = 0;
    pub const ABORTED: usize = 1;
    pub const NETWORK: usize = 2;
    pub const DECODE: usize = 3;
    pub const SRC_NOT_SUPPORTED: usize = 4;
    pub const ENCRYPTED: usize = 5;
}

/// How precisely a seek should land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Land exactly on the requested time
    Normal,

    /// Land on the nearest cheap point (usually a keyframe)
    Approximate,
}

/// Pixel layout the engine writes into render targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit B, G, R, A
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 => 4,
        }
    }
}

/// Creation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineCreateFlags {
    /// Deliver frames on the engine's clock, dropping late ones
    pub real_time: bool,

    /// Decode audio but never output it
    pub force_mute: bool,

    /// Ignore video streams
    pub audio_only: bool,
}

/// Receiver for engine notifications
///
/// Called from engine threads. Implementations must only record the event
/// and return; the engine holds the sink weakly, so it never keeps its
/// observer alive.
pub trait EngineNotify: Send + Sync {
    fn event_notify(&self, event: EngineEvent, param1: usize, param2: u32);
}

/// Everything an engine needs besides its source
#[derive(Clone)]
pub struct EngineAttributes {
    /// Non-owning notification sink
    pub notify: Weak<dyn EngineNotify>,

    /// Output pixel format for transferred frames
    pub output_format: PixelFormat,

    /// GPU device shared with the render path, set by the GPU render path
    ///
    /// Advisory. An engine that decodes on the CPU may ignore it; frames
    /// still reach the shared texture through `transfer_video_frame`, which
    /// uploads on this same device's queue.
    pub shared_device: Option<Arc<InteropContext>>,

    /// Audio endpoint name, `None` for the system default
    pub audio_endpoint_id: Option<String>,
}

impl EngineAttributes {
    pub fn new(notify: Weak<dyn EngineNotify>) -> Self {
        Self {
            notify,
            output_format: PixelFormat::Bgra8,
            shared_device: None,
            audio_endpoint_id: None,
        }
    }

    /// Forward an event to the sink if it is still alive
    pub fn notify(&self, event: EngineEvent, param1: usize, param2: u32) {
        if let Some(sink) = self.notify.upgrade() {
            sink.event_notify(event, param1, param2);
        }
    }
}

impl fmt::Debug for EngineAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineAttributes")
            .field("output_format", &self.output_format)
            .field("shared_device", &self.shared_device.is_some())
            .field("audio_endpoint_id", &self.audio_endpoint_id)
            .finish()
    }
}

/// Borrowed view of one BGRA frame
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `width * 4`
    pub stride: usize,
    pub data: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Row `y` without stride padding
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 4]
    }
}

/// Destination for [`MediaEngine::transfer_video_frame`]
///
/// The engine scales the current frame to `target_size` before writing.
pub trait VideoFrameTarget {
    fn target_size(&self) -> (u32, u32);
    fn write_frame(&mut self, frame: FrameView<'_>) -> Result<()>;
}

/// Control and query surface of a native engine
pub trait MediaEngine: Send + Sync {
    /// Start opening the source; progress arrives as events
    fn load(&self) -> Result<()>;

    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;
    fn is_seeking(&self) -> bool;

    fn has_audio(&self) -> bool;
    fn has_video(&self) -> bool;

    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64) -> Result<()>;

    fn is_muted(&self) -> bool;
    fn set_muted(&self, muted: bool) -> Result<()>;
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64) -> Result<()>;

    fn is_looping(&self) -> bool;
    fn set_loop(&self, looping: bool) -> Result<()>;

    /// Current position in seconds
    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64) -> Result<()>;

    /// Duration in seconds, 0 while unknown
    fn duration(&self) -> f64;

    /// Natural size of the video stream
    fn native_video_size(&self) -> Option<(u32, u32)>;

    /// Presentation time (100ns units) of a frame that became current since
    /// the last call, `None` when nothing new is ready
    fn on_video_stream_tick(&self) -> Option<i64>;

    /// Write the current frame into `target`, scaled to its size
    fn transfer_video_frame(&self, target: &mut dyn VideoFrameTarget) -> Result<()>;

    /// Extended interface, when the engine has one
    fn extended(&self) -> Option<&dyn MediaEngineEx> {
        None
    }

    /// Stop all engine threads; blocks until they have exited
    fn shutdown(&self) -> Result<()>;
}

/// Optional engine capabilities
pub trait MediaEngineEx {
    fn is_playback_rate_supported(&self, rate: f64) -> bool;
    fn set_current_time_ex(&self, seconds: f64, mode: SeekMode) -> Result<()>;
    fn frame_step(&self, forward: bool) -> Result<()>;
}

/// Creates engines for players
pub trait EngineFactory: Send + Sync {
    fn create_engine(
        &self,
        flags: EngineCreateFlags,
        attributes: EngineAttributes,
        source: &MediaSource,
    ) -> Result<Arc<dyn MediaEngine>>;
}
