//! Player module for frameplayer
//!
//! This module turns a native engine into a player a render loop can drive:
//! the [`PlaybackController`] owns the engine, the render path and the event
//! queue, and [`MediaPlayer`] wraps it in a shared handle with notifications
//! and per-tick registration.

pub mod controller;
pub mod events;
pub mod media_player;
pub mod tick;

pub use controller::PlaybackController;
pub use events::{EngineEventQueue, EventDispatcher, EventSubscription, QueuedEvent};
pub use media_player::{live_player_count, MediaPlayer, MediaPlayerBuilder, MediaPlayerRef};
pub use tick::{Connection, UpdateSignal};

use crate::engine::native_error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a player should decode and present its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    hardware_accelerated: bool,
    audio_enabled: bool,
    audio_only: bool,
    audio_device_id: Option<String>,
}

impl Default for MediaFormat {
    fn default() -> Self {
        Self {
            hardware_accelerated: true,
            audio_enabled: true,
            audio_only: false,
            audio_device_id: None,
        }
    }
}

impl MediaFormat {
    pub fn hardware_accelerated(mut self, enabled: bool) -> Self {
        self.hardware_accelerated = enabled;
        self
    }

    pub fn audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn audio_only(mut self, enabled: bool) -> Self {
        self.audio_only = enabled;
        self
    }

    /// Audio endpoint to render to, `None` for the system default
    pub fn audio_device_id(mut self, id: Option<String>) -> Self {
        self.audio_device_id = id;
        self
    }

    pub fn is_hardware_accelerated(&self) -> bool {
        self.hardware_accelerated
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn is_audio_only(&self) -> bool {
        self.audio_only
    }

    pub fn audio_device(&self) -> Option<&str> {
        self.audio_device_id.as_deref()
    }
}

/// Public error codes reported through [`PlayerEvent::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0,
    Aborted = 1,
    NetworkError = 2,
    DecodingError = 3,
    SourceNotSupported = 4,
    Encrypted = 5,
    /// A native code with no public equivalent
    Unknown = u32::MAX,
}

impl ErrorCode {
    /// Map a native engine error code
    pub fn from_native(code: usize) -> Self {
        match code {
            native_error::NOERROR => ErrorCode::NoError,
            native_error::ABORTED => ErrorCode::Aborted,
            native_error::NETWORK => ErrorCode::NetworkError,
            native_error::DECODE => ErrorCode::DecodingError,
            native_error::SRC_NOT_SUPPORTED => ErrorCode::SourceNotSupported,
            native_error::ENCRYPTED => ErrorCode::Encrypted,
            _ => ErrorCode::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(error_to_string(*self))
    }
}

/// Human-readable name of an error code
pub fn error_to_string(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::NoError => "No Error",
        ErrorCode::Aborted => "Aborted",
        ErrorCode::NetworkError => "Network Error",
        ErrorCode::DecodingError => "Decoding Error",
        ErrorCode::SourceNotSupported => "Source Not Supported",
        ErrorCode::Encrypted => "Source Is Encrypted",
        ErrorCode::Unknown => "Unknown Error",
    }
}

/// Notifications a player emits on the consumer thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Metadata loaded; duration and size are valid from now on
    Ready,
    Play,
    Pause,
    /// Playback reached the end, or looped
    Complete,
    SeekStart,
    SeekEnd,
    BufferingStart,
    BufferingEnd,
    Error(ErrorCode),
}

impl fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerEvent::Error(code) => write!(f, "Error({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Frame rectangle anchored at the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn from_size((width, height): (u32, u32)) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
