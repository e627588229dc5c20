//! Error types for frameplayer
//!
//! Internal plumbing (engine creation, render targets, audio sinks, config
//! loading) reports failures through [`PlayerError`]. Runtime playback
//! failures never surface here; they reach the consumer as
//! `PlayerEvent::Error` notifications instead.

use thiserror::Error;

/// Main error type for frameplayer
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Native engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Render path and GPU interop errors
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Audio sink errors
    #[error("Audio error: {0}")]
    Audio(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Synchronization error
    #[error("Synchronization error: {0}")]
    Sync(String),
}

impl From<ffmpeg_next::Error> for PlayerError {
    fn from(err: ffmpeg_next::Error) -> Self {
        PlayerError::Engine(format!("FFmpeg error: {}", err))
    }
}

/// Convenience type alias for Results in frameplayer
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn engine_err(self, context: &str) -> Result<T>;
    fn audio_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn engine_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Engine(format!("{}: {}", context, e)))
    }

    fn audio_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Audio(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlayerError::Engine("no decoder for stream".to_string());
        assert_eq!(err.to_string(), "Engine error: no decoder for stream");

        let err = PlayerError::UnsupportedFormat("rgb565".to_string());
        assert_eq!(err.to_string(), "Unsupported format: rgb565");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let player_err: PlayerError = io_err.into();
        assert!(matches!(player_err, PlayerError::FileIO(_)));
    }

    #[test]
    fn test_into_player_error_trait() {
        let result: std::result::Result<(), &str> = Err("expected `=`");
        match result.config_err("Failed to parse config file") {
            Err(PlayerError::Config(msg)) => {
                assert_eq!(msg, "Failed to parse config file: expected `=`");
            }
            _ => panic!("Expected Config error"),
        }

        let result: std::result::Result<u32, &str> = Ok(7);
        assert_eq!(result.engine_err("unused").ok(), Some(7));
    }
}
