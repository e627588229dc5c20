//! Utility module for frameplayer
//!
//! - Error handling with custom error types
//! - Configuration management
//! - Small numeric and formatting helpers shared by the player and the driver

pub mod config;
pub mod error;

pub use config::{Config, GeneralConfig, PlaybackConfig, PlayerSettings};
pub use error::{IntoPlayerError, PlayerError, Result};

/// Format a playback position for display
///
/// Returns "HH:MM:SS" for positions of an hour or more, "MM:SS" otherwise.
/// Negative or non-finite positions (no engine, unknown duration) render as
/// "--:--".
pub fn format_position(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }

    let total_secs = seconds.floor() as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Clamp a value into [0, 1], mapping NaN to 0
pub fn unit_interval(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
