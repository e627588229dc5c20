//! cpal audio sink for the FFmpeg engine
//!
//! The decode thread pushes interleaved f32 samples into a ring buffer; the
//! cpal callback drains it and applies gain. Volume and mute live in
//! [`AudioControls`] so they can be changed from any thread while the stream
//! itself stays on the thread that opened it.

use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream};
use log::{debug, error, info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Ring buffer size in samples per channel
const RING_BUFFER_FRAMES: usize = 16384;

/// Gain ramp length for smooth volume transitions (in samples)
const GAIN_RAMP_SAMPLES: f32 = 512.0;

/// Gain state shared between the engine and the output callback
#[derive(Debug)]
pub struct AudioControls {
    volume_bits: AtomicU32,
    muted: AtomicBool,
    force_mute: bool,
    running: AtomicBool,
    flush: AtomicBool,
}

impl AudioControls {
    pub fn new(force_mute: bool) -> Self {
        Self {
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            muted: AtomicBool::new(false),
            force_mute,
            running: AtomicBool::new(false),
            flush: AtomicBool::new(false),
        }
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Acquire))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Output start/stop follows playback
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Drop everything queued for output (after a seek)
    pub fn request_flush(&self) {
        self.flush.store(true, Ordering::Release);
    }

    /// Gain the callback should converge to
    fn target_gain(&self) -> f32 {
        if self.force_mute || self.is_muted() {
            0.0
        } else {
            self.volume()
        }
    }
}

/// Open output stream plus the producing end of its ring buffer
pub struct AudioSink {
    _stream: Stream,
    producer: HeapProd<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioSink {
    /// Open the named endpoint, or the default one
    pub fn open(endpoint: Option<&str>, controls: Arc<AudioControls>) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_device(&host, endpoint)?;

        let supported = device
            .default_output_config()
            .audio_err("Failed to query output config")?;
        let config: cpal::StreamConfig = supported.config();
        let channels = config.channels;
        let sample_rate = config.sample_rate.0;

        let ring = HeapRb::<f32>::new(RING_BUFFER_FRAMES * channels as usize);
        let (producer, mut consumer) = ring.split();

        let mut gain = controls.target_gain();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if controls.flush.swap(false, Ordering::AcqRel) {
                        consumer.clear();
                    }

                    if !controls.running.load(Ordering::Acquire) {
                        data.fill(0.0);
                        return;
                    }

                    let read = consumer.pop_slice(data);
                    data[read..].fill(0.0);

                    let target = controls.target_gain();
                    let step = (target - gain) / GAIN_RAMP_SAMPLES;
                    for sample in data[..read].iter_mut() {
                        if (target - gain).abs() > step.abs() {
                            gain += step;
                        } else {
                            gain = target;
                        }
                        *sample *= gain;
                    }
                },
                |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .audio_err("Failed to create audio stream")?;

        stream.play().audio_err("Failed to start audio stream")?;

        info!(
            "Audio output open: {} Hz, {} channels on {}",
            sample_rate,
            channels,
            device.name().unwrap_or_else(|_| "unknown device".to_string())
        );

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Free space in samples
    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Queue interleaved samples; returns how many were accepted
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }
}

fn select_device(host: &cpal::Host, endpoint: Option<&str>) -> Result<Device> {
    let default = host
        .default_output_device()
        .ok_or_else(|| PlayerError::Audio("No default output device found".to_string()))?;

    let wanted = match endpoint {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(default),
    };

    let default_name = default.name().unwrap_or_default();
    if wanted == default_name {
        return Ok(default);
    }

    warn!("Requested audio endpoint '{}' is not the default device", wanted);

    let devices = host.output_devices().audio_err("Failed to enumerate output devices")?;
    for device in devices {
        if device.name().map(|n| n == wanted).unwrap_or(false) {
            debug!("Using audio endpoint '{}'", wanted);
            return Ok(device);
        }
    }

    warn!("Audio endpoint '{}' not found, falling back to '{}'", wanted, default_name);
    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controls_gain() {
        let controls = AudioControls::new(false);
        assert_eq!(controls.target_gain(), 1.0);

        controls.set_volume(0.42);
        assert_eq!(controls.volume(), 0.42);
        assert_eq!(controls.target_gain(), 0.42);

        controls.set_muted(true);
        assert_eq!(controls.target_gain(), 0.0);
        assert_eq!(controls.volume(), 0.42);
    }

    #[test]
    fn test_forced_mute_ignores_volume() {
        let controls = AudioControls::new(true);
        controls.set_volume(0.8);
        assert!(!controls.is_muted());
        assert_eq!(controls.target_gain(), 0.0);
    }

    #[test]
    fn test_volume_is_clamped() {
        let controls = AudioControls::new(false);
        controls.set_volume(3.0);
        assert_eq!(controls.volume(), 1.0);
        controls.set_volume(-1.0);
        assert_eq!(controls.volume(), 0.0);
    }
}
