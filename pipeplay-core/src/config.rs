//! Playback configuration.
//!
//! One `PlayerConfig` is built at startup and handed to every component that
//! needs it. The defaults reproduce the Mac Sound Driver stream layout:
//! mono, unsigned 8-bit, 22 256 Hz, 370-frame buffers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::buffering::next_power_of_two;
use crate::error::{PipeError, Result};

/// PCM sample encoding of the incoming byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    S16,
    S32,
    /// Packed 3-byte signed samples.
    S24,
    S8,
    U8,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 6] = [
        SampleFormat::F32,
        SampleFormat::S16,
        SampleFormat::S32,
        SampleFormat::S24,
        SampleFormat::S8,
        SampleFormat::U8,
    ];

    /// Width of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::F32 | SampleFormat::S32 => 4,
            SampleFormat::S24 => 3,
            SampleFormat::S16 => 2,
            SampleFormat::S8 | SampleFormat::U8 => 1,
        }
    }

    /// Byte value representing zero amplitude.
    ///
    /// Centre is zero for every format except unsigned 8-bit, where it is 128.
    pub fn silence_byte(self) -> u8 {
        match self {
            SampleFormat::U8 => 0x80,
            _ => 0x00,
        }
    }

    /// Name accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::F32 => "f32",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::S24 => "s24",
            SampleFormat::S8 => "s8",
            SampleFormat::U8 => "u8",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "f" | "f32" => Ok(SampleFormat::F32),
            "s16" => Ok(SampleFormat::S16),
            "s32" => Ok(SampleFormat::S32),
            "s24" => Ok(SampleFormat::S24),
            "s8" => Ok(SampleFormat::S8),
            "u8" => Ok(SampleFormat::U8),
            other => Err(PipeError::InvalidConfig(format!(
                "unknown sample format '{other}'"
            ))),
        }
    }
}

/// Output engine features that can be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFeature {
    Clipping,
    Dithering,
}

impl FromStr for EngineFeature {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clipping" => Ok(EngineFeature::Clipping),
            "dithering" => Ok(EngineFeature::Dithering),
            other => Err(PipeError::InvalidConfig(format!(
                "unknown engine feature '{other}'"
            ))),
        }
    }
}

/// Engine features disabled for the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    pub clip_off: bool,
    pub dither_off: bool,
}

impl StreamFlags {
    pub fn disable(&mut self, feature: EngineFeature) {
        match feature {
            EngineFeature::Clipping => self.clip_off = true,
            EngineFeature::Dithering => self.dither_off = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.clip_off && !self.dither_off
    }
}

/// Configuration for a playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Interleaved channel count. Default: 1.
    pub channels: u16,
    /// Sample encoding of the input. Default: unsigned 8-bit.
    pub sample_format: SampleFormat,
    /// Nominal sample rate in Hz. Default: 22256.0.
    pub sample_rate: f64,
    /// Frames per device callback. The ring holds the next power of two
    /// frames. Default: 370.
    pub frames_per_buffer: u32,
    /// Engine features to switch off.
    pub stream_flags: StreamFlags,
    /// Longest stretch without input before playback ends.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_format: SampleFormat::U8,
            sample_rate: 22_256.0,
            frames_per_buffer: 370,
            stream_flags: StreamFlags::default(),
            idle_timeout: None,
        }
    }
}

impl PlayerConfig {
    /// Reject values no stream can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(PipeError::InvalidConfig("channel count must be positive".into()));
        }
        if self.frames_per_buffer == 0 {
            return Err(PipeError::InvalidConfig(
                "frames per buffer must be positive".into(),
            ));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(PipeError::InvalidConfig(format!(
                "sample rate must be a positive number, got {}",
                self.sample_rate
            )));
        }
        if self.ring_capacity_frames().is_none() {
            return Err(PipeError::InvalidConfig(format!(
                "frames per buffer {} is too large",
                self.frames_per_buffer
            )));
        }
        Ok(())
    }

    /// Bytes per interleaved frame.
    pub fn frame_size(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    pub fn silence_byte(&self) -> u8 {
        self.sample_format.silence_byte()
    }

    /// Ring capacity in frames: the next power of two at or above
    /// `frames_per_buffer`.
    pub fn ring_capacity_frames(&self) -> Option<usize> {
        next_power_of_two(self.frames_per_buffer as usize)
    }

    /// Duration of one device buffer.
    pub fn buffer_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.frames_per_buffer as f64 / self.sample_rate)
            .unwrap_or(Duration::MAX)
    }

    /// Reader sleep between polls: half a buffer period.
    pub fn poll_interval(&self) -> Duration {
        self.buffer_period() / 2
    }
}
