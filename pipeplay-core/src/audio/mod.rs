//! Audio output via cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Block on a mutex or condvar
//! - Perform I/O
//! - Allocate heap memory (the scratch buffer is sized up front; larger blocks
//!   are rendered through it piece by piece)
//!
//! The callback reads the frame ring through [`render::FrameRenderer`], whose
//! `pop_slice` is lock-free and allocation-free, then decodes the staged bytes
//! into the device's sample type.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `AudioOutput` therefore must be created and dropped on the same thread.

pub mod render;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, SampleRate, SizedSample, Stream, StreamConfig,
};
use parking_lot::Mutex;
use std::sync::Arc;
#[cfg(feature = "audio-cpal")]
use tracing::{debug, error, info};

use crate::{
    config::{PlayerConfig, SampleFormat},
    error::{PipeError, Result},
};
use render::{FillOutput, FrameRenderer};

/// Lifecycle of an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Started,
    Stopped,
    Closed,
}

/// Control surface of an output stream whose callback drains the ring.
///
/// The core drives this from the non-realtime thread: start before the
/// reader loop, query while it runs, stop and close once it ends.
pub trait StreamSession {
    fn state(&self) -> SessionState;

    fn start(&mut self) -> Result<()>;

    /// `Ok(true)` while the callback is being driven. An error means the
    /// stream failed underneath us.
    fn is_active(&self) -> Result<bool>;

    fn stop(&mut self) -> Result<()>;

    /// Release the stream and the callback it owns.
    fn close(&mut self) -> Result<()>;
}

/// Handle to the default output device's stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on Windows/macOS.
/// Create and drop this type on the same OS thread.
pub struct AudioOutput {
    #[cfg(feature = "audio-cpal")]
    stream: Option<Stream>,
    state: SessionState,
    /// First error reported by the backend's error callback.
    fault: Arc<Mutex<Option<String>>>,
}

impl AudioOutput {
    /// Open the system default output device with the configured layout and
    /// attach `renderer` as its callback. The stream is not started.
    ///
    /// # Errors
    /// Returns `PipeError::NoDefaultOutputDevice` when no output device is
    /// available, or `PipeError::AudioStream` if cpal fails to build the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(config: &PlayerConfig, renderer: FrameRenderer) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PipeError::NoDefaultOutputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "default output device"
        );

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate.round() as u32),
            buffer_size: BufferSize::Fixed(config.frames_per_buffer),
        };

        debug!(
            channels = config.channels,
            format = %config.sample_format,
            rate = config.sample_rate,
            frames_per_buffer = config.frames_per_buffer,
            bytes_per_buffer = config.frames_per_buffer as usize * config.frame_size(),
            flags = ?config.stream_flags,
            "opening stream"
        );
        if !config.stream_flags.is_empty() {
            debug!("cpal has no clip/dither controls; disabled engine features have no effect");
        }

        let fault = Arc::new(Mutex::new(None));
        let (dev, cfg) = (&device, &stream_config);

        let stream = match config.sample_format {
            SampleFormat::U8 => build_stream(dev, cfg, renderer, &fault, 1, |b| {
                u8::from_ne_bytes([b[0]])
            }),
            SampleFormat::S8 => build_stream(dev, cfg, renderer, &fault, 1, |b| {
                i8::from_ne_bytes([b[0]])
            }),
            SampleFormat::S16 => build_stream(dev, cfg, renderer, &fault, 2, |b| {
                i16::from_ne_bytes([b[0], b[1]])
            }),
            SampleFormat::S24 => build_stream(dev, cfg, renderer, &fault, 3, unpack_s24),
            SampleFormat::S32 => build_stream(dev, cfg, renderer, &fault, 4, |b| {
                i32::from_ne_bytes([b[0], b[1], b[2], b[3]])
            }),
            SampleFormat::F32 => build_stream(dev, cfg, renderer, &fault, 4, |b| {
                f32::from_ne_bytes([b[0], b[1], b[2], b[3]])
            }),
        }?;

        Ok(Self {
            stream: Some(stream),
            state: SessionState::Open,
            fault,
        })
    }

    fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }
}

/// Scratch size, in frames, when the backend picks its own block size.
#[cfg(feature = "audio-cpal")]
const FALLBACK_SCRATCH_FRAMES: usize = 4096;

/// Build an output stream of sample type `T` whose callback renders ring
/// bytes into `scratch` and decodes them `bytes_per_sample` at a time.
#[cfg(feature = "audio-cpal")]
fn build_stream<T, D>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: FrameRenderer,
    fault: &Arc<Mutex<Option<String>>>,
    bytes_per_sample: usize,
    decode: D,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    D: Fn(&[u8]) -> T + Send + 'static,
{
    let frames = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => FALLBACK_SCRATCH_FRAMES,
    };
    let mut scratch = vec![0u8; frames.max(1) * config.channels as usize * bytes_per_sample];
    let fault = Arc::clone(fault);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                render_samples(data, &mut scratch, &mut renderer, bytes_per_sample, &decode);
            },
            move |err| {
                error!("audio stream error: {err}");
                fault.lock().get_or_insert_with(|| err.to_string());
            },
            None,
        )
        .map_err(|e| PipeError::AudioStream(e.to_string()))
}

/// Fill `out` through `scratch`, one scratch-sized piece at a time, so a
/// block larger than requested never forces an allocation.
///
/// `scratch` must hold a whole number of frames.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn render_samples<T, R, D>(
    out: &mut [T],
    scratch: &mut [u8],
    renderer: &mut R,
    bytes_per_sample: usize,
    decode: &D,
) where
    R: FillOutput,
    D: Fn(&[u8]) -> T,
{
    let samples_per_piece = scratch.len() / bytes_per_sample;
    if samples_per_piece == 0 {
        return;
    }
    for piece in out.chunks_mut(samples_per_piece) {
        let bytes = &mut scratch[..piece.len() * bytes_per_sample];
        renderer.fill(bytes);
        for (sample, raw) in piece.iter_mut().zip(bytes.chunks_exact(bytes_per_sample)) {
            *sample = decode(raw);
        }
    }
}

/// Widen one packed 24-bit sample to the high bytes of an `i32`.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn unpack_s24(b: &[u8]) -> i32 {
    #[cfg(target_endian = "little")]
    let bytes = [0, b[0], b[1], b[2]];
    #[cfg(target_endian = "big")]
    let bytes = [b[0], b[1], b[2], 0];
    i32::from_ne_bytes(bytes)
}

#[cfg(feature = "audio-cpal")]
impl StreamSession for AudioOutput {
    fn state(&self) -> SessionState {
        self.state
    }

    fn start(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or_else(|| {
            PipeError::AudioStream("cannot start a closed stream".into())
        })?;
        debug!("starting stream");
        stream
            .play()
            .map_err(|e| PipeError::AudioStream(e.to_string()))?;
        self.state = SessionState::Started;
        Ok(())
    }

    fn is_active(&self) -> Result<bool> {
        if let Some(fault) = self.fault() {
            return Err(PipeError::AudioStream(fault));
        }
        Ok(self.state == SessionState::Started)
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_ref() {
            debug!("stopping stream");
            stream
                .pause()
                .map_err(|e| PipeError::AudioStream(e.to_string()))?;
        }
        self.state = SessionState::Stopped;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!("closing stream");
        // Dropping the stream joins the callback thread and frees the renderer.
        self.stream = None;
        self.state = SessionState::Closed;
        Ok(())
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioOutput {
    pub fn open_default(_config: &PlayerConfig, _renderer: FrameRenderer) -> Result<Self> {
        Err(PipeError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl StreamSession for AudioOutput {
    fn state(&self) -> SessionState {
        self.state
    }

    fn start(&mut self) -> Result<()> {
        Err(PipeError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    fn is_active(&self) -> Result<bool> {
        if let Some(fault) = self.fault() {
            return Err(PipeError::AudioStream(fault));
        }
        Ok(false)
    }

    fn stop(&mut self) -> Result<()> {
        self.state = SessionState::Stopped;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        Ok(())
    }
}
