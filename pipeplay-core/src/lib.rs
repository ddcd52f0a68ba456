//! # pipeplay-core
//!
//! Streams raw interleaved PCM from a byte pipe to an audio output device.
//!
//! ## Architecture
//!
//! ```text
//! stdin → PipeReader(thread) → staging frame → SPSC frame ring → FrameRenderer
//!              │                      ▲                               │
//!        crossbeam channel      reader loop (engine::pipeline)   cpal callback
//!                                     │                               │
//!                               Clock::sleep(period / 2)       silence on underrun
//! ```
//!
//! The output callback is zero-alloc and never blocks. Only whole frames ever
//! enter the ring; the reader loop never blocks on input.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;

// Convenience re-exports for downstream crates
pub use audio::{
    render::{FillOutput, FrameRenderer},
    AudioOutput, SessionState, StreamSession,
};
pub use config::{EngineFeature, PlayerConfig, SampleFormat, StreamFlags};
pub use engine::{
    clock::{Clock, ManualClock, SystemClock},
    pipeline::{DiagnosticsSnapshot, Termination},
    Player,
};
pub use error::{PipeError, Result};
pub use input::{
    scripted::{ScriptedSource, Step},
    InputSource, PipeReader,
};
