//! Cooperative reader loop: the ring's only producer.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Ask the stream session whether it is still active; stop if it is not
//! 2. Warn if the ring is completely empty (consumer is starving)
//! 3. While frames fit: poll input → read into staging → commit whole frames
//! 4. Sleep half a buffer period
//! 5. End with TimedOut once input has been idle for the configured timeout
//! ```
//!
//! The loop never issues a read unless the source reported readiness, so it
//! never blocks on input. After a graceful end it keeps the stream running
//! until queued frames have been played, then hands control back for teardown.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::{
    audio::StreamSession,
    buffering::{staging::StagingFrame, FrameProducer},
    engine::clock::Clock,
    error::{PipeError, Result},
    input::InputSource,
};

/// Lock-free counters shared by the reader loop and the realtime callback.
pub struct PipelineDiagnostics {
    pub bytes_read: AtomicUsize,
    pub frames_committed: AtomicUsize,
    pub starvation_warnings: AtomicUsize,
    pub partial_bytes_discarded: AtomicUsize,
    pub callbacks: AtomicUsize,
    pub frames_rendered: AtomicUsize,
    pub silence_frames: AtomicUsize,
    pub underrun_callbacks: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            bytes_read: AtomicUsize::new(0),
            frames_committed: AtomicUsize::new(0),
            starvation_warnings: AtomicUsize::new(0),
            partial_bytes_discarded: AtomicUsize::new(0),
            callbacks: AtomicUsize::new(0),
            frames_rendered: AtomicUsize::new(0),
            silence_frames: AtomicUsize::new(0),
            underrun_callbacks: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
        self.frames_committed.store(0, Ordering::Relaxed);
        self.starvation_warnings.store(0, Ordering::Relaxed);
        self.partial_bytes_discarded.store(0, Ordering::Relaxed);
        self.callbacks.store(0, Ordering::Relaxed);
        self.frames_rendered.store(0, Ordering::Relaxed);
        self.silence_frames.store(0, Ordering::Relaxed);
        self.underrun_callbacks.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            frames_committed: self.frames_committed.load(Ordering::Relaxed),
            starvation_warnings: self.starvation_warnings.load(Ordering::Relaxed),
            partial_bytes_discarded: self.partial_bytes_discarded.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
            underrun_callbacks: self.underrun_callbacks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub bytes_read: usize,
    pub frames_committed: usize,
    pub starvation_warnings: usize,
    pub partial_bytes_discarded: usize,
    pub callbacks: usize,
    pub frames_rendered: usize,
    pub silence_frames: usize,
    pub underrun_callbacks: usize,
}

/// How a playback run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Input was idle for longer than the configured timeout.
    TimedOut,
    /// The input reached end of file.
    Eof,
    /// The output stream stopped on its own.
    StreamStopped,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::TimedOut => f.write_str("timed out waiting for input pipe"),
            Termination::Eof => f.write_str("input pipe closed"),
            Termination::StreamStopped => f.write_str("stream is no longer active"),
        }
    }
}

/// The ring holds less than two buffer periods of audio, so eight half-period
/// polls cover its play time twice over.
const DRAIN_POLLS: u32 = 8;

/// Everything the reader loop touches, passed as one struct.
pub struct PipelineContext<'a, S: ?Sized, I: ?Sized, C: ?Sized> {
    pub producer: &'a mut FrameProducer,
    pub staging: &'a mut StagingFrame,
    pub source: &'a mut I,
    pub session: &'a S,
    pub clock: &'a C,
    /// Sleep between polls; half a buffer period.
    pub poll_interval: Duration,
    /// `None` waits for input forever.
    pub idle_timeout: Option<Duration>,
    pub diagnostics: &'a PipelineDiagnostics,
}

/// Run the reader loop until input ends, idles out, or fails.
///
/// # Errors
/// - `PipeError::Io` when polling or reading the input fails.
/// - `PipeError::StreamInactive` when the session reports a fault.
pub fn run<S, I, C>(ctx: &mut PipelineContext<'_, S, I, C>) -> Result<Termination>
where
    S: StreamSession + ?Sized,
    I: InputSource + ?Sized,
    C: Clock + ?Sized,
{
    debug!(
        sleep_ms = ctx.poll_interval.as_millis() as u64,
        timeout = ?ctx.idle_timeout,
        capacity = ctx.producer.capacity(),
        "entering reader loop"
    );

    let termination = read_until_done(ctx)?;
    info!("{termination}");
    drain(ctx)?;
    Ok(termination)
}

fn read_until_done<S, I, C>(ctx: &mut PipelineContext<'_, S, I, C>) -> Result<Termination>
where
    S: StreamSession + ?Sized,
    I: InputSource + ?Sized,
    C: Clock + ?Sized,
{
    let frame_size = ctx.producer.frame_size();
    let mut last_progress = ctx.clock.now();

    loop {
        if !still_active(ctx.session)? {
            return Ok(Termination::StreamStopped);
        }

        let mut writable = ctx.producer.write_available();
        if writable == ctx.producer.capacity() {
            warn!("ring buffer starved!");
            ctx.diagnostics
                .starvation_warnings
                .fetch_add(1, Ordering::Relaxed);
        }

        while writable > 0 {
            if !ctx.source.poll_ready()? {
                trace!("input not ready");
                break;
            }

            let n = ctx.source.read(ctx.staging.unfilled_mut())?;
            if n == 0 {
                discard_partial(ctx.staging, ctx.diagnostics);
                return Ok(Termination::Eof);
            }
            ctx.staging.advance(n);
            ctx.diagnostics.bytes_read.fetch_add(n, Ordering::Relaxed);
            last_progress = ctx.clock.now();

            if ctx.staging.is_complete() {
                // Input lands in staging because reads cannot target the ring.
                ctx.producer.write(ctx.staging.frame(), 1);
                ctx.staging.clear();
                writable -= 1;
                ctx.diagnostics
                    .frames_committed
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        debug_assert!(ctx.staging.len() < frame_size);

        ctx.clock.sleep(ctx.poll_interval);

        if let Some(timeout) = ctx.idle_timeout {
            if idle_for(ctx.clock.now(), last_progress) >= timeout {
                return Ok(Termination::TimedOut);
            }
        }
    }
}

/// Wait for the callback to play what is already queued.
fn drain<S, I, C>(ctx: &mut PipelineContext<'_, S, I, C>) -> Result<()>
where
    S: StreamSession + ?Sized,
    I: InputSource + ?Sized,
    C: Clock + ?Sized,
{
    let queued = ctx.producer.read_available();
    if queued == 0 {
        return Ok(());
    }

    let budget = ctx.poll_interval.saturating_mul(DRAIN_POLLS);
    let start = ctx.clock.now();
    debug!(queued, "draining queued frames");

    while ctx.producer.read_available() > 0 {
        match ctx.session.is_active() {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => return Err(PipeError::StreamInactive(e.to_string())),
        }
        if idle_for(ctx.clock.now(), start) >= budget {
            warn!(
                left = ctx.producer.read_available(),
                "gave up waiting for the stream to drain"
            );
            break;
        }
        ctx.clock.sleep(ctx.poll_interval);
    }
    Ok(())
}

/// A failed activity query is fatal; an inactive stream just ends the loop.
fn still_active<S: StreamSession + ?Sized>(session: &S) -> Result<bool> {
    session
        .is_active()
        .map_err(|e| PipeError::StreamInactive(e.to_string()))
}

fn discard_partial(staging: &mut StagingFrame, diagnostics: &PipelineDiagnostics) {
    if !staging.is_empty() {
        warn!(
            bytes = staging.len(),
            "discarding incomplete trailing frame"
        );
        diagnostics
            .partial_bytes_discarded
            .fetch_add(staging.len(), Ordering::Relaxed);
        staging.clear();
    }
}

fn idle_for(now: Instant, since: Instant) -> Duration {
    now.saturating_duration_since(since)
}
