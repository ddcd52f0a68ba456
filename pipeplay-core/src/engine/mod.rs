//! `Player`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Player::new(config)
//!     └─► play()
//!           ├─ allocate staging frame + frame ring   (fatal before device I/O)
//!           ├─ open stream with the ring's consumer  (Open)
//!           ├─ start stream                          (Started)
//!           ├─ pipeline::run                         (reader loop on this thread)
//!           └─ teardown: stop → close → ring → staging, every step attempted
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so the stream is opened,
//! driven and dropped on the thread calling `play()`. The realtime callback
//! only ever sees the consumer half of the ring.

pub mod clock;
pub mod pipeline;

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::{
    audio::{render::FrameRenderer, AudioOutput, SessionState, StreamSession},
    buffering::{create_frame_ring, staging::StagingFrame, FrameProducer},
    config::PlayerConfig,
    error::Result,
    input::InputSource,
};
use clock::{Clock, SystemClock};
use pipeline::{DiagnosticsSnapshot, PipelineContext, PipelineDiagnostics, Termination};

/// Plays one input stream through one output stream.
pub struct Player {
    config: PlayerConfig,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl Player {
    /// # Errors
    /// `PipeError::InvalidConfig` when no stream can be built from `config`.
    pub fn new(config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Play `source` on the system default output device until it ends,
    /// idles out, or fails.
    pub fn play<I: InputSource + ?Sized>(&self, source: &mut I) -> Result<Termination> {
        let config = self.config.clone();
        self.play_with(
            move |renderer| AudioOutput::open_default(&config, renderer),
            source,
            &SystemClock,
        )
    }

    /// Play through a caller-supplied stream backend and clock.
    ///
    /// `open` receives the renderer that must be driven as the stream's
    /// callback and returns the opened, not yet started, session.
    pub fn play_with<S, O, I, C>(&self, open: O, source: &mut I, clock: &C) -> Result<Termination>
    where
        S: StreamSession,
        O: FnOnce(FrameRenderer) -> Result<S>,
        I: InputSource + ?Sized,
        C: Clock + ?Sized,
    {
        self.diagnostics.reset();

        let frame_size = self.config.frame_size();
        debug!(bytes = frame_size, "allocating pipe buffer");
        let mut staging = StagingFrame::new(frame_size)?;

        let (mut producer, consumer) =
            create_frame_ring(frame_size, self.config.frames_per_buffer as usize)?;
        debug!(
            frames = producer.capacity(),
            bytes = producer.capacity() * frame_size,
            "allocated ring buffer"
        );

        let renderer = FrameRenderer::new(
            consumer,
            self.config.silence_byte(),
            Arc::clone(&self.diagnostics),
        );
        debug!("opening stream");
        let mut session = open(renderer)?;

        let outcome = session.start().and_then(|()| {
            let mut ctx = PipelineContext {
                producer: &mut producer,
                staging: &mut staging,
                source,
                session: &session,
                clock,
                poll_interval: self.config.poll_interval(),
                idle_timeout: self.config.idle_timeout,
                diagnostics: &self.diagnostics,
            };
            pipeline::run(&mut ctx)
        });

        teardown(&mut session, producer, staging);

        let snapshot = self.diagnostics.snapshot();
        info!(
            frames_committed = snapshot.frames_committed,
            frames_rendered = snapshot.frames_rendered,
            silence_frames = snapshot.silence_frames,
            underrun_callbacks = snapshot.underrun_callbacks,
            "playback finished"
        );
        outcome
    }

    /// Snapshot of the counters from the latest `play` call.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

/// Release everything `play_with` acquired, in order. A failing step is
/// logged and the remaining steps still run.
fn teardown<S: StreamSession>(session: &mut S, producer: FrameProducer, staging: StagingFrame) {
    if session.state() == SessionState::Started {
        if let Err(e) = session.stop() {
            error!("could not stop stream: {e}");
        }
    }
    if !matches!(session.state(), SessionState::Unopened | SessionState::Closed) {
        if let Err(e) = session.close() {
            error!("could not close stream: {e}");
        }
    }

    debug!("freeing ring buffer");
    drop(producer);

    debug!("freeing pipe buffer");
    drop(staging);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::render::FillOutput;
    use crate::config::SampleFormat;
    use crate::engine::clock::ManualClock;
    use crate::error::PipeError;
    use crate::input::scripted::{ScriptedSource, Step};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    type CallLog = Rc<RefCell<Vec<&'static str>>>;

    /// Records lifecycle calls; renders one block whenever it is queried.
    struct RecordingSession {
        log: CallLog,
        renderer: FrameRenderer,
        state: SessionState,
        fail_start: bool,
        fail_stop: bool,
        blocks: Rc<RefCell<Vec<Vec<u8>>>>,
        block_bytes: usize,
    }

    impl StreamSession for RecordingSession {
        fn state(&self) -> SessionState {
            self.state
        }

        fn start(&mut self) -> Result<()> {
            self.log.borrow_mut().push("start");
            if self.fail_start {
                return Err(PipeError::AudioStream("device busy".into()));
            }
            self.state = SessionState::Started;
            Ok(())
        }

        fn is_active(&self) -> Result<bool> {
            Ok(self.state == SessionState::Started)
        }

        fn stop(&mut self) -> Result<()> {
            self.log.borrow_mut().push("stop");
            self.state = SessionState::Stopped;
            if self.fail_stop {
                return Err(PipeError::AudioStream("stop failed".into()));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.log.borrow_mut().push("close");
            self.state = SessionState::Closed;
            Ok(())
        }
    }

    impl RecordingSession {
        fn render_block(&mut self) {
            let mut block = vec![0u8; self.block_bytes];
            self.renderer.fill(&mut block);
            self.blocks.borrow_mut().push(block);
        }
    }

    fn config() -> PlayerConfig {
        PlayerConfig {
            sample_rate: 8000.0,
            frames_per_buffer: 4,
            ..PlayerConfig::default()
        }
    }

    fn opener(
        log: &CallLog,
        fail_start: bool,
        fail_stop: bool,
    ) -> impl FnOnce(FrameRenderer) -> Result<RecordingSession> {
        let log = Rc::clone(log);
        move |renderer| {
            log.borrow_mut().push("open");
            Ok(RecordingSession {
                log,
                renderer,
                state: SessionState::Open,
                fail_start,
                fail_stop,
                blocks: Rc::default(),
                block_bytes: 4,
            })
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = PlayerConfig {
            channels: 0,
            ..PlayerConfig::default()
        };
        assert!(matches!(Player::new(config), Err(PipeError::InvalidConfig(_))));
    }

    #[test]
    fn eof_runs_full_lifecycle() {
        let player = Player::new(config()).unwrap();
        let log = CallLog::default();
        let mut source = ScriptedSource::new([Step::Data(vec![1, 2, 3]), Step::Eof]);

        let outcome = player
            .play_with(opener(&log, false, false), &mut source, &ManualClock::new())
            .unwrap();

        assert_eq!(outcome, Termination::Eof);
        assert_eq!(*log.borrow(), vec!["open", "start", "stop", "close"]);
        assert_eq!(player.diagnostics_snapshot().frames_committed, 3);
    }

    #[test]
    fn io_error_still_tears_down() {
        let player = Player::new(config()).unwrap();
        let log = CallLog::default();
        let mut source = ScriptedSource::new([Step::Fail(std::io::ErrorKind::BrokenPipe)]);

        let err = player
            .play_with(opener(&log, false, false), &mut source, &ManualClock::new())
            .unwrap_err();

        assert!(matches!(err, PipeError::Io(_)));
        assert_eq!(*log.borrow(), vec!["open", "start", "stop", "close"]);
    }

    #[test]
    fn failed_start_still_closes() {
        let player = Player::new(config()).unwrap();
        let log = CallLog::default();
        let mut source = ScriptedSource::new([Step::Eof]);

        let err = player
            .play_with(opener(&log, true, false), &mut source, &ManualClock::new())
            .unwrap_err();

        assert!(matches!(err, PipeError::AudioStream(_)));
        assert_eq!(*log.borrow(), vec!["open", "start", "close"]);
        assert_eq!(source.polls(), 0);
    }

    #[test]
    fn failed_stop_does_not_skip_close() {
        let player = Player::new(config()).unwrap();
        let log = CallLog::default();
        let mut source = ScriptedSource::new([Step::Eof]);

        let outcome = player
            .play_with(opener(&log, false, true), &mut source, &ManualClock::new())
            .unwrap();

        assert_eq!(outcome, Termination::Eof);
        assert_eq!(*log.borrow(), vec!["open", "start", "stop", "close"]);
    }

    #[test]
    fn failed_open_touches_nothing_else() {
        let player = Player::new(config()).unwrap();
        let mut source = ScriptedSource::new([Step::Eof]);

        let err = player
            .play_with(
                |_renderer| -> Result<RecordingSession> { Err(PipeError::NoDefaultOutputDevice) },
                &mut source,
                &ManualClock::new(),
            )
            .unwrap_err();

        assert!(matches!(err, PipeError::NoDefaultOutputDevice));
        assert_eq!(source.polls(), 0);
    }

    #[test]
    fn renderer_gets_format_silence() {
        let player = Player::new(PlayerConfig {
            sample_format: SampleFormat::S16,
            ..config()
        })
        .unwrap();
        let mut source = ScriptedSource::new([Step::Eof]);
        let blocks = Rc::new(RefCell::new(Vec::new()));
        let captured = Rc::clone(&blocks);

        player
            .play_with(
                move |renderer| {
                    let mut session = RecordingSession {
                        log: CallLog::default(),
                        renderer,
                        state: SessionState::Open,
                        fail_start: false,
                        fail_stop: false,
                        blocks: captured,
                        block_bytes: 8,
                    };
                    session.render_block();
                    Ok(session)
                },
                &mut source,
                &ManualClock::new(),
            )
            .unwrap();

        assert_eq!(blocks.borrow()[0], vec![0u8; 8]);
    }

    #[test]
    fn timeout_comes_from_config() {
        let player = Player::new(PlayerConfig {
            idle_timeout: Some(Duration::from_millis(1)),
            ..config()
        })
        .unwrap();
        let log = CallLog::default();
        let mut source = ScriptedSource::default();

        let outcome = player
            .play_with(opener(&log, false, false), &mut source, &ManualClock::new())
            .unwrap();

        assert_eq!(outcome, Termination::TimedOut);
    }
}
