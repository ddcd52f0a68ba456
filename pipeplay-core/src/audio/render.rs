//! The realtime consumer: fills device buffers from the frame ring.

use std::sync::{atomic::Ordering, Arc};

use crate::{buffering::FrameConsumer, engine::pipeline::PipelineDiagnostics};

/// The one operation a stream backend needs from the core.
///
/// Called on the backend's realtime thread. Implementations must not block,
/// allocate, or perform I/O.
pub trait FillOutput: Send {
    /// Fill `out` completely with interleaved PCM bytes.
    ///
    /// Returns the number of frames taken from real input; the remainder of
    /// `out` is silence.
    fn fill(&mut self, out: &mut [u8]) -> usize;
}

/// Drains the frame ring into output blocks, padding shortfalls with the
/// format's silence byte.
///
/// This is the ring's only reader. Playback never asks the stream to stop
/// from here; the non-realtime side owns the stream's lifetime.
pub struct FrameRenderer {
    consumer: FrameConsumer,
    silence: u8,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl FrameRenderer {
    pub fn new(
        consumer: FrameConsumer,
        silence: u8,
        diagnostics: Arc<PipelineDiagnostics>,
    ) -> Self {
        Self {
            consumer,
            silence,
            diagnostics,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.consumer.frame_size()
    }

    pub fn silence_byte(&self) -> u8 {
        self.silence
    }
}

impl FillOutput for FrameRenderer {
    fn fill(&mut self, out: &mut [u8]) -> usize {
        let frame_size = self.consumer.frame_size();
        let block_frames = out.len() / frame_size;
        let wanted = block_frames.min(self.consumer.read_available());

        let frames = self.consumer.read(out, wanted);
        let real_bytes = frames * frame_size;
        out[real_bytes..].fill(self.silence);

        let d = &self.diagnostics;
        d.callbacks.fetch_add(1, Ordering::Relaxed);
        d.frames_rendered.fetch_add(frames, Ordering::Relaxed);
        if frames < block_frames {
            d.silence_frames
                .fetch_add(block_frames - frames, Ordering::Relaxed);
            d.underrun_callbacks.fetch_add(1, Ordering::Relaxed);
        }

        frames
    }
}
