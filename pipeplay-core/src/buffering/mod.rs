//! Lock-free SPSC ring buffer of PCM frames.
//!
//! Backed by `ringbuf::HeapRb<u8>`, whose producer and consumer halves publish
//! their indices atomically and never lock. The wrappers below only ever move
//! whole frames, so the byte counts seen on either side stay frame-aligned and
//! every count they report is in frames.
//!
//! Exactly one thread may hold the [`FrameProducer`] (the stdin reader) and
//! exactly one the [`FrameConsumer`] (the audio callback).

pub mod staging;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use crate::error::{PipeError, Result};

/// Smallest power of two that is `>= v`.
///
/// Smears the highest set bit of `v - 1` into every lower bit, then adds one.
/// Returns `None` for zero and when the result does not fit in a `usize`.
pub fn next_power_of_two(v: usize) -> Option<usize> {
    if v == 0 {
        return None;
    }
    let mut v = v - 1;
    let mut shift = 1;
    while shift < usize::BITS {
        v |= v >> shift;
        shift <<= 1;
    }
    v.checked_add(1)
}

/// Writing half of the frame ring. Held by the stdin reader.
pub struct FrameProducer {
    inner: ringbuf::HeapProd<u8>,
    frame_size: usize,
}

/// Reading half of the frame ring. Held by the audio callback.
pub struct FrameConsumer {
    inner: ringbuf::HeapCons<u8>,
    frame_size: usize,
}

impl std::fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProducer")
            .field("frame_size", &self.frame_size)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for FrameConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameConsumer")
            .field("frame_size", &self.frame_size)
            .finish_non_exhaustive()
    }
}

impl FrameProducer {
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total capacity in frames.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get() / self.frame_size
    }

    /// Frames that can be written without overwriting unread data.
    pub fn write_available(&self) -> usize {
        self.inner.vacant_len() / self.frame_size
    }

    /// Frames written but not yet read.
    pub fn read_available(&self) -> usize {
        self.inner.occupied_len() / self.frame_size
    }

    /// Copy up to `frames` whole frames from `src`.
    ///
    /// Callers keep `frames` within the last observed `write_available()`.
    /// Returns the number of frames copied.
    pub fn write(&mut self, src: &[u8], frames: usize) -> usize {
        let bytes = frames
            .saturating_mul(self.frame_size)
            .min(whole_frames(src.len(), self.frame_size));
        self.inner.push_slice(&src[..bytes]) / self.frame_size
    }
}

impl FrameConsumer {
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total capacity in frames.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get() / self.frame_size
    }

    pub fn write_available(&self) -> usize {
        self.inner.vacant_len() / self.frame_size
    }

    pub fn read_available(&self) -> usize {
        self.inner.occupied_len() / self.frame_size
    }

    /// Move up to `frames` whole frames into `dst`.
    ///
    /// Returns the number of frames copied.
    pub fn read(&mut self, dst: &mut [u8], frames: usize) -> usize {
        let bytes = frames
            .saturating_mul(self.frame_size)
            .min(whole_frames(dst.len(), self.frame_size));
        self.inner.pop_slice(&mut dst[..bytes]) / self.frame_size
    }
}

fn whole_frames(len: usize, frame_size: usize) -> usize {
    len - len % frame_size
}

/// Allocate a frame ring holding at least `min_frames` frames of
/// `frame_size` bytes each. The capacity is rounded up to a power of two.
pub fn create_frame_ring(
    frame_size: usize,
    min_frames: usize,
) -> Result<(FrameProducer, FrameConsumer)> {
    if frame_size == 0 {
        return Err(PipeError::InvalidConfig("frame size must be positive".into()));
    }
    let frames = next_power_of_two(min_frames).ok_or_else(|| PipeError::Allocation {
        what: "ring buffer",
        detail: format!("no power-of-two capacity for {min_frames} frames"),
    })?;
    let bytes = frames
        .checked_mul(frame_size)
        .filter(|b| *b <= isize::MAX as usize)
        .ok_or_else(|| PipeError::Allocation {
            what: "ring buffer",
            detail: format!("{frames} frames of {frame_size} bytes overflow the address space"),
        })?;

    let (producer, consumer) = HeapRb::<u8>::try_new(bytes)
        .map_err(|e| PipeError::Allocation {
            what: "ring buffer",
            detail: format!("{bytes} bytes: {e}"),
        })?
        .split();
    Ok((
        FrameProducer {
            inner: producer,
            frame_size,
        },
        FrameConsumer {
            inner: consumer,
            frame_size,
        },
    ))
}
