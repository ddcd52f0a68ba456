//! Staging area for one frame assembled from arbitrary-sized input reads.

use crate::error::{PipeError, Result};

/// Holds the bytes of a frame that has not been completely read yet.
///
/// Owned exclusively by the stdin reader. Its length goes back to zero as
/// soon as a completed frame is committed to the ring.
#[derive(Debug)]
pub struct StagingFrame {
    bytes: Box<[u8]>,
    filled: usize,
}

impl StagingFrame {
    /// Allocate room for one frame of `frame_size` bytes.
    ///
    /// # Errors
    /// `PipeError::Allocation` when the reservation fails.
    pub fn new(frame_size: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(frame_size)
            .map_err(|e| PipeError::Allocation {
                what: "pipe buffer",
                detail: e.to_string(),
            })?;
        bytes.resize(frame_size, 0);
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
            filled: 0,
        })
    }

    /// Bytes staged so far.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.bytes.len()
    }

    /// The not-yet-filled tail, for the next read to land in.
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.filled..]
    }

    /// Record that `n` bytes were read into [`Self::unfilled_mut`].
    pub fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.bytes.len());
    }

    /// The completed frame.
    pub fn frame(&self) -> &[u8] {
        &self.bytes[..self.filled]
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_frame_from_short_reads() {
        let mut staging = StagingFrame::new(4).unwrap();
        assert!(staging.is_empty());

        staging.unfilled_mut()[..1].copy_from_slice(&[7]);
        staging.advance(1);
        assert_eq!(staging.unfilled_mut().len(), 3);
        assert!(!staging.is_complete());

        staging.unfilled_mut().copy_from_slice(&[8, 9, 10]);
        staging.advance(3);
        assert!(staging.is_complete());
        assert_eq!(staging.frame(), &[7, 8, 9, 10]);

        staging.clear();
        assert_eq!(staging.len(), 0);
        assert_eq!(staging.unfilled_mut().len(), 4);
    }

    #[test]
    fn advance_saturates_at_frame_size() {
        let mut staging = StagingFrame::new(2).unwrap();
        staging.advance(5);
        assert_eq!(staging.len(), 2);
        assert!(staging.is_complete());
    }
}
