//! Non-blocking byte sources for the reader loop.
//!
//! The loop asks [`InputSource::poll_ready`] before every read and only reads
//! when the answer is yes, so a read never waits for data.
//!
//! [`PipeReader`] gets there without platform readiness syscalls: a dedicated
//! thread performs the blocking reads and hands chunks over a bounded
//! crossbeam channel, and the loop side only ever calls `try_recv`.

pub mod scripted;

use std::io::{self, Read};
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{debug, warn};

/// Bytes requested from the underlying reader per blocking read.
const READ_CHUNK: usize = 4096;

/// Chunks buffered between the reader thread and the loop.
const CHANNEL_CAP: usize = 16;

/// Contract for the producer's input.
pub trait InputSource {
    /// Whether the next `read` returns without blocking.
    ///
    /// End of input and read errors count as ready: the following `read`
    /// reports them.
    fn poll_ready(&mut self) -> io::Result<bool>;

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of input.
    ///
    /// Only called after `poll_ready` returned `true`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

enum Chunk {
    Data(Vec<u8>),
    Eof,
    Failed(io::Error),
}

/// Input drained by a background thread.
pub struct PipeReader {
    rx: Receiver<Chunk>,
    pending: Vec<u8>,
    cursor: usize,
    eof: bool,
    failure: Option<io::Error>,
}

impl PipeReader {
    /// Read the process's standard input.
    pub fn stdin() -> io::Result<Self> {
        Self::spawn(io::stdin())
    }

    /// Start a thread draining `reader` into the channel.
    ///
    /// The thread ends at end of input, on a read error, or once this
    /// `PipeReader` is dropped and its next chunk has nowhere to go.
    pub fn spawn<R>(mut reader: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded(CHANNEL_CAP);

        thread::Builder::new()
            .name("pipeplay-input".into())
            .spawn(move || {
                let mut buf = vec![0u8; READ_CHUNK];
                loop {
                    let chunk = match reader.read(&mut buf) {
                        Ok(0) => Chunk::Eof,
                        Ok(n) => Chunk::Data(buf[..n].to_vec()),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Chunk::Failed(e),
                    };
                    let last = !matches!(chunk, Chunk::Data(_));
                    if tx.send(chunk).is_err() || last {
                        debug!("input thread exiting");
                        return;
                    }
                }
            })?;

        Ok(Self {
            rx,
            pending: Vec::new(),
            cursor: 0,
            eof: false,
            failure: None,
        })
    }

    fn has_pending(&self) -> bool {
        self.cursor < self.pending.len()
    }
}

impl InputSource for PipeReader {
    fn poll_ready(&mut self) -> io::Result<bool> {
        if self.has_pending() || self.eof || self.failure.is_some() {
            return Ok(true);
        }
        match self.rx.try_recv() {
            Ok(Chunk::Data(bytes)) => {
                self.pending = bytes;
                self.cursor = 0;
            }
            Ok(Chunk::Eof) => self.eof = true,
            Ok(Chunk::Failed(e)) => self.failure = Some(e),
            Err(TryRecvError::Empty) => return Ok(false),
            Err(TryRecvError::Disconnected) => {
                warn!("input thread went away without reporting end of input");
                self.eof = true;
            }
        }
        Ok(true)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.has_pending() {
            let n = buf.len().min(self.pending.len() - self.cursor);
            buf[..n].copy_from_slice(&self.pending[self.cursor..self.cursor + n]);
            self.cursor += n;
            return Ok(n);
        }
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        if self.eof {
            return Ok(0);
        }
        Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "read without a successful readiness poll",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn poll_until_ready(source: &mut PipeReader) {
        let start = Instant::now();
        while !source.poll_ready().unwrap() {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "input thread never delivered"
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn delivers_bytes_then_eof() {
        let mut source = PipeReader::spawn(io::Cursor::new(vec![1u8, 2, 3, 4, 5])).unwrap();
        let mut collected = Vec::new();
        let mut buf = [0u8; 2];

        loop {
            poll_until_ready(&mut source);
            let n = source.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }

        assert_eq!(collected, vec![1, 2, 3, 4, 5]);
        // End of input stays sticky.
        assert!(source.poll_ready().unwrap());
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe torn down"))
        }
    }

    #[test]
    fn surfaces_read_errors() {
        let mut source = PipeReader::spawn(FailingReader).unwrap();
        poll_until_ready(&mut source);
        let err = source.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
