//! `ScriptedSource`: deterministic input for exercising the reader loop.
//!
//! Replays a fixed list of steps: byte chunks, stretches where the input is
//! not ready, end of input, or an I/O failure. Once the script runs out the
//! source stays not-ready forever, which is what an idle pipe looks like.

use std::collections::VecDeque;
use std::io;

use super::InputSource;

/// One scripted input event.
#[derive(Debug)]
pub enum Step {
    /// Bytes that become readable, possibly over several reads.
    Data(Vec<u8>),
    /// This many readiness polls answer "not ready".
    Pending(usize),
    /// End of input.
    Eof,
    /// A read that fails with this error kind.
    Fail(io::ErrorKind),
    /// The readiness poll itself fails.
    PollFail(io::ErrorKind),
}

#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    polls: usize,
    reads: usize,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            polls: 0,
            reads: 0,
        }
    }

    /// Readiness polls answered so far.
    pub fn polls(&self) -> usize {
        self.polls
    }

    /// Successful or failed reads so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl InputSource for ScriptedSource {
    fn poll_ready(&mut self) -> io::Result<bool> {
        self.polls += 1;
        while is_drained(self.steps.front()) {
            self.steps.pop_front();
        }
        match self.steps.front_mut() {
            None => Ok(false),
            Some(Step::Pending(n)) => {
                *n -= 1;
                Ok(false)
            }
            Some(Step::PollFail(kind)) => {
                let kind = *kind;
                self.steps.pop_front();
                Err(io::Error::new(kind, "scripted poll failure"))
            }
            Some(_) => Ok(true),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        match self.steps.front_mut() {
            Some(Step::Data(bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                bytes.drain(..n);
                if bytes.is_empty() {
                    self.steps.pop_front();
                }
                Ok(n)
            }
            Some(Step::Eof) => Ok(0),
            Some(Step::Fail(kind)) => {
                let kind = *kind;
                self.steps.pop_front();
                Err(io::Error::new(kind, "scripted read failure"))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "read without a successful readiness poll",
            )),
        }
    }
}

fn is_drained(step: Option<&Step>) -> bool {
    match step {
        Some(Step::Pending(0)) => true,
        Some(Step::Data(bytes)) => bytes.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_steps_in_order() {
        let mut source = ScriptedSource::new([
            Step::Pending(1),
            Step::Data(vec![1, 2, 3]),
            Step::Eof,
        ]);
        let mut buf = [0u8; 2];

        assert!(!source.poll_ready().unwrap());
        assert!(source.poll_ready().unwrap());
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert!(source.poll_ready().unwrap());
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert!(source.poll_ready().unwrap());
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.polls(), 4);
        assert_eq!(source.reads(), 3);
    }

    #[test]
    fn exhausted_script_is_never_ready() {
        let mut source = ScriptedSource::new([Step::Data(vec![9])]);
        assert!(source.poll_ready().unwrap());
        assert_eq!(source.read(&mut [0u8; 4]).unwrap(), 1);
        assert!(!source.poll_ready().unwrap());
        assert!(!source.poll_ready().unwrap());
    }

    #[test]
    fn reports_failures() {
        let mut source = ScriptedSource::new([
            Step::PollFail(io::ErrorKind::Other),
            Step::Fail(io::ErrorKind::BrokenPipe),
        ]);
        assert!(source.poll_ready().is_err());
        assert!(source.poll_ready().unwrap());
        let err = source.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
