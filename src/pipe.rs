//! Bounded in-memory byte pipe
//!
//! Connects the archive writer thread to the consumer. Bytes written to the
//! [`PipeWriter`] come out of the [`PipeReader`] in the same order. The pipe
//! holds at most `capacity` chunks of `chunk_size` bytes: a full pipe blocks
//! the writer, an empty one blocks the reader.
//!
//! The writer ends the stream one of three ways:
//! - [`PipeWriter::close`]: the reader drains what is buffered, then sees EOF
//! - [`PipeWriter::fail`]: the reader drains what is buffered, then gets an error
//! - dropped without either: treated as a failure, so a panicking producer
//!   never looks like a finished one
//!
//! Closing or dropping the reader cancels the writer: its next write fails
//! with `BrokenPipe` instead of blocking forever.

use crate::error::BundleError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

enum Chunk {
    Data(Vec<u8>),
    Failed { kind: io::ErrorKind, message: String },
}

/// Create a connected writer/reader pair
pub fn pipe(capacity: usize, chunk_size: usize) -> (PipeWriter, PipeReader) {
    let (sender, receiver) = bounded(capacity.max(1));
    let cancelled = Arc::new(AtomicBool::new(false));
    let chunk_size = chunk_size.max(1);

    (
        PipeWriter {
            sender: Some(sender),
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            bytes_written: 0,
            cancelled: Arc::clone(&cancelled),
        },
        PipeReader {
            receiver: Some(receiver),
            current: Vec::new(),
            position: 0,
            failure: None,
            cancelled,
        },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "bundle stream reader was closed")
}

/// Producer end of the pipe
pub struct PipeWriter {
    sender: Option<Sender<Chunk>>,
    buffer: Vec<u8>,
    chunk_size: usize,
    bytes_written: u64,
    cancelled: Arc<AtomicBool>,
}

impl PipeWriter {
    /// Whether the reader has gone away
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Total bytes accepted by `write`
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn send(&mut self, chunk: Chunk) -> io::Result<()> {
        let sender = self.sender.as_ref().ok_or_else(broken_pipe)?;
        sender.send(chunk).map_err(|_| {
            self.cancelled.store(true, Ordering::Release);
            broken_pipe()
        })
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.send(Chunk::Data(chunk))
    }

    /// Flush buffered bytes and signal end of stream
    pub fn close(mut self) -> io::Result<()> {
        let result = self.send_buffered();
        self.sender = None;
        result
    }

    /// Flush buffered bytes and end the stream with an error
    pub fn fail(mut self, err: &BundleError) {
        let kind = match err {
            BundleError::Io(inner) => inner.kind(),
            BundleError::Cancelled => io::ErrorKind::BrokenPipe,
            _ => io::ErrorKind::Other,
        };
        // The reader may already be gone; nothing left to tell it then
        let _ = self.send_buffered();
        let _ = self.send(Chunk::Failed {
            kind,
            message: err.to_string(),
        });
        self.sender = None;
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_cancelled() {
            return Err(broken_pipe());
        }

        let room = self.chunk_size - self.buffer.len();
        let take = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..take]);
        if self.buffer.len() == self.chunk_size {
            self.send_buffered()?;
        }

        self.bytes_written += take as u64;
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.sender.is_some() {
            let _ = self.send(Chunk::Failed {
                kind: io::ErrorKind::UnexpectedEof,
                message: "bundle writer stopped before closing the stream".to_string(),
            });
        }
    }
}

/// Consumer end of the pipe
pub struct PipeReader {
    receiver: Option<Receiver<Chunk>>,
    current: Vec<u8>,
    position: usize,
    failure: Option<(io::ErrorKind, String)>,
    cancelled: Arc<AtomicBool>,
}

impl PipeReader {
    /// Stop consuming; the writer's next write fails
    pub fn close(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.receiver = None;
        self.current = Vec::new();
        self.position = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_none() && self.position >= self.current.len()
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.position < self.current.len() {
                let available = &self.current[self.position..];
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.position += n;
                return Ok(n);
            }

            if let Some((kind, message)) = &self.failure {
                return Err(io::Error::new(*kind, message.clone()));
            }

            let Some(receiver) = self.receiver.as_ref() else {
                return Ok(0);
            };

            match receiver.recv() {
                Ok(Chunk::Data(data)) => {
                    self.current = data;
                    self.position = 0;
                }
                Ok(Chunk::Failed { kind, message }) => {
                    self.receiver = None;
                    self.failure = Some((kind, message));
                }
                Err(_) => {
                    // Writer closed cleanly
                    self.receiver = None;
                    return Ok(0);
                }
            }
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
