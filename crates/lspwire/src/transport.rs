//! Duplex frame transport over a peer's byte streams.
//!
//! The reading half is owned by the dispatch thread; the writing half is
//! shared by every caller and serialises whole frames behind a mutex.

use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::{Mutex, MutexGuard};

use crate::codec::FrameCodec;
use crate::errors::TransportError;

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

/// Reads and writes framed messages over a connected peer's streams.
pub struct Transport {
    reader: FrameReader,
    writer: FrameWriter,
}

impl Transport {
    /// Creates a transport from the peer's output (`reader`) and input
    /// (`writer`).
    #[must_use]
    pub fn new<R, W>(reader: R, writer: W, codec: FrameCodec) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            reader: FrameReader::new(Box::new(reader), codec),
            writer: FrameWriter::new(Box::new(writer)),
        }
    }

    /// Sends one payload.
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::send`].
    pub fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.writer.send(payload)
    }

    /// Receives one payload.
    ///
    /// # Errors
    ///
    /// See [`FrameReader::receive`].
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.reader.receive()
    }

    /// Separates the reading and writing halves.
    #[must_use]
    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

/// Reading half of a [`Transport`].
pub struct FrameReader {
    inner: BufReader<BoxedReader>,
    codec: FrameCodec,
}

impl FrameReader {
    /// Wraps a byte stream.
    #[must_use]
    pub fn new(reader: BoxedReader, codec: FrameCodec) -> Self {
        Self {
            inner: BufReader::new(reader),
            codec,
        }
    }

    /// Receives one payload, blocking until it is complete.
    ///
    /// Returns `Ok(None)` when the peer closes its output between frames.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Framing` for malformed headers,
    /// `TransportError::StreamClosed` when the stream ends mid-frame, and
    /// `TransportError::Io` if reading fails.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.codec.read_frame(&mut self.inner)
    }
}

/// Writing half of a [`Transport`]; safe to share between threads.
pub struct FrameWriter {
    inner: Mutex<Option<BufWriter<BoxedWriter>>>,
}

impl FrameWriter {
    /// Wraps a byte sink.
    #[must_use]
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Mutex::new(Some(BufWriter::new(writer))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<BufWriter<BoxedWriter>>> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Writes one complete frame and flushes it.
    ///
    /// Concurrent callers are serialised, so frames never interleave.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::WriterClosed` after [`close`](Self::close) and
    /// `TransportError::Io` if writing fails.
    pub fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(TransportError::WriterClosed)?;
        FrameCodec::write_frame(writer, payload)
    }

    /// Flushes and drops the underlying sink, closing the peer's input.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the final flush fails; the sink is
    /// dropped regardless.
    pub fn close(&self) -> Result<(), TransportError> {
        let writer = self.lock().take();
        match writer {
            Some(mut writer) => writer.flush().map_err(TransportError::from),
            None => Ok(()),
        }
    }

    /// True once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}
