// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Request bodies and rewindable byte sources.

use crate::Error;
use bytes::Bytes;
use std::fmt::{self, Debug};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default limit of bytes kept for replaying a source that cannot rewind itself.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 256 * 1024;

/// A byte source that can go back to a previously marked position.
pub trait Rewind: Read + Send + 'static {
    /// Remember the current position.
    fn mark(&mut self) -> io::Result<()>;

    /// Go back to the position remembered by the last [`Rewind::mark`].
    ///
    /// Fails if `mark` was never called.
    fn reset(&mut self) -> io::Result<()>;
}

pub(crate) fn reset_without_mark() -> io::Error {
    io::Error::other(Error::stream_contract(
        "reset() called without a prior successful mark()",
    ))
}

/// Native rewind for anything that can seek, like files and cursors.
#[derive(Debug)]
pub struct SeekableSource<R> {
    inner: R,
    mark: Option<u64>,
}

impl<R: Read + Seek + Send + 'static> SeekableSource<R> {
    /// Wrap a seekable reader.
    pub fn new(inner: R) -> Self {
        Self { inner, mark: None }
    }
}

impl<R: Read> Read for SeekableSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek + Send + 'static> Rewind for SeekableSource<R> {
    fn mark(&mut self) -> io::Result<()> {
        self.mark = Some(self.inner.stream_position()?);
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        let pos = self.mark.ok_or_else(reset_without_mark)?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

/// Replay buffer of bytes already consumed from a source that cannot rewind.
///
/// Everything read after `mark` is recorded until `max_size` is exceeded,
/// after which the buffer is dropped and a later replay fails.
#[derive(Debug)]
pub struct DecodedStreamBuffer {
    buf: Vec<u8>,
    max_size: usize,
    pos: usize,
    overflowed: bool,
}

impl DecodedStreamBuffer {
    /// Create an empty buffer that holds at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_size,
            pos: 0,
            overflowed: false,
        }
    }

    fn has_remaining(&self) -> bool {
        !self.overflowed && self.pos < self.buf.len()
    }

    fn read_remaining(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn record(&mut self, data: &[u8]) {
        if self.overflowed {
            return;
        }
        if self.buf.len() + data.len() > self.max_size {
            self.overflowed = true;
            self.buf = Vec::new();
            self.pos = 0;
            return;
        }
        self.buf.extend_from_slice(data);
        self.pos = self.buf.len();
    }

    /// Forget everything before the current position.
    fn remark(&mut self) {
        self.buf.drain(..self.pos);
        self.pos = 0;
        self.overflowed = false;
    }

    fn start_replay(&mut self) -> io::Result<()> {
        if self.overflowed {
            return Err(io::Error::other(Error::stream_contract(format!(
                "cannot reset: more than {} bytes were read since mark()",
                self.max_size
            ))));
        }
        self.pos = 0;
        Ok(())
    }
}

/// How a body source goes back to its marked position.
pub(crate) enum Source {
    /// The source rewinds itself.
    Delegate(Box<dyn Rewind>),
    /// The source is read once; a replay buffer is allocated on `mark`.
    Buffer {
        reader: Box<dyn Read + Send>,
        replay: Option<DecodedStreamBuffer>,
        max_buffer_size: usize,
    },
}

impl Source {
    pub(crate) fn mark(&mut self) -> io::Result<()> {
        match self {
            Source::Delegate(s) => s.mark(),
            Source::Buffer {
                replay,
                max_buffer_size,
                ..
            } => {
                match replay {
                    Some(r) => r.remark(),
                    None => *replay = Some(DecodedStreamBuffer::new(*max_buffer_size)),
                }
                Ok(())
            }
        }
    }

    pub(crate) fn reset(&mut self) -> io::Result<()> {
        match self {
            Source::Delegate(s) => s.reset(),
            Source::Buffer { replay, .. } => match replay {
                Some(r) => r.start_replay(),
                None => Err(reset_without_mark()),
            },
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Delegate(s) => s.read(buf),
            Source::Buffer { reader, replay, .. } => {
                if let Some(r) = replay {
                    if r.has_remaining() {
                        return Ok(r.read_remaining(buf));
                    }
                }
                let n = reader.read(buf)?;
                if let Some(r) = replay {
                    r.record(&buf[..n]);
                }
                Ok(n)
            }
        }
    }
}

/// A streaming body shared by every attempt of one call.
///
/// Clones share the same source, so a `reset` through one handle rewinds
/// them all.
#[derive(Clone)]
pub struct StreamBody {
    source: Arc<Mutex<Source>>,
    content_length: Option<u64>,
}

impl StreamBody {
    /// Stream from a reader that can only be read once.
    ///
    /// Up to [`DEFAULT_MAX_BUFFER_SIZE`] bytes are kept after `mark` so the
    /// body can be replayed on retry.
    pub fn new(reader: impl Read + Send + 'static, content_length: Option<u64>) -> Self {
        Self::buffered(reader, content_length, DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Like [`StreamBody::new`] with a custom replay limit.
    pub fn buffered(
        reader: impl Read + Send + 'static,
        content_length: Option<u64>,
        max_buffer_size: usize,
    ) -> Self {
        Self::from_source(
            Source::Buffer {
                reader: Box::new(reader),
                replay: None,
                max_buffer_size,
            },
            content_length,
        )
    }

    /// Stream from a source that rewinds itself.
    pub fn rewindable(source: impl Rewind, content_length: Option<u64>) -> Self {
        Self::from_source(Source::Delegate(Box::new(source)), content_length)
    }

    /// Stream from a seekable reader such as a file.
    pub fn seekable<R: Read + Seek + Send + 'static>(
        reader: R,
        content_length: Option<u64>,
    ) -> Self {
        Self::rewindable(SeekableSource::new(reader), content_length)
    }

    fn from_source(source: Source, content_length: Option<u64>) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            content_length,
        }
    }

    /// Length of the stream if known upfront.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Source>> {
        self.source
            .lock()
            .map_err(|_| io::Error::other("stream body lock poisoned"))
    }

    /// Drain the rest of the stream into memory.
    pub fn read_to_bytes(&self) -> io::Result<Bytes> {
        let capacity = self.content_length.unwrap_or(0).min(16 * 1024 * 1024) as usize;
        let mut buf = Vec::with_capacity(capacity);
        self.lock()?.read_to_end(&mut buf)?;
        Ok(buf.into())
    }
}

impl Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl Read for StreamBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock()?.read(buf)
    }
}

impl Rewind for StreamBody {
    fn mark(&mut self) -> io::Result<()> {
        self.lock()?.mark()
    }

    fn reset(&mut self) -> io::Result<()> {
        self.lock()?.reset()
    }
}

/// Body of an outgoing request.
#[derive(Clone, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Body held in memory.
    Bytes(Bytes),
    /// Streaming body.
    Stream(StreamBody),
}

impl Body {
    /// Length of the body if known upfront.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Bytes(bs) => Some(bs.len() as u64),
            Body::Stream(s) => s.content_length(),
        }
    }

    /// In-memory content, `None` for streams.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Empty => Some(&[]),
            Body::Bytes(bs) => Some(bs),
            Body::Stream(_) => None,
        }
    }

    /// Check if this body is streamed.
    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    /// Remember the current position of a streaming body. No-op in memory.
    pub fn mark(&self) -> io::Result<()> {
        match self {
            Body::Stream(s) => s.lock()?.mark(),
            _ => Ok(()),
        }
    }

    /// Rewind a streaming body to its mark. No-op in memory.
    pub fn reset(&self) -> io::Result<()> {
        match self {
            Body::Stream(s) => s.lock()?.reset(),
            _ => Ok(()),
        }
    }

    /// Collect the body into memory.
    pub fn read_to_bytes(&self) -> io::Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes(bs) => Ok(bs.clone()),
            Body::Stream(s) => s.read_to_bytes(),
        }
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bs) => write!(f, "Bytes({} bytes)", bs.len()),
            Body::Stream(s) => s.fmt(f),
        }
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(value.into())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Bytes(value.into())
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(value: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(value))
    }
}

impl From<StreamBody> for Body {
    fn from(value: StreamBody) -> Self {
        Body::Stream(value)
    }
}
