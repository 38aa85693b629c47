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

//! `aws-chunked` content encoding.
//!
//! A [`ChunkedEncodingStream`] turns a payload into a sequence of framed
//! chunks, each optionally carrying a signature chained to the previous one:
//!
//! ```text
//! <hex length>;chunk-signature=<signature>\r\n
//! <bytes>\r\n
//! ...
//! 0;chunk-signature=<signature>\r\n
//! [<checksum header>:<value>\r\n]
//! [x-amz-trailer-signature:<signature>\r\n]
//! \r\n
//! ```

use crate::body::{reset_without_mark, Rewind, Source, DEFAULT_MAX_BUFFER_SIZE};
use crate::hash::PayloadDigest;
use crate::{Error, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt::{self, Debug};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

/// Default size of one chunk: 128 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Trailer line carrying the signature of the trailing headers.
pub const TRAILER_SIGNATURE_HEADER: &str = "x-amz-trailer-signature";

const CHUNK_SIGNATURE_HEADER: &str = ";chunk-signature=";
const CRLF: &[u8] = b"\r\n";

/// Signs chunks of a chunk-encoded body.
///
/// Implementations hold the signing key, date and scope of the request the
/// body belongs to. Anything fallible about key setup must happen when the
/// signer is built, so that signing itself only fails on broken input.
pub trait SignChunk: Debug + Send + Sync + 'static {
    /// Sign one chunk, chained to the signature of the previous chunk (or the
    /// request signature for the first chunk).
    fn sign_chunk(&self, chunk: &[u8], previous_signature: &str) -> Result<String>;

    /// Sign the canonical trailing headers (`name:value\n` lines).
    fn sign_trailer(&self, canonical_trailers: &str, previous_signature: &str) -> Result<String>;

    /// Length of every signature produced by this signer.
    fn signature_length(&self) -> usize;
}

/// Checksum sent as a trailer after the last chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    /// `x-amz-checksum-sha256`
    Sha256,
    /// `x-amz-checksum-sha1`
    Sha1,
    /// `x-amz-checksum-crc32`
    Crc32,
    /// `x-amz-checksum-crc32c`
    Crc32c,
}

impl ChecksumAlgorithm {
    /// Name of the trailing header.
    pub fn header_name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "x-amz-checksum-sha256",
            ChecksumAlgorithm::Sha1 => "x-amz-checksum-sha1",
            ChecksumAlgorithm::Crc32 => "x-amz-checksum-crc32",
            ChecksumAlgorithm::Crc32c => "x-amz-checksum-crc32c",
        }
    }

    /// Length of the base64 encoded checksum value.
    pub fn encoded_length(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 => 44,
            ChecksumAlgorithm::Sha1 => 28,
            ChecksumAlgorithm::Crc32 | ChecksumAlgorithm::Crc32c => 8,
        }
    }

    fn digest(&self) -> PayloadDigest {
        match self {
            ChecksumAlgorithm::Sha256 => PayloadDigest::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha1 => PayloadDigest::Sha1(Sha1::new()),
            ChecksumAlgorithm::Crc32 => PayloadDigest::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32c => PayloadDigest::Crc32c(0),
        }
    }
}

/// Sizes used when chunk-encoding a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkedEncodingConfig {
    /// Payload bytes per chunk.
    pub chunk_size: usize,
    /// Bytes kept for replay when the source can't rewind itself.
    /// Must be at least `chunk_size`.
    pub max_buffer_size: usize,
}

impl Default for ChunkedEncodingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl ChunkedEncodingConfig {
    /// Create a validated config.
    pub fn new(chunk_size: usize, max_buffer_size: usize) -> Result<Self> {
        let cfg = Self {
            chunk_size,
            max_buffer_size,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the invariants between the sizes.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config_invalid("chunk size must be greater than 0"));
        }
        if self.max_buffer_size < self.chunk_size {
            return Err(Error::config_invalid(format!(
                "max buffer size {} must not be smaller than chunk size {}",
                self.max_buffer_size, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn hex_len(n: u64) -> u64 {
    if n == 0 {
        1
    } else {
        (64 - n.leading_zeros() as u64).div_ceil(4)
    }
}

/// Wire length of one signed chunk carrying `chunk_length` payload bytes.
pub fn calculate_signed_chunk_length(chunk_length: u64, signature_length: usize) -> u64 {
    hex_len(chunk_length)
        + CHUNK_SIGNATURE_HEADER.len() as u64
        + signature_length as u64
        + CRLF.len() as u64
        + chunk_length
        + CRLF.len() as u64
}

/// Wire length of one unsigned chunk carrying `chunk_length` payload bytes.
pub fn calculate_unsigned_chunk_length(chunk_length: u64) -> u64 {
    hex_len(chunk_length) + CRLF.len() as u64 + chunk_length + CRLF.len() as u64
}

/// Wire length of the trailer block, including the closing CRLF.
pub fn calculate_trailer_length(
    checksum: ChecksumAlgorithm,
    signature_length: Option<usize>,
) -> u64 {
    let mut len = checksum.header_name().len() + 1 + checksum.encoded_length() + CRLF.len();
    if let Some(sig) = signature_length {
        len += TRAILER_SIGNATURE_HEADER.len() + 1 + sig + CRLF.len();
    }
    (len + CRLF.len()) as u64
}

/// Exact wire length of a signed chunk-encoded stream without trailers.
///
/// ```
/// use reqflow_core::chunked::calculate_stream_content_length;
///
/// assert_eq!(calculate_stream_content_length(10, 144, 128 * 1024).unwrap(), 342);
/// ```
pub fn calculate_stream_content_length(
    original_length: u64,
    signature_length: usize,
    chunk_size: usize,
) -> Result<u64> {
    calculate_encoded_length(original_length, chunk_size, Some(signature_length), None)
}

/// Exact wire length of a chunk-encoded stream.
///
/// `signature_length` is `None` for unsigned chunks.
pub fn calculate_encoded_length(
    original_length: u64,
    chunk_size: usize,
    signature_length: Option<usize>,
    checksum: Option<ChecksumAlgorithm>,
) -> Result<u64> {
    if chunk_size == 0 {
        return Err(Error::config_invalid("chunk size must be greater than 0"));
    }
    let chunk_len = |n: u64| match signature_length {
        Some(sig) => calculate_signed_chunk_length(n, sig),
        None => calculate_unsigned_chunk_length(n),
    };

    let chunk_size = chunk_size as u64;
    let full_chunks = original_length / chunk_size;
    let remaining = original_length % chunk_size;

    let mut total = full_chunks * chunk_len(chunk_size);
    if remaining > 0 {
        total += chunk_len(remaining);
    }
    total += match checksum {
        None => chunk_len(0),
        Some(alg) => chunk_len(0) - CRLF.len() as u64 + calculate_trailer_length(alg, signature_length),
    };
    Ok(total)
}

fn signing_error(err: Error) -> io::Error {
    io::Error::other(Error::transport("failed to sign chunk").with_source(err))
}

/// Chunk-encoded view over a payload source.
///
/// The rewind strategy is fixed at construction: [`ChunkedEncodingStream::new`]
/// delegates to a source that rewinds itself, [`ChunkedEncodingStream::from_reader`]
/// keeps a replay buffer for a plain reader. Rewinding is only possible back to
/// the very start of the stream.
pub struct ChunkedEncodingStream {
    source: Source,
    chunk_size: usize,
    signer: Option<Arc<dyn SignChunk>>,
    seed_signature: String,
    previous_signature: String,
    checksum: Option<(ChecksumAlgorithm, PayloadDigest)>,
    current: Cursor<Vec<u8>>,
    is_at_start: bool,
    is_terminating: bool,
    marked: bool,
}

impl ChunkedEncodingStream {
    /// Encode a source that rewinds itself.
    pub fn new(source: impl Rewind, config: ChunkedEncodingConfig) -> Result<Self> {
        Self::with_source(Source::Delegate(Box::new(source)), config)
    }

    /// Encode a reader that can only be read once.
    ///
    /// A replay buffer of up to `max_buffer_size` bytes is allocated on `mark`.
    pub fn from_reader(
        reader: impl Read + Send + 'static,
        config: ChunkedEncodingConfig,
    ) -> Result<Self> {
        Self::with_source(
            Source::Buffer {
                reader: Box::new(reader),
                replay: None,
                max_buffer_size: config.max_buffer_size,
            },
            config,
        )
    }

    fn with_source(source: Source, config: ChunkedEncodingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            chunk_size: config.chunk_size,
            signer: None,
            seed_signature: String::new(),
            previous_signature: String::new(),
            checksum: None,
            current: Cursor::new(Vec::new()),
            is_at_start: true,
            is_terminating: false,
            marked: false,
        })
    }

    /// Sign every chunk, starting the chain from `seed_signature`.
    pub fn with_signer(mut self, signer: Arc<dyn SignChunk>, seed_signature: impl Into<String>) -> Self {
        self.seed_signature = seed_signature.into();
        self.previous_signature = self.seed_signature.clone();
        self.signer = Some(signer);
        self
    }

    /// Send a checksum of the payload as a trailer.
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some((algorithm, algorithm.digest()));
        self
    }

    /// Wire length of this stream for a payload of `decoded_length` bytes.
    pub fn encoded_length(&self, decoded_length: u64) -> Result<u64> {
        calculate_encoded_length(
            decoded_length,
            self.chunk_size,
            self.signer.as_ref().map(|s| s.signature_length()),
            self.checksum.as_ref().map(|(alg, _)| *alg),
        )
    }

    /// Pull up to one chunk of payload, reading until full or end of source.
    fn fill_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut data = vec![0; self.chunk_size];
        let mut filled = 0;
        while filled < data.len() {
            match self.source.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        data.truncate(filled);
        Ok(data)
    }

    fn next_chunk(&mut self) -> io::Result<Vec<u8>> {
        self.is_at_start = false;
        let data = self.fill_chunk()?;
        if data.is_empty() {
            let out = self.terminal_chunk()?;
            self.is_terminating = true;
            return Ok(out);
        }
        if let Some((_, digest)) = &mut self.checksum {
            digest.update(&data);
        }
        self.frame_chunk(&data)
    }

    fn frame_chunk(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() + 96);
        out.extend_from_slice(format!("{:x}", data.len()).as_bytes());
        if let Some(signer) = &self.signer {
            let signature = signer
                .sign_chunk(data, &self.previous_signature)
                .map_err(signing_error)?;
            out.extend_from_slice(CHUNK_SIGNATURE_HEADER.as_bytes());
            out.extend_from_slice(signature.as_bytes());
            self.previous_signature = signature;
        }
        out.extend_from_slice(CRLF);
        out.extend_from_slice(data);
        out.extend_from_slice(CRLF);
        Ok(out)
    }

    fn terminal_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut out = self.frame_chunk(&[])?;
        let Some((algorithm, digest)) = &mut self.checksum else {
            return Ok(out);
        };

        // Trailers replace the CRLF that closes the empty chunk.
        out.truncate(out.len() - CRLF.len());
        let trailer = format!("{}:{}", algorithm.header_name(), digest.finalize_base64());
        out.extend_from_slice(trailer.as_bytes());
        out.extend_from_slice(CRLF);

        if let Some(signer) = &self.signer {
            let signature = signer
                .sign_trailer(&format!("{trailer}\n"), &self.previous_signature)
                .map_err(signing_error)?;
            out.extend_from_slice(format!("{TRAILER_SIGNATURE_HEADER}:{signature}").as_bytes());
            out.extend_from_slice(CRLF);
            self.previous_signature = signature;
        }
        out.extend_from_slice(CRLF);
        Ok(out)
    }
}

impl Debug for ChunkedEncodingStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedEncodingStream")
            .field("chunk_size", &self.chunk_size)
            .field("signed", &self.signer.is_some())
            .field("checksum", &self.checksum.as_ref().map(|(alg, _)| alg))
            .field("is_at_start", &self.is_at_start)
            .field("is_terminating", &self.is_terminating)
            .finish_non_exhaustive()
    }
}

impl Read for ChunkedEncodingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.current.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            if self.is_terminating {
                return Ok(0);
            }
            self.current = Cursor::new(self.next_chunk()?);
        }
    }
}

impl Rewind for ChunkedEncodingStream {
    fn mark(&mut self) -> io::Result<()> {
        if !self.is_at_start {
            return Err(io::Error::other(Error::stream_contract(
                "chunk-encoded streams only support mark() at the start of the stream",
            )));
        }
        self.source.mark()?;
        self.marked = true;
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        if !self.marked {
            return Err(reset_without_mark());
        }
        self.source.reset()?;
        self.previous_signature = self.seed_signature.clone();
        self.current = Cursor::new(Vec::new());
        if let Some((_, digest)) = &mut self.checksum {
            digest.reset();
        }
        self.is_at_start = true;
        self.is_terminating = false;
        Ok(())
    }
}
