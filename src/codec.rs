//! Chunk framing, nonce schedule and associated data.
//!
//! After the [header](crate::header) a stream is a sequence of chunks:
//!
//! ```text
//! [u32 BE: final flag (bit 31) | plaintext length][ciphertext][16 byte tag]
//! ```
//!
//! Every chunk but the last carries exactly `chunk_size` bytes of plaintext.
//! The last chunk carries the final flag and between zero and `chunk_size`
//! bytes. The nonce of chunk `i` is the stream's base nonce with its trailing
//! eight bytes XORed with `i` (big-endian), and the associated data is
//! `header ‖ i (u64 BE) ‖ final (one byte)`. Reordering, dropping, or
//! splicing chunks across streams therefore fails authentication, while
//! cutting the stream short is caught because no final chunk arrives.
//!
//! [`Encoder`] and [`Decoder`] do no IO themselves. The [`Writer`] and
//! [`Reader`] types drive them from synchronous or asynchronous IO.
//!
//! [`Writer`]: crate::Writer
//! [`Reader`]: crate::Reader

use std::io::ErrorKind;

use tracing::{debug, trace, warn};

use crate::error::{FramingError, StreamError};
use crate::header::{Header, HEADER_SIZE};
use crate::key::Key;
use crate::primitive::{CipherSuite, Primitive};
use crate::{NONCE_SIZE, TAG_SIZE};

pub const LENGTH_SIZE: usize = 4;
const FINAL_FLAG: u32 = 1 << 31;
const LENGTH_MASK: u32 = FINAL_FLAG - 1;
const AAD_SIZE: usize = HEADER_SIZE + 8 + 1;

fn chunk_nonce(base: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    for (n, i) in nonce[NONCE_SIZE - 8..].iter_mut().zip(index.to_be_bytes()) {
        *n ^= i;
    }
    nonce
}

fn chunk_aad(header: &[u8; HEADER_SIZE], index: u64, last: bool) -> [u8; AAD_SIZE] {
    let mut aad = [0u8; AAD_SIZE];
    aad[..HEADER_SIZE].copy_from_slice(header);
    aad[HEADER_SIZE..HEADER_SIZE + 8].copy_from_slice(&index.to_be_bytes());
    aad[AAD_SIZE - 1] = u8::from(last);
    aad
}

/// Seals plaintext chunks for one stream.
#[derive(Debug)]
pub struct Encoder {
    primitive: Primitive,
    base_nonce: [u8; NONCE_SIZE],
    header: [u8; HEADER_SIZE],
    chunk_size: usize,
    index: u64,
    finished: bool,
}

impl Encoder {
    /// Starts a new stream with a fresh salt. `chunk_size` must already be
    /// validated against [`MAX_CHUNK_SIZE`](crate::MAX_CHUNK_SIZE).
    pub fn new(key: &Key, suite: CipherSuite, chunk_size: usize) -> Self {
        let header = Header::generate(suite, chunk_size as u32);
        let (primitive, base_nonce) = header.derive(key.as_bytes());
        debug!(%suite, chunk_size, "starting encrypted stream");
        Self {
            primitive,
            base_nonce,
            header: header.encode(),
            chunk_size,
            index: 0,
            finished: false,
        }
    }

    /// The bytes that must precede the first chunk.
    pub const fn header(&self) -> &[u8; HEADER_SIZE] {
        &self.header
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub const fn cipher(&self) -> CipherSuite {
        self.primitive.suite()
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Seals `plaintext` as the next chunk and appends its framed form to
    /// `out`. Non-final chunks must be exactly `chunk_size` bytes long. After
    /// a final chunk has been sealed, the encoder refuses further chunks.
    pub fn seal_chunk(
        &mut self,
        plaintext: &[u8],
        last: bool,
        out: &mut Vec<u8>,
    ) -> Result<(), StreamError> {
        if self.finished {
            return Err(StreamError::Finalized);
        }
        debug_assert!(
            plaintext.len() == self.chunk_size || (last && plaintext.len() < self.chunk_size),
            "chunk of {} bytes does not fit a {} byte chunk size",
            plaintext.len(),
            self.chunk_size
        );

        let index = self.index;
        // The last index is never used so that the counter cannot wrap.
        self.index = index
            .checked_add(1)
            .ok_or(StreamError::SequenceExhausted)?;

        let mut length = plaintext.len() as u32;
        if last {
            length |= FINAL_FLAG;
        }

        let frame_start = out.len();
        out.reserve(LENGTH_SIZE + plaintext.len() + TAG_SIZE);
        out.extend_from_slice(&length.to_be_bytes());
        let body_start = out.len();
        out.extend_from_slice(plaintext);

        let nonce = chunk_nonce(&self.base_nonce, index);
        let aad = chunk_aad(&self.header, index, last);
        match self
            .primitive
            .seal_in_place(&nonce, &aad, &mut out[body_start..])
        {
            Ok(tag) => out.extend_from_slice(&tag),
            Err(_) => {
                out.truncate(frame_start);
                return Err(StreamError::Seal { index });
            }
        }

        trace!(index, len = plaintext.len(), last, "sealed chunk");
        self.finished = last;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Length,
    Body { len: usize, last: bool },
    /// The final chunk has been opened; only end of input may follow.
    Trailer,
    Done,
}

#[derive(Debug)]
struct Session {
    primitive: Primitive,
    base_nonce: [u8; NONCE_SIZE],
    header: [u8; HEADER_SIZE],
    chunk_size: usize,
}

/// Verifies and opens chunks for one stream.
///
/// The decoder asks for exactly the bytes it needs next through
/// [`Decoder::spare`]; the caller fills some prefix of that slice and reports
/// how much with [`Decoder::consume`]. Input is therefore never over-read
/// from the underlying source, and memory stays bounded by one chunk.
#[derive(Debug)]
pub struct Decoder {
    key: Key,
    suite: CipherSuite,
    session: Option<Session>,
    state: State,
    input: Vec<u8>,
    filled: usize,
    index: u64,
}

impl Decoder {
    pub fn new(key: Key, suite: CipherSuite) -> Self {
        Self {
            key,
            suite,
            session: None,
            state: State::Header,
            input: vec![0; HEADER_SIZE],
            filled: 0,
            index: 0,
        }
    }

    /// True once the final chunk has been opened and the source is exhausted.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// The region the next input bytes must be written to. Empty once the
    /// stream is done.
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.input[self.filled..]
    }

    /// Records that `n` bytes were written to the front of [`Decoder::spare`].
    /// If that completes a header or chunk, it is processed, and any
    /// plaintext it yields is appended to `plaintext`.
    pub fn consume(&mut self, n: usize, plaintext: &mut Vec<u8>) -> Result<(), StreamError> {
        if n > self.input.len() - self.filled {
            return Err(StreamError::Io {
                kind: ErrorKind::InvalidInput,
                message: format!(
                    "source reported {n} bytes read into a {} byte buffer",
                    self.input.len() - self.filled
                ),
            });
        }
        self.filled += n;
        if n > 0 && self.filled == self.input.len() {
            self.step(plaintext)?;
        }
        Ok(())
    }

    /// Handles end of input from the underlying source.
    pub fn finish(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Done => Ok(()),
            State::Trailer if self.filled == 0 => {
                self.state = State::Done;
                self.input = Vec::new();
                Ok(())
            }
            _ => {
                warn!(index = self.index, "encrypted stream truncated");
                Err(FramingError::Truncated.into())
            }
        }
    }

    fn expect(&mut self, len: usize, state: State) {
        self.state = state;
        self.input.clear();
        self.input.resize(len, 0);
        self.filled = 0;
    }

    fn step(&mut self, plaintext: &mut Vec<u8>) -> Result<(), StreamError> {
        match self.state {
            State::Header => {
                let mut bytes = [0u8; HEADER_SIZE];
                bytes.copy_from_slice(&self.input);
                let header = Header::decode(&bytes)?;
                if header.suite != self.suite {
                    warn!(expected = %self.suite, found = %header.suite, "cipher suite mismatch");
                    return Err(FramingError::CipherMismatch {
                        expected: self.suite,
                        found: header.suite,
                    }
                    .into());
                }
                let (primitive, base_nonce) = header.derive(self.key.as_bytes());
                debug!(suite = %header.suite, chunk_size = header.chunk_size, "accepted stream header");
                self.session = Some(Session {
                    primitive,
                    base_nonce,
                    header: bytes,
                    chunk_size: header.chunk_size as usize,
                });
                self.expect(LENGTH_SIZE, State::Length);
            }
            State::Length => {
                let chunk_size = session(&self.session)?.chunk_size;
                let mut bytes = [0u8; LENGTH_SIZE];
                bytes.copy_from_slice(&self.input);
                let word = u32::from_be_bytes(bytes);
                let last = word & FINAL_FLAG != 0;
                let len = (word & LENGTH_MASK) as usize;

                if len > chunk_size {
                    return Err(FramingError::OversizedChunk {
                        index: self.index,
                        len,
                        max: chunk_size,
                    }
                    .into());
                }
                if !last && len != chunk_size {
                    return Err(FramingError::ShortChunk {
                        index: self.index,
                        len,
                        expected: chunk_size,
                    }
                    .into());
                }
                self.expect(len + TAG_SIZE, State::Body { len, last });
            }
            State::Body { len, last } => {
                let index = self.index;
                let session = session(&self.session)?;
                let nonce = chunk_nonce(&session.base_nonce, index);
                let aad = chunk_aad(&session.header, index, last);

                let (body, tag) = self.input.split_at_mut(len);
                let mut detached = [0u8; TAG_SIZE];
                detached.copy_from_slice(tag);
                if session
                    .primitive
                    .open_in_place(&nonce, &aad, body, &detached)
                    .is_err()
                {
                    warn!(index, "chunk failed authentication");
                    return Err(StreamError::Authentication { index });
                }

                plaintext.extend_from_slice(body);
                trace!(index, len, last, "opened chunk");
                self.index = index
                    .checked_add(1)
                    .ok_or(StreamError::SequenceExhausted)?;

                if last {
                    // One byte is enough to tell end of input from trailing data.
                    self.expect(1, State::Trailer);
                } else {
                    self.expect(LENGTH_SIZE, State::Length);
                }
            }
            State::Trailer => {
                warn!("data found after the final chunk");
                return Err(FramingError::TrailingData.into());
            }
            State::Done => {}
        }
        Ok(())
    }
}

/// Chunk states are only entered once the header installed a session.
fn session(session: &Option<Session>) -> Result<&Session, StreamError> {
    session
        .as_ref()
        .ok_or(StreamError::Framing(FramingError::Truncated))
}
