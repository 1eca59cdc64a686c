use std::io::{Error as IoError, ErrorKind, Result as IoResult, Write};

use tracing::{debug, warn};

use crate::codec::Encoder;
use crate::error::StreamError;
use crate::middleware::Close;
use crate::primitive::CipherSuite;

#[cfg(feature = "tokio")]
use core::marker::Unpin;
#[cfg(feature = "tokio")]
use core::pin::Pin;
#[cfg(feature = "tokio")]
use core::task::{ready, Context, Poll};
#[cfg(feature = "tokio")]
use tokio::io::AsyncWrite;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Open,
    Closed,
    Failed(StreamError),
}

/// Warns when a writer holding an unfinished stream goes away.
#[derive(Debug)]
struct Unfinalized(bool);

impl Drop for Unfinalized {
    fn drop(&mut self) {
        if self.0 {
            warn!("encrypting writer dropped without close; the stream is truncated");
        }
    }
}

/// Writer that encrypts everything written to it before passing it on to an
/// underlying synchronous or asynchronous writer.
///
/// Plaintext is collected until a full chunk is available, which is then
/// sealed and handed to the underlying writer right away. The stream header
/// goes out on the first write, flush or close.
///
/// A stream is only complete once [`Writer::close`] (or [`Writer::finish`],
/// or [`AsyncWriteExt::shutdown`] for asynchronous writers) has sealed the
/// final chunk. A reader treats a stream without one as truncated, so dropping
/// a writer without closing it loses the tail of the data.
///
/// [`Writer::flush`] pushes already sealed chunks to the underlying writer and
/// flushes it, but never seals a partial chunk, since only the final chunk may
/// be short.
///
/// Any error, including one from the underlying writer, ends the stream: every
/// later call fails as well, and the stream can no longer be finalized.
///
/// [`AsyncWriteExt::shutdown`]: https://docs.rs/tokio/latest/tokio/io/trait.AsyncWriteExt.html#method.shutdown
#[derive(Debug)]
pub struct Writer<Inner> {
    writer: Inner,
    encoder: Encoder,
    plaintext: Vec<u8>,
    /// Sealed bytes not yet accepted by `writer`, starting at `pending_start`.
    pending: Vec<u8>,
    pending_start: usize,
    state: State,
    unfinalized: Unfinalized,
}

impl<Inner> Writer<Inner> {
    pub(crate) fn new(writer: Inner, encoder: Encoder) -> Self {
        let pending = encoder.header().to_vec();
        Self {
            writer,
            plaintext: Vec::with_capacity(encoder.chunk_size()),
            encoder,
            pending,
            pending_start: 0,
            state: State::Open,
            unfinalized: Unfinalized(true),
        }
    }

    pub const fn get_ref(&self) -> &Inner {
        &self.writer
    }

    /// Writing to the underlying writer directly corrupts the stream.
    pub fn get_mut(&mut self) -> &mut Inner {
        &mut self.writer
    }

    /// Abandons the stream without finalizing it.
    pub fn into_inner(mut self) -> Inner {
        self.unfinalized.0 = false;
        self.writer
    }

    pub const fn chunk_size(&self) -> usize {
        self.encoder.chunk_size()
    }

    pub fn cipher(&self) -> CipherSuite {
        self.encoder.cipher()
    }

    /// True once the final chunk has been sealed and handed to the
    /// underlying writer.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    fn check(&self) -> Result<(), StreamError> {
        match &self.state {
            State::Failed(err) => Err(err.clone()),
            State::Closed => Err(StreamError::Finalized),
            State::Open if self.encoder.is_finished() => Err(StreamError::Finalized),
            State::Open => Ok(()),
        }
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        warn!(error = %err, "encrypted stream failed");
        self.state = State::Failed(err.clone());
        self.unfinalized.0 = false;
        err
    }

    /// Records a failure of the underlying writer and hands the original error
    /// back to the caller.
    fn fail_io(&mut self, err: IoError) -> IoError {
        let recorded = StreamError::from_io(&err)
            .cloned()
            .unwrap_or_else(|| StreamError::io(&err));
        self.fail(recorded);
        err
    }

    /// Copies as much of `buf` as fits into the current chunk, sealing it if
    /// it fills up. Returns the number of bytes taken.
    fn push_bytes(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        let to_write = buf.len().min(self.chunk_size() - self.plaintext.len());
        self.plaintext.extend_from_slice(&buf[..to_write]);
        if self.plaintext.len() == self.chunk_size() {
            self.seal(false)?;
        }
        Ok(to_write)
    }

    fn seal(&mut self, last: bool) -> Result<(), StreamError> {
        if let Err(err) = self
            .encoder
            .seal_chunk(&self.plaintext, last, &mut self.pending)
        {
            return Err(self.fail(err));
        }
        self.plaintext.clear();
        Ok(())
    }

    fn advance(&mut self, bytes_written: usize) {
        self.pending_start += bytes_written;
        if self.pending_start == self.pending.len() {
            self.pending.clear();
            self.pending_start = 0;
        }
    }

    fn write_zero(&mut self) -> IoError {
        self.fail_io(IoError::new(
            ErrorKind::WriteZero,
            "failed to write encrypted chunk",
        ))
    }

    fn closed(&mut self) {
        self.state = State::Closed;
        self.unfinalized.0 = false;
        debug!("encrypted stream finalized");
    }
}

impl<Inner> Writer<Inner>
where
    Inner: Write,
{
    /// Hands every sealed byte to the underlying writer.
    fn drain(&mut self) -> IoResult<()> {
        while self.pending_start < self.pending.len() {
            match self.writer.write(&self.pending[self.pending_start..]) {
                Ok(0) => return Err(self.write_zero()),
                Ok(n) => self.advance(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.fail_io(e)),
            }
        }
        Ok(())
    }

    /// Seals the final chunk, writes out everything still buffered, and
    /// flushes the underlying writer. Calling it again after it succeeded does
    /// nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Write;
    ///
    /// use sealed_stream::{CipherSuite, Config, Encryption};
    ///
    /// let encryption = Encryption::new(
    ///     Config::default()
    ///         .with_key(&[1; 32])
    ///         .with_cipher(CipherSuite::ChaCha20Poly1305),
    /// )?;
    ///
    /// let mut file = vec![];
    /// let mut writer = encryption.writer(&mut file);
    /// writer.write_all(b"hello world")?;
    /// writer.close()?;
    ///
    /// assert!(writer.write_all(b"more").is_err());
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn close(&mut self) -> IoResult<()> {
        match &self.state {
            State::Closed => return Ok(()),
            State::Failed(err) => return Err(err.clone().into()),
            State::Open => {}
        }
        if !self.encoder.is_finished() {
            self.seal(true)?;
        }
        self.drain()?;
        if let Err(e) = self.writer.flush() {
            return Err(self.fail_io(e));
        }
        self.closed();
        Ok(())
    }

    /// Closes the stream and returns the underlying writer.
    pub fn finish(mut self) -> IoResult<Inner> {
        self.close()?;
        Ok(self.writer)
    }
}

impl<Inner> Write for Writer<Inner>
where
    Inner: Write,
{
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.check()?;
        // Never accept new plaintext while sealed bytes are still waiting.
        self.drain()?;
        let taken = self.push_bytes(buf)?;
        self.drain()?;
        Ok(taken)
    }

    fn flush(&mut self) -> IoResult<()> {
        if let State::Failed(err) = &self.state {
            return Err(err.clone().into());
        }
        self.drain()?;
        self.writer.flush().map_err(|e| self.fail_io(e))
    }
}

impl<Inner> Close for Writer<Inner>
where
    Inner: Write,
{
    fn close(&mut self) -> IoResult<()> {
        Writer::close(self)
    }
}

#[cfg(feature = "tokio")]
impl<Inner> Writer<Inner>
where
    Inner: AsyncWrite + Unpin,
{
    fn poll_drain(&mut self, cx: &mut Context) -> Poll<IoResult<()>> {
        while self.pending_start < self.pending.len() {
            match Pin::new(&mut self.writer).poll_write(cx, &self.pending[self.pending_start..]) {
                Poll::Ready(Ok(0)) => return Poll::Ready(Err(self.write_zero())),
                Poll::Ready(Ok(n)) => self.advance(n),
                Poll::Ready(Err(e)) if e.kind() == ErrorKind::Interrupted => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(self.fail_io(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(feature = "tokio")]
impl<Inner> AsyncWrite for Writer<Inner>
where
    Inner: AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<IoResult<usize>> {
        let me = self.get_mut();
        me.check()?;
        // Sealed data goes out first. A freshly sealed chunk is left pending
        // until the next call so that accepted bytes are reported right away.
        ready!(me.poll_drain(cx))?;
        Poll::Ready(Ok(me.push_bytes(buf)?))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<IoResult<()>> {
        let me = self.get_mut();
        if let State::Failed(err) = &me.state {
            return Poll::Ready(Err(err.clone().into()));
        }
        ready!(me.poll_drain(cx))?;
        match Pin::new(&mut me.writer).poll_flush(cx) {
            Poll::Ready(Err(e)) => Poll::Ready(Err(me.fail_io(e))),
            other => other,
        }
    }

    /// Seals the final chunk, then flushes and shuts down the underlying
    /// writer. Safe to poll again after `Pending`: the final chunk is sealed
    /// exactly once.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<IoResult<()>> {
        let me = self.get_mut();
        if let State::Failed(err) = &me.state {
            return Poll::Ready(Err(err.clone().into()));
        }
        if me.state == State::Open {
            if !me.encoder.is_finished() {
                me.seal(true)?;
            }
            ready!(me.poll_drain(cx))?;
            if let Err(e) = ready!(Pin::new(&mut me.writer).poll_flush(cx)) {
                return Poll::Ready(Err(me.fail_io(e)));
            }
            me.closed();
        }
        match ready!(Pin::new(&mut me.writer).poll_shutdown(cx)) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(me.fail_io(e))),
        }
    }
}
