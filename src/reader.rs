use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult};

use crate::codec::Decoder;
use crate::error::StreamError;

#[cfg(feature = "tokio")]
use core::marker::Unpin;
#[cfg(feature = "tokio")]
use core::pin::Pin;
#[cfg(feature = "tokio")]
use core::task::{Context, Poll};
#[cfg(feature = "tokio")]
use tokio::io::{AsyncRead, ReadBuf};

/// Reader that verifies and decrypts a stream produced by [`Writer`].
///
/// Ciphertext is pulled from the underlying reader one chunk at a time, and
/// only released once the whole chunk has authenticated. End of stream is
/// reported only after the final chunk has been verified and the underlying
/// reader is exhausted; a stream that stops early is an error, not a short
/// read.
///
/// Any error, including one from the underlying reader, ends the stream: every
/// later read fails as well.
///
/// [`Writer`]: crate::Writer
#[derive(Debug)]
pub struct Reader<Inner> {
    reader: Inner,
    decoder: Decoder,
    plaintext: Vec<u8>,
    plaintext_start: usize,
    failed: Option<StreamError>,
}

impl<Inner> Reader<Inner> {
    pub(crate) fn new(reader: Inner, decoder: Decoder) -> Self {
        Self {
            reader,
            decoder,
            plaintext: Vec::new(),
            plaintext_start: 0,
            failed: None,
        }
    }

    pub const fn get_ref(&self) -> &Inner {
        &self.reader
    }

    pub fn into_inner(self) -> Inner {
        self.reader
    }

    fn check(&self) -> Result<(), StreamError> {
        self.failed.as_ref().map_or(Ok(()), |err| Err(err.clone()))
    }

    fn fail(&mut self, err: StreamError) -> IoError {
        self.failed = Some(err.clone());
        err.into()
    }

    fn fail_io(&mut self, err: IoError) -> IoError {
        self.failed = Some(StreamError::io(&err));
        err
    }

    /// Moves buffered plaintext into `buf`, returning how much was copied.
    fn take_plaintext(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.plaintext[self.plaintext_start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.plaintext_start += n;
        n
    }

    fn has_plaintext(&self) -> bool {
        self.plaintext_start < self.plaintext.len()
    }

    /// Feeds `bytes_read` freshly read bytes to the decoder; zero means the
    /// underlying reader is exhausted.
    fn advance(&mut self, bytes_read: usize) -> IoResult<()> {
        self.plaintext.clear();
        self.plaintext_start = 0;
        let result = if bytes_read == 0 {
            self.decoder.finish()
        } else {
            self.decoder.consume(bytes_read, &mut self.plaintext)
        };
        result.map_err(|err| self.fail(err))
    }
}

impl<Inner> Read for Reader<Inner>
where
    Inner: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.has_plaintext() {
                return Ok(self.take_plaintext(buf));
            }
            if self.decoder.is_done() {
                return Ok(0);
            }
            match self.reader.read(self.decoder.spare()) {
                Ok(n) => self.advance(n)?,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.fail_io(e)),
            }
        }
    }
}

#[cfg(feature = "tokio")]
impl<Inner> AsyncRead for Reader<Inner>
where
    Inner: AsyncRead + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context, buf: &mut ReadBuf) -> Poll<IoResult<()>> {
        let me = self.get_mut();
        me.check()?;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if me.has_plaintext() {
                let n = me.take_plaintext(buf.initialize_unfilled());
                buf.advance(n);
                return Poll::Ready(Ok(()));
            }
            if me.decoder.is_done() {
                return Poll::Ready(Ok(()));
            }
            let mut spare = ReadBuf::new(me.decoder.spare());
            match Pin::new(&mut me.reader).poll_read(cx, &mut spare) {
                Poll::Ready(Ok(())) => {
                    let n = spare.filled().len();
                    me.advance(n)?;
                }
                Poll::Ready(Err(e)) if e.kind() == ErrorKind::Interrupted => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(me.fail_io(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};
    #[cfg(feature = "tokio")]
    use std::pin::Pin;
    #[cfg(feature = "tokio")]
    use std::task::{Context, Poll};

    #[cfg(feature = "tokio")]
    use tokio::io::{AsyncRead, ReadBuf};

    use crate::codec::Decoder;
    use crate::key::Key;
    use crate::primitive::CipherSuite;
    use crate::{Config, Encryption};

    pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

    pub const KEY: [u8; 32] = [5; 32];
    pub const CHUNK: usize = 16;

    pub fn decoder(suite: CipherSuite) -> Decoder {
        Decoder::new(Key::from_bytes(KEY), suite)
    }

    pub fn encrypt(suite: CipherSuite, data: &[u8]) -> TestResult<Vec<u8>> {
        let encryption = Encryption::new(
            Config::default()
                .with_key(&KEY)
                .with_cipher(suite)
                .with_chunk_size(CHUNK),
        )?;
        let mut writer = encryption.writer(vec![]);
        writer.write_all(data)?;
        Ok(writer.finish()?)
    }

    /// Hands out at most `step` bytes per read, then fails once exhausted if
    /// `fail_at_end` is set.
    pub struct Trickle<'a> {
        pub data: &'a [u8],
        pub step: usize,
        pub fail_at_end: bool,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            if self.data.is_empty() && self.fail_at_end {
                return Err(IoError::new(ErrorKind::ConnectionReset, "source went away"));
            }
            let n = buf.len().min(self.step).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Fails every other read with `Interrupted`.
    pub struct Stutter<'a> {
        pub data: &'a [u8],
        pub interrupts: usize,
        stalled: bool,
    }

    impl<'a> Stutter<'a> {
        pub const fn new(data: &'a [u8]) -> Self {
            Self {
                data,
                interrupts: 0,
                stalled: false,
            }
        }
    }

    impl Read for Stutter<'_> {
        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            self.stalled = !self.stalled;
            if self.stalled {
                self.interrupts += 1;
                return Err(IoError::new(ErrorKind::Interrupted, "signal"));
            }
            self.data.read(buf)
        }
    }

    #[cfg(feature = "tokio")]
    impl AsyncRead for Stutter<'_> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _: &mut Context,
            buf: &mut ReadBuf,
        ) -> Poll<IoResult<()>> {
            let n = self.read(buf.initialize_unfilled())?;
            buf.advance(n);
            Poll::Ready(Ok(()))
        }
    }

    #[cfg(feature = "tokio")]
    impl AsyncRead for Trickle<'_> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _: &mut Context,
            buf: &mut ReadBuf,
        ) -> Poll<IoResult<()>> {
            let n = self.read(buf.initialize_unfilled())?;
            buf.advance(n);
            Poll::Ready(Ok(()))
        }
    }
}

#[cfg(test)]
mod read {
    use std::io::{ErrorKind, Read};

    use super::test::*;
    use super::Reader;
    use crate::error::{FramingError, StreamError};
    use crate::primitive::CipherSuite;

    #[test]
    fn simple() -> TestResult<()> {
        let encrypted = encrypt(CipherSuite::Aes256Gcm, b"hello world")?;
        let mut reader = Reader::new(&encrypted[..], decoder(CipherSuite::Aes256Gcm));
        let mut data = vec![];
        reader.read_to_end(&mut data)?;
        assert_eq!(data, b"hello world");
        Ok(())
    }

    #[test]
    fn read_empty() -> TestResult<()> {
        let encrypted = encrypt(CipherSuite::ChaCha20Poly1305, b"")?;
        let mut reader = Reader::new(&encrypted[..], decoder(CipherSuite::ChaCha20Poly1305));
        let mut data = vec![];
        reader.read_to_end(&mut data)?;
        assert!(data.is_empty());
        // Reading past the end keeps returning end of stream.
        assert_eq!(reader.read(&mut [0; 8])?, 0);
        Ok(())
    }

    #[test]
    fn byte_at_a_time() -> TestResult<()> {
        let plaintext: Vec<u8> = (0..=255).collect();
        let encrypted = encrypt(CipherSuite::Aes256Gcm, &plaintext)?;
        let source = Trickle {
            data: &encrypted,
            step: 1,
            fail_at_end: false,
        };
        let mut reader = Reader::new(source, decoder(CipherSuite::Aes256Gcm));
        let mut data = vec![];
        let mut byte = [0u8; 1];
        while reader.read(&mut byte)? == 1 {
            data.push(byte[0]);
        }
        assert_eq!(data, plaintext);
        Ok(())
    }

    #[test]
    fn nothing_is_released_before_a_chunk_verifies() -> TestResult<()> {
        let mut encrypted = encrypt(CipherSuite::Aes256Gcm, &[0x61; 40])?;
        // Last byte of the first chunk's tag.
        let first_tag_end = crate::header::HEADER_SIZE + 4 + CHUNK + crate::TAG_SIZE;
        encrypted[first_tag_end - 1] ^= 0x01;

        let mut reader = Reader::new(&encrypted[..], decoder(CipherSuite::Aes256Gcm));
        let mut buf = [0u8; 64];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(
            StreamError::from_io(&err),
            Some(&StreamError::Authentication { index: 0 })
        );
        assert_eq!(buf, [0; 64]);
        Ok(())
    }

    #[test]
    fn failures_are_sticky() -> TestResult<()> {
        let encrypted = encrypt(CipherSuite::Aes256Gcm, &[1; 40])?;
        let truncated = &encrypted[..encrypted.len() - 1];
        let mut reader = Reader::new(truncated, decoder(CipherSuite::Aes256Gcm));
        let mut data = vec![];
        let err = reader.read_to_end(&mut data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        // The two complete chunks were released, the unfinished one was not.
        assert_eq!(data, [1; 2 * CHUNK]);

        let again = reader.read(&mut [0; 4]).unwrap_err();
        assert_eq!(
            StreamError::from_io(&again),
            Some(&StreamError::Framing(FramingError::Truncated))
        );
        Ok(())
    }

    #[test]
    fn underlying_failure_is_sticky() -> TestResult<()> {
        let encrypted = encrypt(CipherSuite::Aes256Gcm, &[2; 20])?;
        let source = Trickle {
            data: &encrypted[..30],
            step: 7,
            fail_at_end: true,
        };
        let mut reader = Reader::new(source, decoder(CipherSuite::Aes256Gcm));
        let err = reader.read(&mut [0; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
        assert_eq!(StreamError::from_io(&err), None);

        let again = reader.read(&mut [0; 4]).unwrap_err();
        assert_eq!(again.kind(), ErrorKind::ConnectionReset);
        assert!(matches!(
            StreamError::from_io(&again),
            Some(StreamError::Io { .. })
        ));
        Ok(())
    }

    #[test]
    fn interrupted_reads_are_retried() -> TestResult<()> {
        let plaintext: Vec<u8> = (0..60).collect();
        let encrypted = encrypt(CipherSuite::ChaCha20Poly1305, &plaintext)?;
        let mut reader = Reader::new(
            Stutter::new(&encrypted),
            decoder(CipherSuite::ChaCha20Poly1305),
        );
        let mut data = vec![];
        let mut buf = [0u8; 10];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        assert_eq!(data, plaintext);
        assert!(reader.get_ref().interrupts > 0);
        Ok(())
    }

    #[test]
    fn wrong_suite_is_rejected() -> TestResult<()> {
        let encrypted = encrypt(CipherSuite::ChaCha20Poly1305, b"abc")?;
        let mut reader = Reader::new(&encrypted[..], decoder(CipherSuite::Aes256Gcm));
        let err = reader.read_to_end(&mut vec![]).unwrap_err();
        assert!(matches!(
            StreamError::from_io(&err),
            Some(StreamError::Framing(FramingError::CipherMismatch { .. }))
        ));
        Ok(())
    }
}
