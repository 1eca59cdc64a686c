use std::io::{Read, Result as IoResult, Write};

use crate::codec::{Decoder, Encoder};
use crate::config::Config;
use crate::error::ConfigError;
use crate::key::Key;
use crate::primitive::CipherSuite;
use crate::reader::Reader;
use crate::writer::Writer;
use crate::MAX_CHUNK_SIZE;

/// A transformation stage that wraps byte sinks and byte sources.
///
/// Stages nest: the writer of one stage can be the sink of another, in which
/// case data read back must pass through the readers in reverse order.
pub trait Middleware {
    type Writer<W: Write>: Write + Close;
    type Reader<R: Read>: Read;

    /// Wraps a sink so that data written to the result is transformed before
    /// it reaches `inner`.
    fn writer<W: Write>(&self, inner: W) -> Self::Writer<W>;

    /// Wraps a source so that the transformation applied by
    /// [`Middleware::writer`] is undone.
    fn reader<R: Read>(&self, inner: R) -> Self::Reader<R>;
}

/// Writers that must be finalized explicitly before their output is valid.
pub trait Close {
    /// Finalizes the output. Writing afterwards is an error.
    fn close(&mut self) -> IoResult<()>;
}

/// Encryption middleware: one key and one cipher suite, shared by every
/// stream it wraps.
///
/// Every call to [`Encryption::writer`] starts an independent stream with its
/// own random salt, so a single instance can safely seal any number of
/// streams, concurrently or not. Cloning is cheap enough to hand one copy to
/// each thread.
///
/// # Examples
///
/// ```
/// use std::io::{Read, Write};
///
/// use sealed_stream::Encryption;
///
/// let encryption = Encryption::random();
///
/// let mut sealed = vec![];
/// let mut writer = encryption.writer(&mut sealed);
/// writer.write_all(b"attack at dawn")?;
/// writer.close()?;
///
/// let mut opened = String::new();
/// encryption.reader(&sealed[..]).read_to_string(&mut opened)?;
/// assert_eq!(opened, "attack at dawn");
///
/// # std::io::Result::Ok(())
/// ```
#[derive(Debug, Clone)]
pub struct Encryption {
    key: Key,
    cipher: CipherSuite,
    chunk_size: usize,
}

impl Encryption {
    /// Validates `config` as a whole. A missing key is generated at random.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let key = match config.key {
            Some(bytes) => Key::try_from(bytes.as_slice())?,
            None => Key::generate(),
        };
        if config.chunk_size == 0 || config.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                size: config.chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }
        Ok(Self {
            key,
            cipher: config.cipher,
            chunk_size: config.chunk_size,
        })
    }

    /// Default settings around a caller supplied key.
    pub fn with_key(key: &[u8]) -> Result<Self, ConfigError> {
        Self::new(Config::default().with_key(key))
    }

    /// Default settings around a freshly generated key. Data sealed this way
    /// can only be opened through this instance or its clones.
    #[must_use]
    pub fn random() -> Self {
        Self {
            key: Key::generate(),
            cipher: CipherSuite::default(),
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        }
    }

    pub const fn key(&self) -> &Key {
        &self.key
    }

    pub const fn cipher(&self) -> CipherSuite {
        self.cipher
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Starts a new encrypted stream on top of `inner`.
    pub fn writer<W>(&self, inner: W) -> Writer<W> {
        Writer::new(inner, Encoder::new(&self.key, self.cipher, self.chunk_size))
    }

    /// Opens an encrypted stream read from `inner`. The chunk size is taken
    /// from the stream header, so it need not match [`Encryption::chunk_size`].
    pub fn reader<R>(&self, inner: R) -> Reader<R> {
        Reader::new(inner, Decoder::new(self.key.clone(), self.cipher))
    }
}

impl Default for Encryption {
    fn default() -> Self {
        Self::random()
    }
}

impl Middleware for Encryption {
    type Writer<W: Write> = Writer<W>;
    type Reader<R: Read> = Reader<R>;

    fn writer<W: Write>(&self, inner: W) -> Self::Writer<W> {
        Self::writer(self, inner)
    }

    fn reader<R: Read>(&self, inner: R) -> Self::Reader<R> {
        Self::reader(self, inner)
    }
}
