use std::io::{Error as IoError, ErrorKind};

use thiserror::Error;

use crate::primitive::CipherSuite;

/// Errors raised while building an [`Encryption`] middleware. These are never
/// recovered from internally: a bad configuration is rejected before any
/// stream is touched.
///
/// [`Encryption`]: crate::Encryption
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("encryption key must be exactly {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("chunk size must be between 1 and {max} bytes, got {size}")]
    InvalidChunkSize { size: usize, max: usize },

    #[error("unknown cipher suite {0:?}")]
    UnknownCipherSuite(String),
}

/// Fatal framing problems found while decoding a stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("unsupported stream format version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("unknown cipher suite id {0:#04x}")]
    UnknownCipherSuite(u8),

    #[error("stream was sealed with {found}, expected {expected}")]
    CipherMismatch {
        expected: CipherSuite,
        found: CipherSuite,
    },

    #[error("stream header declares invalid chunk size {0}")]
    InvalidChunkSize(u32),

    #[error("chunk {index} declares {len} bytes, exceeding the chunk size of {max}")]
    OversizedChunk { index: u64, len: usize, max: usize },

    #[error("non-final chunk {index} holds {len} bytes, expected exactly {expected}")]
    ShortChunk {
        index: u64,
        len: usize,
        expected: usize,
    },

    #[error("unexpected data after the final chunk")]
    TrailingData,

    #[error("stream ended before the final chunk")]
    Truncated,
}

/// Errors that end an encrypted stream.
///
/// Once a [`Writer`] or [`Reader`] has reported one of these, every following
/// call reports it again. Since [`Read`] and [`Write`] speak [`std::io::Error`],
/// these travel wrapped inside one; use [`StreamError::from_io`] to get the
/// typed error back.
///
/// [`Writer`]: crate::Writer
/// [`Reader`]: crate::Reader
/// [`Read`]: std::io::Read
/// [`Write`]: std::io::Write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("chunk {index} failed authentication")]
    Authentication { index: u64 },

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("stream has already been finalized")]
    Finalized,

    #[error("chunk sequence counter exhausted")]
    SequenceExhausted,

    #[error("cipher refused to seal chunk {index}")]
    Seal { index: u64 },

    /// A previous call failed in the wrapped sink or source.
    #[error("underlying io failed earlier: {message}")]
    Io { kind: ErrorKind, message: String },
}

impl StreamError {
    /// Returns the [`StreamError`] carried by an [`std::io::Error`] produced by
    /// this crate, if any.
    pub fn from_io(err: &IoError) -> Option<&Self> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Self>())
    }

    pub(crate) fn io(err: &IoError) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub(crate) const fn kind(&self) -> ErrorKind {
        match self {
            Self::Framing(FramingError::Truncated) => ErrorKind::UnexpectedEof,
            Self::Authentication { .. } | Self::Framing(_) => ErrorKind::InvalidData,
            Self::Finalized | Self::SequenceExhausted | Self::Seal { .. } => ErrorKind::Other,
            Self::Io { kind, .. } => *kind,
        }
    }
}

impl From<StreamError> for IoError {
    fn from(err: StreamError) -> Self {
        Self::new(err.kind(), err)
    }
}

#[cfg(test)]
mod test {
    use std::io::{Error as IoError, ErrorKind};

    use super::{FramingError, StreamError};

    #[test]
    fn kinds() {
        let truncated: IoError = StreamError::Framing(FramingError::Truncated).into();
        assert_eq!(truncated.kind(), ErrorKind::UnexpectedEof);

        let auth: IoError = StreamError::Authentication { index: 3 }.into();
        assert_eq!(auth.kind(), ErrorKind::InvalidData);
        assert_eq!(auth.to_string(), "chunk 3 failed authentication");
    }

    #[test]
    fn round_trips_through_io_error() {
        let original = StreamError::Framing(FramingError::TrailingData);
        let err: IoError = original.clone().into();
        assert_eq!(StreamError::from_io(&err), Some(&original));

        let foreign = IoError::new(ErrorKind::Other, "nope");
        assert_eq!(StreamError::from_io(&foreign), None);
    }

    #[test]
    fn replayed_io_keeps_kind() {
        let first = IoError::new(ErrorKind::BrokenPipe, "pipe closed");
        let replay: IoError = StreamError::io(&first).into();
        assert_eq!(replay.kind(), ErrorKind::BrokenPipe);
    }
}
