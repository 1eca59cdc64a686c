use std::fmt;

use zeroize::Zeroizing;

use crate::primitive::CipherSuite;
use crate::DEFAULT_CHUNK_SIZE;

/// Settings for an [`Encryption`](crate::Encryption) middleware.
///
/// Nothing is validated until the configuration is handed to
/// [`Encryption::new`](crate::Encryption::new), which either accepts all of it
/// or rejects it with a [`ConfigError`](crate::ConfigError).
///
/// | field        | default                         |
/// |--------------|---------------------------------|
/// | `key`        | 32 random bytes                 |
/// | `cipher`     | [`CipherSuite::Aes256Gcm`]      |
/// | `chunk_size` | [`DEFAULT_CHUNK_SIZE`] (64 KiB) |
#[derive(Clone)]
pub struct Config {
    pub key: Option<Zeroizing<Vec<u8>>>,
    pub cipher: CipherSuite,
    pub chunk_size: usize,
}

impl Config {
    /// Uses `key` instead of a randomly generated one. It must be exactly 32
    /// bytes long.
    #[must_use]
    pub fn with_key(mut self, key: &[u8]) -> Self {
        self.key = Some(Zeroizing::new(key.to_vec()));
        self
    }

    #[must_use]
    pub const fn with_cipher(mut self, cipher: CipherSuite) -> Self {
        self.cipher = cipher;
        self
    }

    /// Sets how many plaintext bytes go into each chunk. Larger chunks cost
    /// more memory on both ends, smaller chunks cost more framing overhead.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: None,
            cipher: CipherSuite::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("cipher", &self.cipher)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::Config;
    use crate::primitive::CipherSuite;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.key.is_none());
        assert_eq!(config.cipher, CipherSuite::Aes256Gcm);
        assert_eq!(config.chunk_size, 64 * 1024);
    }

    #[test]
    fn debug_hides_key() {
        let config = Config::default().with_key(b"0123456789abcdef0123456789abcdef");
        let printed = format!("{config:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("0123456789"));
    }
}
