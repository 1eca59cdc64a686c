use rand::RngCore;
use zeroize::Zeroize;

use crate::error::ConfigError;
use crate::KEY_SIZE;

/// A 256-bit secret key. Zeroized on drop and never printed.
#[derive(Clone)]
pub struct Key {
    bytes: [u8; KEY_SIZE],
}

impl Key {
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Generates a fresh key from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = ConfigError;

    /// Copies a caller supplied key. Anything other than exactly
    /// [`KEY_SIZE`] bytes is rejected rather than truncated or padded.
    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; KEY_SIZE] =
            slice
                .try_into()
                .map_err(|_| ConfigError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self::from_bytes(bytes))
    }
}

impl From<[u8; KEY_SIZE]> for Key {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key").field("bytes", &"[REDACTED]").finish()
    }
}
