//! The AEAD primitives a stream can be sealed with.
//!
//! Both variants take a 256-bit key and a 96-bit nonce and append a 128-bit
//! tag. Tag comparison happens inside the RustCrypto implementations, which
//! compare in constant time and verify before decrypting.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, Error as AeadError, KeyInit};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::ConfigError;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Selects which AEAD primitive seals a stream.
///
/// The choice is written into the stream header. A reader configured with one
/// suite refuses streams sealed with the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CipherSuite {
    /// AES-256-GCM. Fast wherever AES instructions are available.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "aes-256-gcm"))]
    Aes256Gcm,
    /// ChaCha20-Poly1305. Fast in software, good on hardware without AES
    /// acceleration.
    #[cfg_attr(feature = "serde", serde(rename = "chacha20-poly1305"))]
    ChaCha20Poly1305,
}

impl CipherSuite {
    pub const ALL: [Self; 2] = [Self::Aes256Gcm, Self::ChaCha20Poly1305];

    /// Identifier used on the wire.
    pub const fn id(self) -> u8 {
        match self {
            Self::Aes256Gcm => 0x00,
            Self::ChaCha20Poly1305 => 0x01,
        }
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(Self::Aes256Gcm),
            0x01 => Some(Self::ChaCha20Poly1305),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherSuite {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownCipherSuite(s.to_owned()))
    }
}

/// A keyed AEAD primitive.
///
/// Everything above this type only calls [`Primitive::seal`] and
/// [`Primitive::open`] (or their in-place forms), so adding a suite means
/// adding a variant here and nowhere else.
#[derive(Clone)]
pub enum Primitive {
    Aes256Gcm(Aes256Gcm),
    ChaCha20Poly1305(ChaCha20Poly1305),
}

impl Primitive {
    pub fn new(suite: CipherSuite, key: &[u8; KEY_SIZE]) -> Self {
        match suite {
            CipherSuite::Aes256Gcm => Self::Aes256Gcm(Aes256Gcm::new(key.into())),
            CipherSuite::ChaCha20Poly1305 => {
                Self::ChaCha20Poly1305(ChaCha20Poly1305::new(key.into()))
            }
        }
    }

    pub const fn suite(&self) -> CipherSuite {
        match self {
            Self::Aes256Gcm(_) => CipherSuite::Aes256Gcm,
            Self::ChaCha20Poly1305(_) => CipherSuite::ChaCha20Poly1305,
        }
    }

    /// Encrypts `plaintext`, returning `ciphertext ‖ tag`.
    pub fn seal(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        let mut sealed = Vec::with_capacity(plaintext.len() + TAG_SIZE);
        sealed.extend_from_slice(plaintext);
        let tag = self.seal_in_place(nonce, aad, &mut sealed)?;
        sealed.extend_from_slice(&tag);
        Ok(sealed)
    }

    /// Verifies and decrypts `ciphertext ‖ tag`. Nothing is returned unless the
    /// whole input authenticates.
    pub fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        sealed: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        if sealed.len() < TAG_SIZE {
            return Err(AeadError);
        }
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
        let mut plaintext = ciphertext.to_vec();
        let tag: &[u8; TAG_SIZE] = tag.try_into().map_err(|_| AeadError)?;
        self.open_in_place(nonce, aad, &mut plaintext, tag)?;
        Ok(plaintext)
    }

    /// Encrypts `buffer` in place and returns the detached tag.
    pub fn seal_in_place(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; TAG_SIZE], AeadError> {
        let nonce = GenericArray::from_slice(nonce);
        let tag = match self {
            Self::Aes256Gcm(cipher) => cipher.encrypt_in_place_detached(nonce, aad, buffer)?,
            Self::ChaCha20Poly1305(cipher) => {
                cipher.encrypt_in_place_detached(nonce, aad, buffer)?
            }
        };
        let mut detached = [0u8; TAG_SIZE];
        detached.copy_from_slice(&tag);
        Ok(detached)
    }

    /// Verifies `tag` and decrypts `buffer` in place. On failure the buffer is
    /// wiped so no unauthenticated bytes can leak out of it.
    pub fn open_in_place(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<(), AeadError> {
        let nonce = GenericArray::from_slice(nonce);
        let tag = GenericArray::from_slice(tag);
        let result = match self {
            Self::Aes256Gcm(cipher) => cipher.decrypt_in_place_detached(nonce, aad, buffer, tag),
            Self::ChaCha20Poly1305(cipher) => {
                cipher.decrypt_in_place_detached(nonce, aad, buffer, tag)
            }
        };
        if result.is_err() {
            buffer.fill(0);
        }
        result
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Primitive").field(&self.suite()).finish()
    }
}
