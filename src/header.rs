//! Stream header and per-stream key schedule.
//!
//! ```text
//! offset  size  field
//!      0     1  format version (0x01)
//!      1     1  cipher suite id
//!      2     4  chunk size, u32 big-endian
//!      6    32  random salt
//! ```
//!
//! The salt feeds HKDF-SHA256 together with the long-term key, yielding a
//! per-stream subkey and base nonce. Two streams under the same key therefore
//! never share a (key, nonce) pair unless their 256-bit salts collide.

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::FramingError;
use crate::primitive::{CipherSuite, Primitive};
use crate::{KEY_SIZE, MAX_CHUNK_SIZE, NONCE_SIZE};

pub const VERSION: u8 = 0x01;
pub const SALT_SIZE: usize = 32;
pub const HEADER_SIZE: usize = 1 + 1 + 4 + SALT_SIZE;

const KDF_INFO: &[u8] = b"sealed-stream v1";

// HKDF-SHA256 can expand to at most 255 hash lengths.
const _: () = assert!(KEY_SIZE + NONCE_SIZE <= 255 * 32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub suite: CipherSuite,
    pub chunk_size: u32,
    pub salt: [u8; SALT_SIZE],
}

impl Header {
    /// Builds a header with a freshly drawn salt.
    pub fn generate(suite: CipherSuite, chunk_size: u32) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            suite,
            chunk_size,
            salt,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = VERSION;
        out[1] = self.suite.id();
        out[2..6].copy_from_slice(&self.chunk_size.to_be_bytes());
        out[6..].copy_from_slice(&self.salt);
        out
    }

    /// Parses a header. The declared chunk size is bounded by
    /// [`MAX_CHUNK_SIZE`] so a hostile header cannot make the reader allocate
    /// without limit.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self, FramingError> {
        if bytes[0] != VERSION {
            return Err(FramingError::UnsupportedVersion(bytes[0]));
        }
        let suite =
            CipherSuite::from_id(bytes[1]).ok_or(FramingError::UnknownCipherSuite(bytes[1]))?;

        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[2..6]);
        let chunk_size = u32::from_be_bytes(size);
        if chunk_size == 0 || chunk_size as usize > MAX_CHUNK_SIZE {
            return Err(FramingError::InvalidChunkSize(chunk_size));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[6..]);
        Ok(Self {
            suite,
            chunk_size,
            salt,
        })
    }

    /// Derives the keyed primitive and base nonce for this stream.
    pub fn derive(&self, key: &[u8; KEY_SIZE]) -> (Primitive, [u8; NONCE_SIZE]) {
        let hkdf = Hkdf::<Sha256>::new(Some(&self.salt), key);
        let mut okm = [0u8; KEY_SIZE + NONCE_SIZE];
        let suite_id = [self.suite.id()];
        let info: [&[u8]; 2] = [KDF_INFO, &suite_id];
        let expanded = hkdf.expand_multi_info(&info, &mut okm);
        debug_assert!(expanded.is_ok());

        let mut subkey = [0u8; KEY_SIZE];
        subkey.copy_from_slice(&okm[..KEY_SIZE]);
        let mut base_nonce = [0u8; NONCE_SIZE];
        base_nonce.copy_from_slice(&okm[KEY_SIZE..]);

        let primitive = Primitive::new(self.suite, &subkey);
        subkey.zeroize();
        okm.zeroize();
        (primitive, base_nonce)
    }
}
