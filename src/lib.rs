#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]

//! Micro-crate providing [`Write`]r and [`Read`]er implementations that seal
//! a byte stream with authenticated encryption, chunk by chunk. This is useful
//! for ensuring that data at rest or in transit goes through an encryption
//! layer without ever holding the whole stream in memory.
//!
//! Two AEAD ciphers from the [RustCrypto] ecosystem are supported,
//! AES-256-GCM and ChaCha20-Poly1305. Each stream derives its own subkey from
//! the caller's key and a random salt, and every chunk is bound to its
//! position and to whether it is the last one. Reordering, dropping,
//! duplicating, or truncating chunks is detected, and a [`Reader`] never
//! releases plaintext from a chunk that has not been verified.
//!
//! Additionally, [`Reader`] and [`Writer`] implement [`AsyncRead`] and
//! [`AsyncWrite`] if their underlying reader and writer implement the
//! respective traits and the `tokio` feature is enabled.
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use sealed_stream::{CipherSuite, Config, Encryption};
//!
//! let encryption = Encryption::new(
//!     Config::default()
//!         .with_key(&[7; 32])
//!         .with_cipher(CipherSuite::ChaCha20Poly1305),
//! )?;
//!
//! let mut sealed = vec![];
//! let mut writer = encryption.writer(&mut sealed);
//! writer.write_all(b"hello world")?;
//! writer.close()?;
//!
//! let mut opened = vec![];
//! encryption.reader(&sealed[..]).read_to_end(&mut opened)?;
//! assert_eq!(opened, b"hello world");
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A [`Writer`] must be closed. A stream that was never closed has no final
//! chunk and is rejected by the [`Reader`] as truncated.
//!
//! [`Write`]: std::io::Write
//! [`Read`]: std::io::Read
//! [RustCrypto]: https://github.com/RustCrypto
//! [`AsyncRead`]: tokio::io::AsyncRead
//! [`AsyncWrite`]: tokio::io::AsyncWrite
//!
//! ## ⚠️ Security Warning
//!
//! This crate has not received any formal cryptographic and security reviews/audits.
//!
//! **USE AT YOUR OWN RISK!**

mod codec;
mod config;
mod error;
mod header;
mod key;
mod middleware;
mod primitive;
mod reader;
mod writer;

pub use config::Config;
pub use error::{ConfigError, FramingError, StreamError};
pub use key::Key;
pub use middleware::{Close, Encryption, Middleware};
pub use primitive::{CipherSuite, Primitive};
pub use reader::Reader;
pub use writer::Writer;

/// Length of every key, in bytes.
pub const KEY_SIZE: usize = 32;

/// Length of a nonce for either cipher suite, in bytes.
pub const NONCE_SIZE: usize = 12;

/// Length of an authentication tag for either cipher suite, in bytes.
pub const TAG_SIZE: usize = 16;

/// Plaintext bytes per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest accepted chunk size, on both the writing and the reading side.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
