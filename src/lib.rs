// SPDX-License-Identifier: MIT

//! A cryptographic random number generator that mixes operating system
//! entropy with a ChaCha20 keystream.
//!
//! The generator derives its key and nonce with HKDF-SHA256 from OS
//! entropy and produces output as ChaCha20 keystream blocks under a
//! never-repeating block counter. After every request the key is
//! evolved through HKDF, so a later compromise of the state cannot
//! recover bytes already returned. The generator reseeds itself after a
//! configurable volume of output, after a configurable time, and on the
//! first request made in a process created by `fork`. It may be used
//! for generating sensitive data such as encryption keys, nonces and
//! tokens.
//!
//! # Quick Example
//!
//! A simple way to obtain crypographic random data is to use
//! [`SharedDrbg::new`](crate::shared::SharedDrbg::new). This returns a
//! handle that may be shared between threads and draws its entropy from
//! the OS.
//!
//! ```
//! use chacha_drbg::shared::SharedDrbg;
//!
//! # use chacha_drbg::Error;
//! #
//! # fn main() -> Result<(),Error> {
//! #
//! let rng = SharedDrbg::new(1 << 20, 300.0, None)?;
//! let key = rng.next_bytes(32)?;
//! let index = rng.random_below(1000)?;
//! # assert_eq!(32, key.len());
//! # assert!(index < 1000);
//! #
//! # Ok(())
//! # }
//! ```
//!
//! Otherwise an instance may be constructed by hand using the
//! [`ChaChaBuilder`](chacha::ChaChaBuilder) class. This allows the
//! caller to supply a different entropy source or platform and to
//! configure the reseed intervals.
//!
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod chacha;
#[cfg(feature = "diagnostics")]
#[cfg_attr(docsrs, doc(cfg(feature = "diagnostics")))]
pub mod diagnostics;
pub mod entropy;
pub mod error;
pub mod shared;

mod primitive;

pub use chacha::{ChaChaBuilder, ChaChaDrbg, MAX_REQUEST};
pub use error::Error;
pub use shared::SharedDrbg;
