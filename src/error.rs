// SPDX-License-Identifier: MIT

//! Error type shared by the generator and its primitives.
use core::fmt::{Debug, Display};
use thiserror::Error;

/// Errors returned by the generator.
///
/// Every error is local to the call that produced it. A failed call
/// leaves the generator usable and a later call may succeed once the
/// transient cause has cleared.
#[derive(Error, Debug)]
pub enum Error {
    /// An argument was out of range. No output was produced and the
    /// generator state was not touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The entropy source failed to deliver random data.
    #[error("entropy error: {0}")]
    Entropy(String),

    /// The key derivation function or the keystream cipher failed.
    #[error("primitive failure: {0}")]
    Primitive(String),
}

impl Error {
    /// Create a new error by wrapping an underlying entropy source
    /// error.
    ///
    /// # Example
    /// ```
    /// use chacha_drbg::Error;
    ///
    /// fn fill_bytes(bytes: &mut [u8]) -> Result<(), Error> {
    ///    getrandom::getrandom(bytes).map_err(Error::new)
    /// }
    /// ```
    pub fn new<E>(error: E) -> Self
    where
        E: Display + Debug,
    {
        Self::Entropy(error.to_string())
    }

    pub(crate) fn primitive<E>(error: E) -> Self
    where
        E: Display,
    {
        Self::Primitive(error.to_string())
    }

    /// Returns `true` for [`Error::InvalidArgument`].
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}
