//
// Copyright (c) 2023 Daniel Ottavio
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE
//
//! Entropy sources and the process environment the generator polls.
use crate::error::Error;

use std::{process, time::Instant};

/// Represents a source of cryptograplicly secure random data. It's
/// used to seed the generator, to reseed it and to salt every
/// derivation.
pub trait Entropy {
    /// Fill `bytes` with random data from the entropy source.
    ///
    /// # Error
    ///
    /// Returns an error if there is a problem with the underlying
    /// entropy source.
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error>;
}

/// An entropy source that draws random data from the host operating
/// system.
///
/// ```
/// use chacha_drbg::entropy::{OsEntropy, Entropy};
///
/// # use chacha_drbg::Error;
/// #
/// # fn main() -> Result<(),Error> {
/// #
/// let mut entropy = OsEntropy::default();
/// let mut random_data = [0u8; 32];
/// entropy.fill_bytes(&mut random_data)?;
/// #
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy {}

impl OsEntropy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Entropy for OsEntropy {
    /// Fill `bytes` with random data from the operating system using
    /// [`getrandom`](getrandom::getrandom).
    ///
    /// # Error
    ///
    /// Returns any error from `getrandom`.
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        getrandom::getrandom(bytes).map_err(Error::new)
    }
}

/// The clock and process identity the generator consults on every
/// request to decide whether it must reseed.
pub trait Platform {
    /// A monotonic timestamp, immune to wall-clock adjustment.
    fn now(&self) -> Instant;

    /// Identifier of the running process. It must change in a child
    /// created by `fork`.
    fn process_id(&self) -> u32;
}

/// [`Platform`] backed by [`Instant::now`] and [`process::id`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform {}

impl SystemPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for SystemPlatform {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn process_id(&self) -> u32 {
        process::id()
    }
}
