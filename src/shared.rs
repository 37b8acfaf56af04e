// SPDX-License-Identifier: MIT

//! A thread-safe handle to a single generator instance.
use crate::{
    chacha::{interval_from_secs, ChaChaBuilder, ChaChaDrbg},
    entropy::{Entropy, OsEntropy, Platform, SystemPlatform},
    error::Error,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "rand_core")]
use rand_core::{TryCryptoRng, TryRngCore};

/// A generator shared between threads.
///
/// Every operation holds one exclusive lock for its whole duration,
/// from the reseed checks through keystream generation to key
/// evolution, so no two callers can ever consume the same keystream
/// block. A lock poisoned by a panicking caller is recovered: the
/// block counter only moves forward, so the state stays safe to use.
///
/// # Example
///
/// ```
/// # use chacha_drbg::Error;
/// use chacha_drbg::shared::SharedDrbg;
///
/// # fn main() -> Result<(),Error> {
/// let rng = SharedDrbg::new(1 << 20, 300.0, Some(b"tokens"))?;
/// let token = rng.next_bytes(32)?;
/// let die = rng.random_below(6)? + 1;
/// # assert_eq!(32, token.len());
/// # assert!((1..=6).contains(&die));
/// # Ok(())
/// # }
/// ```
pub struct SharedDrbg<E = OsEntropy, P = SystemPlatform> {
    inner: Mutex<ChaChaDrbg<E, P>>,
}

impl SharedDrbg {
    /// Create an instance seeded from the OS.
    ///
    /// - `reseed_interval_bytes` is raised to at least 2^16.
    ///
    /// - `reseed_interval_seconds` must be non-negative. Positive
    ///   infinity disables the time trigger.
    ///
    /// - `extra_seed` is mixed into the initial seed.
    ///
    /// # Error
    ///
    /// Returns [`Error::InvalidArgument`] for an invalid time interval
    /// and an entropy error when the OS cannot supply random data.
    pub fn new(
        reseed_interval_bytes: u64,
        reseed_interval_seconds: f64,
        extra_seed: Option<&[u8]>,
    ) -> Result<Self, Error> {
        let interval = interval_from_secs(reseed_interval_seconds)?;
        let drbg = ChaChaBuilder::new(OsEntropy::default())
            .reseed_interval_bytes(reseed_interval_bytes)
            .reseed_interval(interval)
            .extra_seed(extra_seed.unwrap_or(&[]))
            .build()?;
        Ok(Self::from(drbg))
    }

    /// Create an instance seeded from the OS with the default reseed
    /// intervals.
    pub fn with_defaults() -> Result<Self, Error> {
        ChaChaBuilder::new(OsEntropy::default())
            .build()
            .map(Self::from)
    }
}

impl<E, P> From<ChaChaDrbg<E, P>> for SharedDrbg<E, P> {
    fn from(drbg: ChaChaDrbg<E, P>) -> Self {
        Self {
            inner: Mutex::new(drbg),
        }
    }
}

impl<E, P> SharedDrbg<E, P>
where
    E: Entropy,
    P: Platform,
{
    /// See [`next_bytes`](crate::chacha::ChaChaDrbg::next_bytes) for details.
    pub fn next_bytes(&self, n: usize) -> Result<Vec<u8>, Error> {
        self.lock().next_bytes(n)
    }

    /// See [`fill_bytes`](crate::chacha::ChaChaDrbg::fill_bytes) for details.
    pub fn fill_bytes(&self, bytes: &mut [u8]) -> Result<(), Error> {
        self.lock().fill_bytes(bytes)
    }

    /// See [`reseed`](crate::chacha::ChaChaDrbg::reseed) for details.
    pub fn reseed(&self, extra: Option<&[u8]>) -> Result<(), Error> {
        self.lock().reseed(extra)
    }

    /// See [`random_below`](crate::chacha::ChaChaDrbg::random_below) for details.
    pub fn random_below(&self, k: u64) -> Result<u64, Error> {
        self.lock().random_below(k)
    }

    pub fn block_counter(&self) -> u64 {
        self.lock().block_counter()
    }

    pub fn bytes_since_reseed(&self) -> u64 {
        self.lock().bytes_since_reseed()
    }

    /// Consume the handle and return the generator.
    pub fn into_inner(self) -> ChaChaDrbg<E, P> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, ChaChaDrbg<E, P>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("chacha-drbg lock poisoned by a panicking caller, recovering");
            self.inner.clear_poison();
            poisoned.into_inner()
        })
    }
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, P> TryCryptoRng for SharedDrbg<E, P> where SharedDrbg<E, P>: TryRngCore {}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, P> TryRngCore for SharedDrbg<E, P>
where
    E: Entropy,
    P: Platform,
{
    type Error = Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        self.lock().try_next_u32()
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        self.lock().try_next_u64()
    }

    fn try_fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.lock().try_fill_bytes(bytes)
    }
}
