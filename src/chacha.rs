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
//! A module to facilitate the ChaCha20 keystream generator.
//!
//! The generator is implemented via the [`ChaChaDrbg`] type. This type
//! may be instantiated using the builder class [`ChaChaBuilder`].
//!
use crate::{
    entropy::{Entropy, Platform, SystemPlatform},
    error::Error,
    primitive::{self, BLOCK_LEN, KEY_LEN, NONCE_LEN},
};

use core::fmt;
use std::time::{Duration, Instant};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

#[cfg(feature = "rand_core")]
use rand_core::{TryCryptoRng, TryRngCore};

/// Largest request, in bytes, served by a single call to
/// [`ChaChaDrbg::next_bytes`].
pub const MAX_REQUEST: usize = 10_000_000;

/// Floor applied to the byte-volume reseed interval.
pub const MIN_RESEED_INTERVAL_BYTES: u64 = 1 << 16;

/// Byte-volume reseed interval used unless the builder sets one.
pub const DEFAULT_RESEED_INTERVAL_BYTES: u64 = 1 << 20;

/// Time reseed interval used unless the builder sets one.
pub const DEFAULT_RESEED_INTERVAL: Duration = Duration::from_secs(300);

const SEED_LEN: usize = 32;
const SALT_LEN: usize = 32;
const MATERIAL_LEN: usize = KEY_LEN + NONCE_LEN;
const COUNTER_LEN: usize = 8;
const NONCE_PREFIX_LEN: usize = NONCE_LEN - COUNTER_LEN;

//
// derivation labels
//
const INIT_LABEL: &[u8] = b"chacha-drbg v1 init";
const RESEED_LABEL: &[u8] = b"chacha-drbg v1 reseed";
const EVOLVE_LABEL: &[u8] = b"chacha-drbg v1 key-evolve";

/// A ChaCha20 keystream generator seeded and periodically reseeded
/// from an [`Entropy`] source. Every key and nonce is derived with
/// HKDF-SHA256 and the key is evolved after each request, so a
/// compromise of the current state does not reveal earlier output.
///
/// The generator reseeds itself before serving a request when any of
/// the following holds:
///
/// - the process id differs from the one that seeded it (a `fork`),
///
/// - the bytes served since the last reseed reached the byte interval,
///
/// - the time since the last reseed reached the time interval,
///
/// - the block counter has no room left for the request,
///
/// - the nonce base cannot be served by the ChaCha20 block function.
///
/// Instantiation of this type is performed using the builder class
/// [`ChaChaBuilder`].
///
/// # Example
///
/// ```
/// use chacha_drbg::{chacha::ChaChaBuilder, entropy::OsEntropy};
///
/// # use chacha_drbg::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// // Build a new instance
/// let mut drbg = ChaChaBuilder::new(OsEntropy::default()).build()?;
///
/// // Generate random data
/// let random_data = drbg.next_bytes(32)?;
///
/// // Reseed the instance
/// drbg.reseed(None)?;
/// #
/// # Ok(())
/// # }
/// ```
pub struct ChaChaDrbg<E, P = SystemPlatform> {
    secret: SecretState,
    block_counter: u64,
    bytes_since_reseed: u64,
    last_reseed: Instant,
    owner_pid: u32,
    reseed_interval_bytes: u64,
    reseed_interval: Duration,
    entropy: E,
    platform: P,
}

/// Builder class for allocating `ChaChaDrbg` instances.
///
/// Unless an entropy source other than
/// [`OsEntropy`](crate::entropy::OsEntropy) is required, it is
/// recommended to use [`SharedDrbg::new`](crate::shared::SharedDrbg::new)
/// rather than allocate this type by hand.
///
/// # Example
/// ```
/// use chacha_drbg::{chacha::ChaChaBuilder, entropy::OsEntropy};
/// use std::time::Duration;
///
/// # use chacha_drbg::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// let mut drbg = ChaChaBuilder::new(OsEntropy::default())
///     .extra_seed(b"session-tokens")
///     .reseed_interval_bytes(1 << 18)
///     .reseed_interval(Duration::from_secs(60))
///     .build()?;
/// #
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChaChaBuilder<'a, E, P = SystemPlatform> {
    extra_seed: Option<&'a [u8]>,
    reseed_interval_bytes: u64,
    reseed_interval: Duration,
    entropy: E,
    platform: P,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct SecretState {
    key: [u8; KEY_LEN],
    nonce_base: [u8; NONCE_LEN],
}

impl SecretState {
    fn from_material(material: &[u8; MATERIAL_LEN]) -> Self {
        let mut secret = Self {
            key: [0u8; KEY_LEN],
            nonce_base: [0u8; NONCE_LEN],
        };
        secret.key.copy_from_slice(&material[..KEY_LEN]);
        secret.nonce_base.copy_from_slice(&material[KEY_LEN..]);
        secret
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReseedReason {
    Fork,
    ByteVolume,
    Interval,
    CounterHeadroom,
    UnusableNonce,
    Explicit,
}

impl fmt::Display for ReseedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Fork => "fork",
            Self::ByteVolume => "byte-volume",
            Self::Interval => "interval",
            Self::CounterHeadroom => "counter-headroom",
            Self::UnusableNonce => "unusable-nonce",
            Self::Explicit => "explicit",
        };
        f.write_str(reason)
    }
}

/// Convert a reseed interval given in seconds.
///
/// Positive infinity disables the time trigger.
///
/// # Error
///
/// Returns [`Error::InvalidArgument`] for negative, NaN or
/// unrepresentable values.
pub fn interval_from_secs(secs: f64) -> Result<Duration, Error> {
    if secs == f64::INFINITY {
        return Ok(Duration::MAX);
    }
    Duration::try_from_secs_f64(secs).map_err(|_| {
        Error::InvalidArgument("reseed interval must be a non-negative number of seconds")
    })
}

impl<'a, E> ChaChaBuilder<'a, E>
where
    E: Entropy,
{
    pub fn new(entropy: E) -> Self {
        Self {
            extra_seed: None,
            reseed_interval_bytes: DEFAULT_RESEED_INTERVAL_BYTES,
            reseed_interval: DEFAULT_RESEED_INTERVAL,
            entropy,
            platform: SystemPlatform::default(),
        }
    }
}

impl<'a, E, P> ChaChaBuilder<'a, E, P>
where
    E: Entropy,
    P: Platform,
{
    /// Specify the clock and process identity the instance polls for
    /// its time and fork triggers.
    ///
    /// By default, this is [`SystemPlatform`].
    pub fn platform<Q: Platform>(self, platform: Q) -> ChaChaBuilder<'a, E, Q> {
        ChaChaBuilder {
            extra_seed: self.extra_seed,
            reseed_interval_bytes: self.reseed_interval_bytes,
            reseed_interval: self.reseed_interval,
            entropy: self.entropy,
            platform,
        }
    }

    /// Specify the number of output bytes after which the instance
    /// reseeds itself. Values below 2^16 are raised to 2^16.
    ///
    /// By default, this value is 2^20.
    pub fn reseed_interval_bytes(mut self, bytes: u64) -> ChaChaBuilder<'a, E, P> {
        self.reseed_interval_bytes = bytes.max(MIN_RESEED_INTERVAL_BYTES);
        self
    }

    /// Specify the time after which the instance reseeds itself on
    /// its next request. [`Duration::ZERO`] reseeds on every request
    /// and [`Duration::MAX`] never reseeds on time.
    ///
    /// By default, this value is 300 seconds.
    pub fn reseed_interval(mut self, interval: Duration) -> ChaChaBuilder<'a, E, P> {
        self.reseed_interval = interval;
        self
    }

    /// Specify caller data mixed into the initial seed, such as a
    /// subsystem name.
    ///
    /// By default, this value is empty.
    pub fn extra_seed(mut self, extra: &'a [u8]) -> ChaChaBuilder<'a, E, P> {
        self.extra_seed = Some(extra);
        self
    }

    /// Build and return a new [`ChaChaDrbg`] instance.
    ///
    /// # Error
    ///
    /// Returns an error when there is an problem reading from the
    /// entropy source.
    pub fn build(self) -> Result<ChaChaDrbg<E, P>, Error> {
        ChaChaDrbg::new(
            self.entropy,
            self.platform,
            self.extra_seed.unwrap_or(&[]),
            self.reseed_interval_bytes,
            self.reseed_interval,
        )
    }
}

impl<E, P> fmt::Debug for ChaChaDrbg<E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChaChaDrbg")
            .field("reseed_interval_bytes", &self.reseed_interval_bytes)
            .field("reseed_interval", &self.reseed_interval)
            .field("block_counter", &self.block_counter)
            .field("bytes_since_reseed", &self.bytes_since_reseed)
            .finish_non_exhaustive()
    }
}

impl<E, P> ChaChaDrbg<E, P>
where
    E: Entropy,
    P: Platform,
{
    /// Return exactly `n` random bytes.
    ///
    /// A request for zero bytes returns immediately without touching
    /// the state.
    ///
    /// # Error
    ///
    /// Returns [`Error::InvalidArgument`] if `n` exceeds
    /// [`MAX_REQUEST`], in which case the state is left untouched. Any
    /// other error comes from a reseed or a primitive and no output is
    /// returned.
    pub fn next_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        if n > MAX_REQUEST {
            return Err(Error::InvalidArgument("request exceeds MAX_REQUEST bytes"));
        }
        let mut bytes = vec![0u8; n];
        if let Err(err) = self.generate(&mut bytes) {
            bytes.zeroize();
            return Err(err);
        }
        Ok(bytes)
    }

    /// Fill the slice `bytes` with random data.
    ///
    /// There is no limit to the length of `bytes`. The slice is passed
    /// in chunks no larger than [`MAX_REQUEST`] to the underlying
    /// generate function, so each chunk runs the reseed checks and
    /// evolves the key.
    ///
    /// # Error
    ///
    /// Returns an error when a reseed or a primitive fails. Chunks
    /// filled before the failure keep their data.
    pub fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        for blk in bytes.chunks_mut(MAX_REQUEST) {
            self.generate(blk)?;
        }
        Ok(())
    }

    /// Reseed with 32 bytes of new entropy. Optional `extra` data is
    /// mixed in together with the current key, nonce and counter.
    ///
    /// # Error
    ///
    /// Returns an error when there is an problem reading from the
    /// entropy source. The state is unchanged in that case.
    pub fn reseed(&mut self, extra: Option<&[u8]>) -> Result<(), Error> {
        self.reseed_with(extra.unwrap_or(&[]), ReseedReason::Explicit)
    }

    /// Return a uniformly distributed integer in `[0, k)`.
    ///
    /// Draws the fewest bytes covering the bit length of `k`, masks
    /// them to that bit length and rejects values `>= k`. Fewer than two
    /// draws are needed on average.
    ///
    /// # Error
    ///
    /// Returns [`Error::InvalidArgument`] if `k` is zero.
    pub fn random_below(&mut self, k: u64) -> Result<u64, Error> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive"));
        }
        let bits = u64::BITS - k.leading_zeros();
        let len = bits.div_ceil(8) as usize;
        let mask = u64::MAX >> (u64::BITS - bits);

        let mut buf = Zeroizing::new([0u8; 8]);
        loop {
            self.generate(&mut buf[8 - len..])?;
            let x = u64::from_be_bytes(*buf) & mask;
            if x < k {
                return Ok(x);
            }
        }
    }

    /// Keystream blocks produced since the last reseed.
    pub fn block_counter(&self) -> u64 {
        self.block_counter
    }

    /// Output bytes served since the last reseed.
    pub fn bytes_since_reseed(&self) -> u64 {
        self.bytes_since_reseed
    }

    /// Output bytes after which the instance reseeds itself.
    pub fn reseed_interval_bytes(&self) -> u64 {
        self.reseed_interval_bytes
    }

    /// Time after which the instance reseeds on its next request.
    pub fn reseed_interval(&self) -> Duration {
        self.reseed_interval
    }

    fn new(
        mut entropy: E,
        platform: P,
        extra_seed: &[u8],
        reseed_interval_bytes: u64,
        reseed_interval: Duration,
    ) -> Result<Self, Error> {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        entropy.fill_bytes(&mut *seed)?;
        let mut noise = Zeroizing::new([0u8; SEED_LEN]);
        entropy.fill_bytes(&mut *noise)?;
        let mut salt = [0u8; SALT_LEN];
        entropy.fill_bytes(&mut salt)?;

        let mut ikm = Zeroizing::new(Vec::with_capacity(
            seed.len() + extra_seed.len() + noise.len(),
        ));
        ikm.extend_from_slice(&*seed);
        ikm.extend_from_slice(extra_seed);
        ikm.extend_from_slice(&*noise);
        let mut material = Zeroizing::new([0u8; MATERIAL_LEN]);
        primitive::derive(&ikm, &salt, INIT_LABEL, &mut *material)?;

        let owner_pid = platform.process_id();
        log::debug!("chacha-drbg seeded in process {owner_pid}");
        Ok(Self {
            secret: SecretState::from_material(&material),
            block_counter: 0,
            bytes_since_reseed: 0,
            last_reseed: platform.now(),
            owner_pid,
            reseed_interval_bytes: reseed_interval_bytes.max(MIN_RESEED_INTERVAL_BYTES),
            reseed_interval,
            entropy,
            platform,
        })
    }

    fn reseed_with(&mut self, extra: &[u8], reason: ReseedReason) -> Result<(), Error> {
        let mut fresh = Zeroizing::new([0u8; SEED_LEN]);
        self.entropy.fill_bytes(&mut *fresh)?;
        let mut salt = [0u8; SALT_LEN];
        self.entropy.fill_bytes(&mut salt)?;

        let mut ikm = Zeroizing::new(Vec::with_capacity(
            KEY_LEN + NONCE_LEN + COUNTER_LEN + fresh.len() + extra.len(),
        ));
        ikm.extend_from_slice(&self.secret.key);
        ikm.extend_from_slice(&self.secret.nonce_base);
        ikm.extend_from_slice(&self.block_counter.to_be_bytes());
        ikm.extend_from_slice(&*fresh);
        ikm.extend_from_slice(extra);
        let mut material = Zeroizing::new([0u8; MATERIAL_LEN]);
        primitive::derive(&ikm, &salt, RESEED_LABEL, &mut *material)?;

        // The old secret is zeroed as it is dropped.
        self.secret = SecretState::from_material(&material);
        self.block_counter = 0;
        self.bytes_since_reseed = 0;
        self.last_reseed = self.platform.now();
        self.owner_pid = self.platform.process_id();
        log::debug!("chacha-drbg reseeded ({reason})");
        Ok(())
    }

    fn reseed_reason(&self, len: usize) -> Option<ReseedReason> {
        if self.platform.process_id() != self.owner_pid {
            return Some(ReseedReason::Fork);
        }
        if self.bytes_since_reseed >= self.reseed_interval_bytes {
            return Some(ReseedReason::ByteVolume);
        }
        let elapsed = self
            .platform
            .now()
            .saturating_duration_since(self.last_reseed);
        if elapsed >= self.reseed_interval {
            return Some(ReseedReason::Interval);
        }
        let blocks = len.div_ceil(BLOCK_LEN) as u64;
        if self.block_counter.checked_add(blocks).is_none() {
            return Some(ReseedReason::CounterHeadroom);
        }
        if !primitive::nonce_usable(&self.secret.nonce_base) {
            return Some(ReseedReason::UnusableNonce);
        }
        None
    }

    fn generate(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        debug_assert!(bytes.len() <= MAX_REQUEST);

        if let Some(reason) = self.reseed_reason(bytes.len()) {
            self.reseed_with(&[], reason)?;
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce[..NONCE_PREFIX_LEN].copy_from_slice(&self.secret.nonce_base[..NONCE_PREFIX_LEN]);
        for blk in bytes.chunks_mut(BLOCK_LEN) {
            nonce[NONCE_PREFIX_LEN..].copy_from_slice(&self.block_counter.to_be_bytes());
            let mut keystream = primitive::keystream_block(&self.secret.key, &nonce)?;
            self.block_counter += 1;
            blk.copy_from_slice(&keystream[..blk.len()]);
            keystream.zeroize();
        }
        self.evolve_key()?;
        self.bytes_since_reseed = self.bytes_since_reseed.saturating_add(bytes.len() as u64);
        log::trace!(
            "chacha-drbg served {} bytes, counter at {}",
            bytes.len(),
            self.block_counter
        );
        Ok(())
    }

    fn evolve_key(&mut self) -> Result<(), Error> {
        let mut ikm = Zeroizing::new([0u8; KEY_LEN + COUNTER_LEN]);
        ikm[..KEY_LEN].copy_from_slice(&self.secret.key);
        ikm[KEY_LEN..].copy_from_slice(&self.block_counter.to_be_bytes());
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        primitive::derive(&*ikm, &self.secret.nonce_base, EVOLVE_LABEL, &mut *key)?;
        self.secret.key.copy_from_slice(&*key);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_block_counter_for_test(&mut self, counter: u64) {
        self.block_counter = counter;
    }

    #[cfg(test)]
    pub(crate) fn set_nonce_base_for_test(&mut self, nonce_base: [u8; NONCE_LEN]) {
        self.secret.nonce_base = nonce_base;
    }

    #[cfg(test)]
    pub(crate) fn key_for_test(&self) -> [u8; KEY_LEN] {
        self.secret.key
    }
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, P> TryCryptoRng for ChaChaDrbg<E, P> where ChaChaDrbg<E, P>: TryRngCore {}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, P> TryRngCore for ChaChaDrbg<E, P>
where
    E: Entropy,
    P: Platform,
{
    type Error = Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn try_fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.fill_bytes(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use statrs::distribution::{ChiSquared, ContinuousCDF};
    use std::sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    };

    /// Deterministic entropy: a running byte counter, with a switch
    /// that makes every draw fail.
    #[derive(Clone, Default)]
    pub(crate) struct MockEntropy {
        next: u8,
        offline: Arc<AtomicBool>,
    }

    impl MockEntropy {
        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    impl Entropy for MockEntropy {
        fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::new("mock entropy offline"));
            }
            for b in bytes.iter_mut() {
                *b = self.next;
                self.next = self.next.wrapping_add(1);
            }
            Ok(())
        }
    }

    /// A clock that only moves when told to and a process id that only
    /// changes on a simulated fork.
    #[derive(Clone)]
    pub(crate) struct MockPlatform {
        base: Instant,
        elapsed_ms: Arc<AtomicU64>,
        pid: Arc<AtomicU32>,
    }

    impl Default for MockPlatform {
        fn default() -> Self {
            Self {
                base: Instant::now(),
                elapsed_ms: Arc::new(AtomicU64::new(0)),
                pid: Arc::new(AtomicU32::new(1000)),
            }
        }
    }

    impl MockPlatform {
        pub(crate) fn advance(&self, by: Duration) {
            self.elapsed_ms
                .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }

        pub(crate) fn fork(&self) {
            self.pid.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Platform for MockPlatform {
        fn now(&self) -> Instant {
            self.base + Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
        }

        fn process_id(&self) -> u32 {
            self.pid.load(Ordering::SeqCst)
        }
    }

    fn mock_drbg() -> (ChaChaDrbg<MockEntropy, MockPlatform>, MockEntropy, MockPlatform) {
        let entropy = MockEntropy::default();
        let platform = MockPlatform::default();
        let drbg = ChaChaBuilder::new(entropy.clone())
            .platform(platform.clone())
            .reseed_interval(Duration::from_secs(10))
            .build()
            .unwrap();
        (drbg, entropy, platform)
    }

    #[test]
    fn build_defaults() -> Result<(), Error> {
        let drbg = ChaChaBuilder::new(MockEntropy::default()).build()?;
        assert_eq!(0, drbg.block_counter());
        assert_eq!(0, drbg.bytes_since_reseed());
        assert_eq!(DEFAULT_RESEED_INTERVAL_BYTES, drbg.reseed_interval_bytes());
        assert_eq!(DEFAULT_RESEED_INTERVAL, drbg.reseed_interval());
        Ok(())
    }

    #[test]
    fn reseed_interval_bytes_is_clamped() -> Result<(), Error> {
        let drbg = ChaChaBuilder::new(MockEntropy::default())
            .reseed_interval_bytes(1)
            .build()?;
        assert_eq!(MIN_RESEED_INTERVAL_BYTES, drbg.reseed_interval_bytes());
        Ok(())
    }

    #[test]
    fn next_bytes_lengths() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        for n in [0, 1, 32, 63, 64, 65, 1000, 4096] {
            assert_eq!(n, drbg.next_bytes(n)?.len());
        }
        Ok(())
    }

    #[test]
    fn seeding_is_deterministic_for_equal_inputs() -> Result<(), Error> {
        let (mut a, _, _) = mock_drbg();
        let (mut b, _, _) = mock_drbg();
        assert_eq!(a.next_bytes(96)?, b.next_bytes(96)?);
        Ok(())
    }

    #[test]
    fn extra_seed_separates_streams() -> Result<(), Error> {
        let mut a = ChaChaBuilder::new(MockEntropy::default())
            .extra_seed(b"subsystem-a")
            .build()?;
        let mut b = ChaChaBuilder::new(MockEntropy::default())
            .extra_seed(b"subsystem-b")
            .build()?;
        assert_ne!(a.next_bytes(64)?, b.next_bytes(64)?);
        Ok(())
    }

    #[test]
    fn zero_length_request_is_a_noop() -> Result<(), Error> {
        let (mut a, _, _) = mock_drbg();
        let (mut b, _, _) = mock_drbg();

        let a0 = a.next_bytes(32)?;
        let key = a.key_for_test();
        assert!(a.next_bytes(0)?.is_empty());
        assert_eq!(key, a.key_for_test());
        assert_eq!(1, a.block_counter());
        assert_eq!(32, a.bytes_since_reseed());
        let a1 = a.next_bytes(32)?;

        let b0 = b.next_bytes(32)?;
        let b1 = b.next_bytes(32)?;
        assert_eq!(a0, b0);
        assert_eq!(a1, b1);
        Ok(())
    }

    #[test]
    fn oversized_request_leaves_state_untouched() -> Result<(), Error> {
        let (mut a, _, _) = mock_drbg();
        let (mut b, _, _) = mock_drbg();

        let err = a.next_bytes(MAX_REQUEST + 1).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(0, a.block_counter());
        assert_eq!(a.next_bytes(64)?, b.next_bytes(64)?);
        Ok(())
    }

    #[test]
    fn successive_requests_differ() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        let a = drbg.next_bytes(64)?;
        let b = drbg.next_bytes(64)?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn key_evolves_after_every_request() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        let k0 = drbg.key_for_test();
        drbg.next_bytes(1)?;
        let k1 = drbg.key_for_test();
        drbg.next_bytes(1)?;
        let k2 = drbg.key_for_test();
        assert_ne!(k0, k1);
        assert_ne!(k1, k2);
        Ok(())
    }

    #[test]
    fn counter_advances_per_block() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        drbg.next_bytes(65)?;
        assert_eq!(2, drbg.block_counter());
        drbg.next_bytes(64)?;
        assert_eq!(3, drbg.block_counter());
        assert_eq!(129, drbg.bytes_since_reseed());
        Ok(())
    }

    #[test]
    fn explicit_reseed_resets_counters_and_changes_stream() -> Result<(), Error> {
        let (mut a, _, _) = mock_drbg();
        let (mut b, _, _) = mock_drbg();
        assert_eq!(a.next_bytes(64)?, b.next_bytes(64)?);

        a.reseed(Some(b"extra"))?;
        assert_eq!(0, a.block_counter());
        assert_eq!(0, a.bytes_since_reseed());
        b.next_bytes(0)?;
        assert_ne!(a.next_bytes(64)?, b.next_bytes(64)?);
        Ok(())
    }

    #[test]
    fn reseed_extra_data_is_mixed_in() -> Result<(), Error> {
        let (mut a, _, _) = mock_drbg();
        let (mut b, _, _) = mock_drbg();
        a.reseed(Some(b"one"))?;
        b.reseed(Some(b"two"))?;
        assert_ne!(a.next_bytes(64)?, b.next_bytes(64)?);
        Ok(())
    }

    #[test]
    fn byte_volume_triggers_reseed() -> Result<(), Error> {
        let mut drbg = ChaChaBuilder::new(MockEntropy::default())
            .platform(MockPlatform::default())
            .reseed_interval_bytes(MIN_RESEED_INTERVAL_BYTES)
            .build()?;
        drbg.next_bytes(MIN_RESEED_INTERVAL_BYTES as usize)?;
        assert_eq!(MIN_RESEED_INTERVAL_BYTES, drbg.bytes_since_reseed());
        assert_eq!(MIN_RESEED_INTERVAL_BYTES / 64, drbg.block_counter());

        drbg.next_bytes(64)?;
        assert_eq!(64, drbg.bytes_since_reseed());
        assert_eq!(1, drbg.block_counter());
        Ok(())
    }

    #[test]
    fn byte_volume_below_interval_does_not_reseed() -> Result<(), Error> {
        let mut drbg = ChaChaBuilder::new(MockEntropy::default())
            .platform(MockPlatform::default())
            .reseed_interval_bytes(MIN_RESEED_INTERVAL_BYTES)
            .build()?;
        let short = MIN_RESEED_INTERVAL_BYTES - 1;
        drbg.next_bytes(short as usize)?;
        assert_eq!(short, drbg.bytes_since_reseed());
        assert_eq!(1024, drbg.block_counter());

        drbg.next_bytes(64)?;
        assert_eq!(short + 64, drbg.bytes_since_reseed());
        assert_eq!(1025, drbg.block_counter());

        drbg.next_bytes(64)?;
        assert_eq!(64, drbg.bytes_since_reseed());
        assert_eq!(1, drbg.block_counter());
        Ok(())
    }

    #[test]
    fn unusable_nonce_base_triggers_reseed() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        drbg.next_bytes(64)?;

        let mut nonce_base = [0x11u8; NONCE_LEN];
        nonce_base[..4].copy_from_slice(&[0xff; 4]);
        drbg.set_nonce_base_for_test(nonce_base);

        for _ in 0..3 {
            assert_eq!(64, drbg.next_bytes(64)?.len());
        }
        assert_eq!(3, drbg.block_counter());
        assert_eq!(192, drbg.bytes_since_reseed());
        Ok(())
    }

    #[test]
    fn interval_triggers_reseed() -> Result<(), Error> {
        let (mut drbg, _, platform) = mock_drbg();
        drbg.next_bytes(64)?;
        platform.advance(Duration::from_secs(9));
        drbg.next_bytes(64)?;
        assert_eq!(128, drbg.bytes_since_reseed());

        platform.advance(Duration::from_secs(1));
        drbg.next_bytes(64)?;
        assert_eq!(64, drbg.bytes_since_reseed());
        assert_eq!(1, drbg.block_counter());
        Ok(())
    }

    #[test]
    fn zero_interval_reseeds_every_request() -> Result<(), Error> {
        let mut drbg = ChaChaBuilder::new(MockEntropy::default())
            .platform(MockPlatform::default())
            .reseed_interval(Duration::ZERO)
            .build()?;
        for _ in 0..4 {
            drbg.next_bytes(100)?;
            assert_eq!(100, drbg.bytes_since_reseed());
        }
        Ok(())
    }

    #[test]
    fn fork_triggers_reseed() -> Result<(), Error> {
        let (mut parent, _, _) = mock_drbg();
        let (mut child, _, platform) = mock_drbg();
        assert_eq!(parent.next_bytes(64)?, child.next_bytes(64)?);

        platform.fork();
        let p = parent.next_bytes(64)?;
        let c = child.next_bytes(64)?;
        assert_ne!(p, c);
        assert_eq!(128, parent.bytes_since_reseed());
        assert_eq!(64, child.bytes_since_reseed());

        // The new process id is recorded, so the next request does not
        // reseed again.
        child.next_bytes(64)?;
        assert_eq!(128, child.bytes_since_reseed());
        Ok(())
    }

    #[test]
    fn counter_headroom_triggers_reseed() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        drbg.set_block_counter_for_test(u64::MAX - 1);
        drbg.next_bytes(64)?;
        assert_eq!(u64::MAX, drbg.block_counter());

        drbg.set_block_counter_for_test(u64::MAX - 1);
        drbg.next_bytes(128)?;
        assert_eq!(2, drbg.block_counter());
        assert_eq!(128, drbg.bytes_since_reseed());
        Ok(())
    }

    #[test]
    fn entropy_failure_on_build() {
        let entropy = MockEntropy::default();
        entropy.set_offline(true);
        let err = ChaChaBuilder::new(entropy).build().unwrap_err();
        assert!(matches!(err, Error::Entropy(_)));
    }

    #[test]
    fn entropy_failure_is_not_permanent() -> Result<(), Error> {
        let (mut drbg, entropy, platform) = mock_drbg();
        drbg.next_bytes(64)?;

        entropy.set_offline(true);
        let key = drbg.key_for_test();
        assert!(matches!(drbg.reseed(None), Err(Error::Entropy(_))));
        assert_eq!(key, drbg.key_for_test());
        assert_eq!(64, drbg.bytes_since_reseed());

        // A forced reseed cannot be skipped while the source is down.
        platform.fork();
        assert!(matches!(drbg.next_bytes(64), Err(Error::Entropy(_))));
        assert_eq!(1, drbg.block_counter());

        entropy.set_offline(false);
        assert_eq!(64, drbg.next_bytes(64)?.len());
        assert_eq!(64, drbg.bytes_since_reseed());
        Ok(())
    }

    #[test]
    fn fill_bytes_counts_every_byte() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        let mut buf = [0u8; 1000];
        drbg.fill_bytes(&mut buf)?;
        assert_ne!([0u8; 1000], buf);
        assert_eq!(1000, drbg.bytes_since_reseed());
        assert_eq!(16, drbg.block_counter());
        Ok(())
    }

    #[test]
    fn random_below_rejects_zero() {
        let (mut drbg, _, _) = mock_drbg();
        assert!(drbg.random_below(0).unwrap_err().is_invalid_argument());
        assert_eq!(0, drbg.block_counter());
    }

    #[test]
    fn random_below_range() -> Result<(), Error> {
        let (mut drbg, _, _) = mock_drbg();
        for k in [1, 2, 3, 7, 17, 100, 255, 256, 257, 1000, 1 << 40, u64::MAX] {
            for _ in 0..50 {
                assert!(drbg.random_below(k)? < k);
            }
        }
        Ok(())
    }

    #[test]
    fn random_below_is_uniform() -> Result<(), Error> {
        let mut drbg = ChaChaBuilder::new(crate::entropy::OsEntropy::default()).build()?;
        for k in [2u64, 3, 7, 17, 100, 1000] {
            let trials = (50 * k).max(1000);
            let mut hist = vec![0u64; k as usize];
            for _ in 0..trials {
                hist[drbg.random_below(k)? as usize] += 1;
            }
            let expected = trials as f64 / k as f64;
            let chi2: f64 = hist
                .iter()
                .map(|&c| {
                    let diff = c as f64 - expected;
                    diff * diff / expected
                })
                .sum();
            let p = ChiSquared::new((k - 1) as f64).unwrap().sf(chi2);
            assert!(p > 1e-4, "k={k} chi2={chi2} p={p}");
        }
        Ok(())
    }

    #[test]
    fn interval_from_secs_validation() {
        assert_eq!(Duration::from_millis(10), interval_from_secs(0.01).unwrap());
        assert_eq!(Duration::ZERO, interval_from_secs(0.0).unwrap());
        assert_eq!(Duration::MAX, interval_from_secs(f64::INFINITY).unwrap());
        assert!(interval_from_secs(-1.0).unwrap_err().is_invalid_argument());
        assert!(interval_from_secs(f64::NAN).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn debug_hides_secrets() {
        let (drbg, _, _) = mock_drbg();
        let rendered = format!("{drbg:?}");
        assert!(rendered.contains("block_counter"));
        assert!(!rendered.contains("key"));
        assert!(!rendered.contains("nonce"));
    }
}
