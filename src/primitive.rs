// SPDX-License-Identifier: MIT

//! The two cryptographic primitives the generator is built from: an
//! HKDF-SHA256 mixing function and a ChaCha20 block function.
use crate::error::Error;

use chacha20::{
    cipher::{KeyIvInit, StreamCipher, StreamCipherSeek},
    ChaCha20, Key, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;

pub(crate) const KEY_LEN: usize = 32;
pub(crate) const NONCE_LEN: usize = 16;
pub(crate) const BLOCK_LEN: usize = 64;

// The 16 byte nonce is the 4 byte little-endian initial block counter
// followed by the 12 byte RFC 8439 nonce.
const COUNTER_LEN: usize = 4;

/// HKDF-SHA256 extract and expand of `ikm` under `salt`, bound to the
/// domain `label`. Fills all of `okm`.
///
/// # Error
///
/// Fails when `okm` is longer than 255 hash blocks.
pub(crate) fn derive(ikm: &[u8], salt: &[u8], label: &[u8], okm: &mut [u8]) -> Result<(), Error> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    hk.expand(label, okm).map_err(Error::primitive)
}

/// Whether [`keystream_block`] can serve `nonce`. A leading counter
/// word of `u32::MAX` leaves no room for a full block.
pub(crate) fn nonce_usable(nonce: &[u8; NONCE_LEN]) -> bool {
    nonce[..COUNTER_LEN] != [0xff; COUNTER_LEN]
}

/// One 64 byte ChaCha20 keystream block for `key` and `nonce`.
pub(crate) fn keystream_block(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<[u8; BLOCK_LEN], Error> {
    let (counter, iv) = nonce.split_at(COUNTER_LEN);
    let mut word = [0u8; COUNTER_LEN];
    word.copy_from_slice(counter);
    let position = u64::from(u32::from_le_bytes(word)) * BLOCK_LEN as u64;

    let mut cipher = ChaCha20::new(Key::from_slice(key), Nonce::from_slice(iv));
    cipher.try_seek(position).map_err(Error::primitive)?;
    let mut block = [0u8; BLOCK_LEN];
    cipher
        .try_apply_keystream(&mut block)
        .map_err(Error::primitive)?;
    Ok(block)
}
