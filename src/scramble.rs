// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Keyed, invertible carrier scrambling.
//!
//! The permutation key is the hex SHA-256 of `blob || now_nanos || 16 random
//! bytes`: data-dependent through the blob, randomized through the nonce, so
//! identical payloads never produce identical keys while any stored key
//! fully reproduces its permutation. The shuffle itself is the portable
//! Fisher-Yates over a ChaCha20 PRNG, drawing `u32` ranges so the same key
//! yields the same permutation on 32-bit and 64-bit targets.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::carrier::PixelGrid;
use crate::error::{ForgeError, Result};

/// Result of a forward scramble.
#[derive(Debug, Clone)]
pub struct ScrambleOutcome {
    /// The carrier with its samples permuted, re-encoded as PNG.
    pub scrambled_carrier: Vec<u8>,
    /// Hex SHA-256 key that reproduces the permutation.
    pub permutation_key: String,
    /// Sample count the permutation was generated for. Inversion refuses
    /// carriers of any other size.
    pub element_count: usize,
}

/// Derive a fresh permutation key from the payload blob.
///
/// Never derived from content alone: a 16-byte random nonce and the current
/// time enter the hash so repeated runs over the same payload diverge.
fn derive_permutation_key(blob: &[u8]) -> String {
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut hasher = Sha256::new();
    hasher.update(blob);
    hasher.update(now_nanos.to_be_bytes());
    hasher.update(nonce);
    hex::encode(hasher.finalize())
}

/// PRNG seed for a permutation key: the first 4 bytes of the hex-decoded
/// key, or of SHA-256(key) when the key is not valid hex.
fn seed_for_key(key: &str) -> u64 {
    let digest;
    let bytes: &[u8] = match hex::decode(key) {
        Ok(decoded) if decoded.len() >= 4 => {
            digest = decoded;
            &digest
        }
        _ => {
            digest = Sha256::digest(key.as_bytes()).to_vec();
            &digest
        }
    };
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64
}

/// Uniform permutation of `[0, n)` regenerated deterministically from `key`.
fn permutation_for_key(key: &str, n: usize) -> Vec<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed_for_key(key));
    let mut perm: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=(i as u32)) as usize;
        perm.swap(i, j);
    }
    perm
}

/// Scramble a carrier image, keyed by `blob`.
///
/// # Errors
/// [`ForgeError::ImageDecode`] if the carrier is not a decodable 8-bit
/// pixel grid.
pub fn forward(blob: &[u8], carrier: &[u8]) -> Result<ScrambleOutcome> {
    let grid = PixelGrid::decode(carrier)?;
    let key = derive_permutation_key(blob);
    let n = grid.element_count();
    let perm = permutation_for_key(&key, n);

    let mut scrambled = grid.clone();
    for (i, &src) in perm.iter().enumerate() {
        scrambled.samples[i] = grid.samples[src];
    }

    Ok(ScrambleOutcome {
        scrambled_carrier: scrambled.encode_png()?,
        permutation_key: key,
        element_count: n,
    })
}

/// Invert a scramble using the stored key.
///
/// # Errors
/// - [`ForgeError::ImageDecode`] if the carrier does not decode.
/// - [`ForgeError::PermutationSizeMismatch`] if the decoded sample count is
///   not `element_count`; the carrier is never truncated or padded to fit.
pub fn inverse(scrambled_carrier: &[u8], permutation_key: &str, element_count: usize) -> Result<Vec<u8>> {
    let grid = PixelGrid::decode(scrambled_carrier)?;
    let n = grid.element_count();
    if n != element_count {
        return Err(ForgeError::PermutationSizeMismatch { expected: element_count, actual: n });
    }
    let perm = permutation_for_key(permutation_key, n);

    let mut restored = grid.clone();
    for (i, &src) in perm.iter().enumerate() {
        restored.samples[src] = grid.samples[i];
    }
    restored.encode_png()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::PixelFormat;

    fn test_carrier(width: u32, height: u32) -> Vec<u8> {
        let samples: Vec<u8> = (0..width * height * 3).map(|i| (i * 31 % 256) as u8).collect();
        PixelGrid { width, height, format: PixelFormat::Rgb8, samples }
            .encode_png()
            .unwrap()
    }

    #[test]
    fn forward_inverse_roundtrip() {
        let carrier = test_carrier(32, 24);
        let out = forward(b"payload blob", &carrier).unwrap();
        assert_ne!(out.scrambled_carrier, carrier);
        let restored = inverse(&out.scrambled_carrier, &out.permutation_key, out.element_count).unwrap();
        let original = PixelGrid::decode(&carrier).unwrap();
        let roundtrip = PixelGrid::decode(&restored).unwrap();
        assert_eq!(roundtrip.samples, original.samples);
        assert_eq!(roundtrip.format, original.format);
    }

    #[test]
    fn identical_payloads_get_distinct_keys() {
        let carrier = test_carrier(16, 16);
        let a = forward(b"same payload", &carrier).unwrap();
        let b = forward(b"same payload", &carrier).unwrap();
        assert_ne!(a.permutation_key, b.permutation_key);
        assert_ne!(a.scrambled_carrier, b.scrambled_carrier);
    }

    #[test]
    fn key_is_hex_sha256() {
        let carrier = test_carrier(8, 8);
        let out = forward(b"x", &carrier).unwrap();
        assert_eq!(out.permutation_key.len(), 64);
        assert!(out.permutation_key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn size_mismatch_refused() {
        let carrier = test_carrier(16, 16);
        let out = forward(b"blob", &carrier).unwrap();
        let other = test_carrier(17, 16);
        let result = inverse(&other, &out.permutation_key, out.element_count);
        assert!(matches!(result, Err(ForgeError::PermutationSizeMismatch { .. })));
    }

    #[test]
    fn undecodable_carrier_refused() {
        assert!(matches!(forward(b"b", b"not an image"), Err(ForgeError::ImageDecode(_))));
        assert!(matches!(
            inverse(b"not an image", "aabbccdd", 16),
            Err(ForgeError::ImageDecode(_))
        ));
    }

    #[test]
    fn non_hex_key_still_deterministic() {
        // A foreign key that is not hex falls back to hashing the key text;
        // the permutation must still be reproducible.
        let a = permutation_for_key("not-hex-at-all", 100);
        let b = permutation_for_key("not-hex-at-all", 100);
        assert_eq!(a, b);
    }

    #[test]
    fn permutation_is_a_bijection() {
        let perm = permutation_for_key(&"ab".repeat(32), 500);
        let mut seen = perm.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn luma_carrier_roundtrip() {
        let samples: Vec<u8> = (0..64u32 * 64).map(|i| (i % 256) as u8).collect();
        let carrier = PixelGrid { width: 64, height: 64, format: PixelFormat::L8, samples }
            .encode_png()
            .unwrap();
        let out = forward(b"gray", &carrier).unwrap();
        let restored = inverse(&out.scrambled_carrier, &out.permutation_key, out.element_count).unwrap();
        assert_eq!(
            PixelGrid::decode(&restored).unwrap().samples,
            PixelGrid::decode(&carrier).unwrap().samples
        );
    }
}
