// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Steganographic bit embedding.
//!
//! The [`StegoCodec`] capability is injected at controller construction and
//! must be exactly invertible given identical password and layer count. The
//! default backend writes the payload into the low bits of the carrier's
//! samples, visiting samples in a password-keyed Fisher-Yates order so the
//! bit positions are not recoverable without the password.
//!
//! Frame layout inside the carrier bits:
//!
//! ```text
//! [4 bytes] payload length (big-endian u32)
//! [4 bytes] CRC-32 of the payload
//! [N bytes] payload
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::carrier::PixelGrid;
use crate::error::{ForgeError, Result};

/// Exactly-invertible steganographic backend.
pub trait StegoCodec: Send + Sync {
    fn embed(&self, payload: &[u8], carrier: &[u8], password: &str, layers: u8) -> Result<Vec<u8>>;
    fn extract(&self, image: &[u8], password: &str, layers: u8) -> Result<Vec<u8>>;
}

/// Default number of bit layers used per sample.
pub const DEFAULT_LAYERS: u8 = 2;

/// Domain separator for the position-key derivation.
const POSITION_KEY_CONTEXT: &[u8] = b"forge-stego-positions-v1";

/// Low-bit embedding with password-keyed sample ordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct LsbCodec;

fn validate_layers(layers: u8) -> Result<usize> {
    if (1..=4).contains(&layers) {
        Ok(layers as usize)
    } else {
        Err(ForgeError::Validation(format!(
            "stego layers must be 1..=4, got {layers}"
        )))
    }
}

/// Password-keyed visiting order over the sample array. Uses `u32` range
/// draws so the order is identical across platforms.
fn sample_order(password: &str, n: usize) -> Vec<usize> {
    let mut hasher = Sha256::new();
    hasher.update(POSITION_KEY_CONTEXT);
    hasher.update(password.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();
    let mut rng = ChaCha20Rng::from_seed(seed);
    let mut order: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=(i as u32)) as usize;
        order.swap(i, j);
    }
    order
}

fn build_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn bit_at(bytes: &[u8], idx: usize) -> u8 {
    (bytes[idx / 8] >> (7 - idx % 8)) & 1
}

impl StegoCodec for LsbCodec {
    fn embed(&self, payload: &[u8], carrier: &[u8], password: &str, layers: u8) -> Result<Vec<u8>> {
        let layers = validate_layers(layers)?;
        let mut grid = PixelGrid::decode(carrier)?;
        let n = grid.samples.len();

        let frame = build_frame(payload);
        let frame_bits = frame.len() * 8;
        if frame_bits > n * layers {
            return Err(ForgeError::Validation(format!(
                "payload of {} bytes exceeds carrier capacity of {} bytes",
                payload.len(),
                n * layers / 8,
            )));
        }

        let order = sample_order(password, n);
        let mut bit = 0;
        'outer: for &pos in &order {
            for layer in 0..layers {
                if bit >= frame_bits {
                    break 'outer;
                }
                let mask = 1u8 << layer;
                if bit_at(&frame, bit) == 1 {
                    grid.samples[pos] |= mask;
                } else {
                    grid.samples[pos] &= !mask;
                }
                bit += 1;
            }
        }
        grid.encode_png()
    }

    fn extract(&self, image: &[u8], password: &str, layers: u8) -> Result<Vec<u8>> {
        let layers = validate_layers(layers)?;
        let grid = PixelGrid::decode(image)?;
        let n = grid.samples.len();
        let capacity_bits = n * layers;
        if capacity_bits < 64 {
            return Err(ForgeError::Validation("carrier too small to hold a frame".into()));
        }

        let order = sample_order(password, n);
        let read_bits = |count: usize, start: usize| -> Vec<u8> {
            let mut out = vec![0u8; count.div_ceil(8)];
            for k in 0..count {
                let bit_idx = start + k;
                let pos = order[bit_idx / layers];
                let layer = bit_idx % layers;
                let bit = (grid.samples[pos] >> layer) & 1;
                out[k / 8] |= bit << (7 - k % 8);
            }
            out
        };

        let header = read_bits(64, 0);
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc_stored = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if 64 + len * 8 > capacity_bits {
            return Err(ForgeError::Validation(
                "embedded length exceeds carrier capacity (wrong password?)".into(),
            ));
        }

        let payload = read_bits(len * 8, 64);
        let payload = payload[..len].to_vec();
        if crc32fast::hash(&payload) != crc_stored {
            return Err(ForgeError::Validation(
                "embedded frame failed CRC check (wrong password or corrupted image)".into(),
            ));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::PixelFormat;

    fn carrier(width: u32, height: u32) -> Vec<u8> {
        let samples: Vec<u8> = (0..width * height * 3).map(|i| (i * 13 % 256) as u8).collect();
        PixelGrid { width, height, format: PixelFormat::Rgb8, samples }
            .encode_png()
            .unwrap()
    }

    #[test]
    fn embed_extract_roundtrip() {
        let codec = LsbCodec;
        let cover = carrier(64, 64);
        let payload: Vec<u8> = (0..500).map(|i| (i % 256) as u8).collect();
        let stego = codec.embed(&payload, &cover, "pw", DEFAULT_LAYERS).unwrap();
        let out = codec.extract(&stego, "pw", DEFAULT_LAYERS).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn wrong_password_fails() {
        let codec = LsbCodec;
        let stego = codec.embed(b"secret", &carrier(64, 64), "right", 2).unwrap();
        assert!(codec.extract(&stego, "wrong", 2).is_err());
    }

    #[test]
    fn wrong_layer_count_fails() {
        let codec = LsbCodec;
        let stego = codec.embed(b"secret", &carrier(64, 64), "pw", 2).unwrap();
        assert!(codec.extract(&stego, "pw", 1).is_err());
    }

    #[test]
    fn capacity_enforced() {
        let codec = LsbCodec;
        let too_big = vec![0u8; 64 * 64 * 3]; // way past 2-layer capacity
        assert!(matches!(
            codec.embed(&too_big, &carrier(64, 64), "pw", 2),
            Err(ForgeError::Validation(_))
        ));
    }

    #[test]
    fn empty_payload_roundtrip() {
        let codec = LsbCodec;
        let stego = codec.embed(b"", &carrier(16, 16), "pw", 1).unwrap();
        assert_eq!(codec.extract(&stego, "pw", 1).unwrap(), b"");
    }

    #[test]
    fn layers_out_of_range_rejected() {
        let codec = LsbCodec;
        assert!(codec.embed(b"x", &carrier(16, 16), "pw", 0).is_err());
        assert!(codec.embed(b"x", &carrier(16, 16), "pw", 5).is_err());
    }

    #[test]
    fn order_is_password_dependent() {
        let a = sample_order("alpha", 64);
        let b = sample_order("beta", 64);
        assert_ne!(a, b);
        assert_eq!(a, sample_order("alpha", 64));
    }
}
