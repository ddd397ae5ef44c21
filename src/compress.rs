// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Lossless payload compression.
//!
//! The [`Compressor`] capability is injected into the job controller at
//! construction; the default backend is Zstandard at level 22, matching the
//! archival profile the pipeline has always shipped with.

use crate::error::{ForgeError, Result};

/// Exactly-invertible compression backend.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Default Zstandard compression level.
pub const DEFAULT_ZSTD_LEVEL: i32 = 22;

/// Zstandard-backed [`Compressor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        zstd::stream::encode_all(data, level)
            .map_err(|e| ForgeError::Validation(format!("zstd compression failed: {e}")))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::decode_all(data)
            .map_err(|e| ForgeError::Validation(format!("zstd decompression failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_exact() {
        let compressor = ZstdCompressor;
        let data: Vec<u8> = (0..10_000).map(|i| (i % 97) as u8).collect();
        let packed = compressor.compress(&data, DEFAULT_ZSTD_LEVEL).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(compressor.decompress(&packed).unwrap(), data);
    }

    #[test]
    fn empty_input_roundtrip() {
        let compressor = ZstdCompressor;
        let packed = compressor.compress(&[], 3).unwrap();
        assert!(compressor.decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn garbage_decompress_fails() {
        let compressor = ZstdCompressor;
        assert!(compressor.decompress(b"not a zstd frame").is_err());
    }
}
