// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Error types for the transform pipeline.
//!
//! [`ForgeError`] covers all failure modes from input validation through
//! sealing and recovery. Stage-local errors are fatal to the owning job;
//! only the recovery pipeline converts a failure into a fallback stage.

use core::fmt;

use crate::ecc::RsDecodeError;

/// Errors that can occur during encapsulation or extraction.
#[derive(Debug)]
pub enum ForgeError {
    /// Malformed or missing input. Never retried.
    Validation(String),
    /// The carrier or artifact could not be decoded as a pixel grid.
    ImageDecode(String),
    /// Decoded element count does not match the count recorded when the
    /// permutation key was generated. Never silently truncated or padded.
    PermutationSizeMismatch {
        expected: usize,
        actual: usize,
    },
    /// AEAD tag verification failed. No plaintext is ever returned.
    Integrity,
    /// Reed-Solomon decoding could not correct the received symbols.
    RsDecode(RsDecodeError),
    /// The payload record failed to parse after all recovery stages.
    Parse(String),
    /// Filesystem failure while reading inputs or writing artifacts.
    Io(std::io::Error),
    /// No job with the given id is known to the controller.
    NotFound(String),
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation failed: {msg}"),
            Self::ImageDecode(msg) => write!(f, "image decode failed: {msg}"),
            Self::PermutationSizeMismatch { expected, actual } => write!(
                f,
                "permutation size mismatch: expected {expected} elements, carrier has {actual}"
            ),
            Self::Integrity => write!(f, "integrity check failed (wrong password or tampered data)"),
            Self::RsDecode(e) => write!(f, "erasure healing failed: {e}"),
            Self::Parse(msg) => write!(f, "payload parse failed: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::NotFound(id) => write!(f, "job {id} not found"),
        }
    }
}

impl std::error::Error for ForgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RsDecode(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RsDecodeError> for ForgeError {
    fn from(e: RsDecodeError) -> Self {
        Self::RsDecode(e)
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ForgeError>;
