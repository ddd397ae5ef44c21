// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Authenticated sealing of the embedded artifact.
//!
//! Password-based sealing derives a 32-byte key via PBKDF2-HMAC-SHA256 with
//! a fresh random salt; raw-key sealing uses the caller's key padded or
//! truncated to 32 bytes (callers on this path must supply an already-strong
//! key). Encryption is AES-256-GCM with a fresh 12-byte nonce per call and a
//! detached 128-bit tag. Tag verification fails closed: tampered data never
//! yields plaintext.
//!
//! The envelope's non-secret fields travel out of band with the artifact as
//! [`SealMetadata`] (hex-encoded, JSON), together with the permutation key
//! and the other parameters extraction needs.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{ForgeError, Result};

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// PBKDF2 salt length in bytes.
pub const SALT_LEN: usize = 16;
/// AEAD authentication tag length in bytes.
pub const TAG_LEN: usize = 16;
/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// Default PBKDF2 iteration count. Explicit configuration, not a hidden
/// constant: callers can raise it per job.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Secret material for seal/unseal.
pub enum SealSecret<'a> {
    /// Password stretched through PBKDF2-HMAC-SHA256.
    Password(&'a str),
    /// Pre-derived key, padded with `b'0'` or truncated to 32 bytes.
    RawKey(&'a [u8]),
}

/// Everything required to unseal, minus the secret.
#[derive(Debug, Clone)]
pub struct CryptoEnvelope {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub salt: [u8; SALT_LEN],
    pub kdf_iterations: u32,
    pub password_based: bool,
}

fn derive_key(secret: &SealSecret<'_>, salt: &[u8; SALT_LEN], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    match secret {
        SealSecret::Password(password) => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *key);
        }
        SealSecret::RawKey(raw) => {
            let take = raw.len().min(KEY_LEN);
            key[..take].copy_from_slice(&raw[..take]);
            for slot in key[take..].iter_mut() {
                *slot = b'0';
            }
        }
    }
    key
}

/// Seal plaintext under the given secret.
///
/// Salt and nonce are freshly randomized on every call; sealing the same
/// plaintext twice never produces the same ciphertext.
pub fn seal(plaintext: &[u8], secret: &SealSecret<'_>, kdf_iterations: u32) -> CryptoEnvelope {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let key = derive_key(secret, &salt, kdf_iterations);
    let cipher = Aes256Gcm::new_from_slice(&*key).expect("32-byte key");
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload::from(plaintext))
        .expect("AES-GCM encryption is infallible for in-memory buffers");

    // aes-gcm appends the tag; detach it so the envelope carries it
    // explicitly.
    let tag_start = sealed.len() - TAG_LEN;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);

    CryptoEnvelope {
        ciphertext: sealed,
        nonce,
        tag,
        salt,
        kdf_iterations,
        password_based: matches!(secret, SealSecret::Password(_)),
    }
}

/// Unseal an envelope. Decrypts and verifies the tag in one operation.
///
/// # Errors
/// [`ForgeError::Integrity`] on any tag mismatch — wrong secret or tampered
/// ciphertext. No unverified plaintext is ever returned.
pub fn unseal(envelope: &CryptoEnvelope, secret: &SealSecret<'_>) -> Result<Vec<u8>> {
    let key = derive_key(secret, &envelope.salt, envelope.kdf_iterations);
    let cipher = Aes256Gcm::new_from_slice(&*key).expect("32-byte key");

    let mut joined = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
    joined.extend_from_slice(&envelope.ciphertext);
    joined.extend_from_slice(&envelope.tag);

    cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), joined.as_slice())
        .map_err(|_| ForgeError::Integrity)
}

/// Out-of-band sidecar recorded on the job after sealing and required to
/// extract. Hex fields mirror the envelope; the rest are the pipeline
/// parameters the reverse phases need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealMetadata {
    pub nonce: String,
    pub tag: String,
    pub salt: String,
    pub kdf_iterations: u32,
    pub password_based: bool,
    pub ciphertext_len: usize,
    pub permutation_key: String,
    pub element_count: usize,
    pub parity_ratio: f64,
    pub stego_layers: u8,
}

impl SealMetadata {
    /// Build the sidecar from a sealed envelope plus pipeline parameters.
    pub fn new(
        envelope: &CryptoEnvelope,
        permutation_key: String,
        element_count: usize,
        parity_ratio: f64,
        stego_layers: u8,
    ) -> Self {
        Self {
            nonce: hex::encode(envelope.nonce),
            tag: hex::encode(envelope.tag),
            salt: hex::encode(envelope.salt),
            kdf_iterations: envelope.kdf_iterations,
            password_based: envelope.password_based,
            ciphertext_len: envelope.ciphertext.len(),
            permutation_key,
            element_count,
            parity_ratio,
            stego_layers,
        }
    }

    /// Reassemble the envelope around recovered ciphertext bytes.
    ///
    /// # Errors
    /// [`ForgeError::Validation`] when hex fields are malformed or the
    /// ciphertext length disagrees with the sidecar.
    pub fn envelope_with(&self, ciphertext: Vec<u8>) -> Result<CryptoEnvelope> {
        if ciphertext.len() != self.ciphertext_len {
            return Err(ForgeError::Validation(format!(
                "ciphertext length {} does not match sidecar ({})",
                ciphertext.len(),
                self.ciphertext_len
            )));
        }
        Ok(CryptoEnvelope {
            ciphertext,
            nonce: decode_fixed(&self.nonce, "nonce")?,
            tag: decode_fixed(&self.tag, "tag")?,
            salt: decode_fixed(&self.salt, "salt")?,
            kdf_iterations: self.kdf_iterations,
            password_based: self.password_based,
        })
    }
}

fn decode_fixed<const N: usize>(field: &str, name: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(field)
        .map_err(|_| ForgeError::Validation(format!("{name} is not valid hex")))?;
    bytes
        .try_into()
        .map_err(|_| ForgeError::Validation(format!("{name} has the wrong length")))
}
