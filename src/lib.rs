// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! # forge-core
//!
//! Reversible secure transform pipeline for hiding arbitrary payloads in
//! carrier images. A payload travels through two mirrored pipelines:
//!
//! - **Encapsulation**: wrap the payload in a self-describing record, armor
//!   it with Reed-Solomon parity, compress, scramble the carrier's pixels
//!   under a per-run permutation key, embed the blob steganographically,
//!   and seal the result with PBKDF2-derived AES-256-GCM.
//! - **Extraction**: the exact inverse, ending in a verify step that can
//!   heal bit corruption from parity and fall back to heuristic pixel
//!   repair before giving up.
//!
//! Jobs run concurrently, one thread each, orchestrated by
//! [`job::JobController`]; every cryptographic parameter needed to invert
//! an artifact travels out of band in a [`seal::SealMetadata`] sidecar,
//! never inside the artifact pixels.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use forge_core::job::{JobController, JobKind, JobOptions};
//! use forge_core::job::{publish::ChannelPublisher, store::MemoryStore};
//!
//! let controller = JobController::new(Arc::new(MemoryStore::new()), Arc::new(ChannelPublisher::new()));
//! let blobs = HashMap::from([
//!     ("payload".to_owned(), b"secret".to_vec()),
//!     ("carrier".to_owned(), std::fs::read("photo.png").unwrap()),
//! ]);
//! let options = JobOptions { password: "passphrase".into(), ..Default::default() };
//! let id = controller.submit(JobKind::Encapsulation, blobs, options).unwrap();
//! ```

pub mod carrier;
pub mod compress;
pub mod ecc;
pub mod error;
pub mod job;
pub mod payload;
pub mod repair;
pub mod restore;
pub mod scramble;
pub mod seal;
pub mod stego;

pub use carrier::{normalize_to_png, PixelFormat, PixelGrid};
pub use compress::{Compressor, ZstdCompressor, DEFAULT_ZSTD_LEVEL};
pub use ecc::{heal, protect, HealStats, RsDecodeError};
pub use error::{ForgeError, Result};
pub use job::{Job, JobController, JobKind, JobOptions, JobStatus, PipelineBackends};
pub use payload::PayloadRecord;
pub use repair::{repair_image, RepairOutcome};
pub use restore::{verify_and_restore, Restoration, RestorationReport, DEFAULT_PARITY_RATIO};
pub use scramble::ScrambleOutcome;
pub use seal::{seal, unseal, CryptoEnvelope, SealMetadata, SealSecret, DEFAULT_KDF_ITERATIONS};
pub use stego::{LsbCodec, StegoCodec, DEFAULT_LAYERS};
