// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Pipeline phase identifiers and stage dispatch.
//!
//! Each stage is a pure function from one [`TransformContext`] to the
//! next. Stages read the keys their predecessors wrote and add their own;
//! the controller orders them and treats any stage error as fatal to the
//! job.

use tracing::debug;

use crate::carrier;
use crate::ecc;
use crate::error::{ForgeError, Result};
use crate::payload::PayloadRecord;
use crate::restore::{self, Restoration};
use crate::scramble;
use crate::seal::{self, SealMetadata, SealSecret};

use super::context::TransformContext;
use super::{JobMetrics, JobOptions, PipelineBackends};

/// Context blob keys, in the order the forward pipeline produces them.
pub const K_PAYLOAD: &str = "payload";
pub const K_CARRIER: &str = "carrier";
pub const K_PREPARED: &str = "prepared_carrier";
pub const K_ARMORED: &str = "record_armored";
pub const K_COMPRESSED: &str = "compressed_blob";
pub const K_SCRAMBLED: &str = "scrambled_carrier";
pub const K_EMBEDDED: &str = "embedded_image";
pub const K_SEALED: &str = "sealed_image";
pub const K_ARTIFACT: &str = "artifact";
pub const K_RESTORED: &str = "restored_carrier";

/// Context metadata keys.
pub const M_SEAL: &str = "seal_metadata";
pub const M_REPORT: &str = "restoration_report";
pub const M_METRICS: &str = "compression_metrics";

/// One step of a pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    Prepare,
    Convert,
    Compress,
    Scramble,
    StegoEmbed,
    Seal,
    Unseal,
    StegoExtract,
    Unscramble,
    Decompress,
    VerifyAndHeal,
}

impl PhaseId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Convert => "convert",
            Self::Compress => "compress",
            Self::Scramble => "scramble",
            Self::StegoEmbed => "stego_embed",
            Self::Seal => "seal",
            Self::Unseal => "unseal",
            Self::StegoExtract => "stego_extract",
            Self::Unscramble => "unscramble",
            Self::Decompress => "decompress",
            Self::VerifyAndHeal => "verify_and_heal",
        }
    }
}

/// Forward pipeline: payload plus carrier in, sealed artifact out.
pub const ENCAPSULATION_PHASES: &[PhaseId] = &[
    PhaseId::Prepare,
    PhaseId::Convert,
    PhaseId::Compress,
    PhaseId::Scramble,
    PhaseId::StegoEmbed,
    PhaseId::Seal,
];

/// Reverse pipeline: sealed artifact plus sidecar in, payload out.
pub const EXTRACTION_PHASES: &[PhaseId] = &[
    PhaseId::Unseal,
    PhaseId::StegoExtract,
    PhaseId::Unscramble,
    PhaseId::Decompress,
    PhaseId::VerifyAndHeal,
];

fn sidecar(ctx: &TransformContext) -> Result<SealMetadata> {
    serde_json::from_str(ctx.meta(M_SEAL)?)
        .map_err(|e| ForgeError::Validation(format!("seal metadata sidecar is malformed: {e}")))
}

/// Execute one phase against the accumulated context.
pub fn run_phase(
    phase: PhaseId,
    mut ctx: TransformContext,
    options: &JobOptions,
    backends: &PipelineBackends,
) -> Result<TransformContext> {
    debug!(phase = phase.as_str(), "running phase");
    match phase {
        PhaseId::Prepare => {
            let prepared = carrier::normalize_to_png(ctx.blob(K_CARRIER)?)?;
            ctx.put_blob(K_PREPARED, prepared)?;
        }
        PhaseId::Convert => {
            let record = PayloadRecord::from_raw(
                &options.payload_name,
                options.payload_kind.as_deref(),
                ctx.blob(K_PAYLOAD)?,
            );
            let armored = ecc::protect(&record.canonical_bytes(), options.parity_ratio);
            ctx.put_blob(K_ARMORED, armored)?;
        }
        PhaseId::Compress => {
            let original_size = ctx.blob(K_ARMORED)?.len();
            let compressed = backends
                .compressor
                .compress(ctx.blob(K_ARMORED)?, options.compression_level)?;
            let metrics = JobMetrics {
                original_size,
                compressed_size: compressed.len(),
                compression_ratio: original_size as f64 / compressed.len().max(1) as f64,
                estimated_capacity: None,
            };
            ctx.put_meta(
                M_METRICS,
                serde_json::to_string(&metrics).map_err(|e| {
                    ForgeError::Validation(format!("compression metrics serialization failed: {e}"))
                })?,
            )?;
            ctx.put_blob(K_COMPRESSED, compressed)?;
        }
        PhaseId::Scramble => {
            let outcome = scramble::forward(ctx.blob(K_COMPRESSED)?, ctx.blob(K_PREPARED)?)?;
            ctx.put_blob(K_SCRAMBLED, outcome.scrambled_carrier)?;
            ctx.put_meta("permutation_key", outcome.permutation_key)?;
            ctx.put_meta("element_count", outcome.element_count.to_string())?;
        }
        PhaseId::StegoEmbed => {
            let embedded = backends.codec.embed(
                ctx.blob(K_COMPRESSED)?,
                ctx.blob(K_SCRAMBLED)?,
                &options.password,
                options.stego_layers,
            )?;
            ctx.put_blob(K_EMBEDDED, embedded)?;
        }
        PhaseId::Seal => {
            let secret = SealSecret::Password(&options.password);
            let envelope = seal::seal(ctx.blob(K_EMBEDDED)?, &secret, options.kdf_iterations);
            let metadata = SealMetadata::new(
                &envelope,
                ctx.meta("permutation_key")?.to_owned(),
                ctx.meta("element_count")?
                    .parse()
                    .map_err(|_| ForgeError::Validation("element_count is not a number".into()))?,
                options.parity_ratio,
                options.stego_layers,
            );
            let sealed = carrier::pack_bytes_as_png(&envelope.ciphertext)?;
            ctx.put_blob(K_SEALED, sealed)?;
            ctx.put_meta(
                M_SEAL,
                serde_json::to_string(&metadata).map_err(|e| {
                    ForgeError::Validation(format!("seal metadata serialization failed: {e}"))
                })?,
            )?;
        }
        PhaseId::Unseal => {
            let metadata = sidecar(&ctx)?;
            let ciphertext =
                carrier::unpack_bytes_from_png(ctx.blob(K_ARTIFACT)?, metadata.ciphertext_len)?;
            let envelope = metadata.envelope_with(ciphertext)?;
            let secret = SealSecret::Password(&options.password);
            let embedded = seal::unseal(&envelope, &secret)?;
            ctx.put_blob(K_EMBEDDED, embedded)?;
        }
        PhaseId::StegoExtract => {
            let metadata = sidecar(&ctx)?;
            let blob = backends.codec.extract(
                ctx.blob(K_EMBEDDED)?,
                &options.password,
                metadata.stego_layers,
            )?;
            ctx.put_blob(K_COMPRESSED, blob)?;
        }
        PhaseId::Unscramble => {
            let metadata = sidecar(&ctx)?;
            let restored = scramble::inverse(
                ctx.blob(K_EMBEDDED)?,
                &metadata.permutation_key,
                metadata.element_count,
            )?;
            ctx.put_blob(K_RESTORED, restored)?;
        }
        PhaseId::Decompress => {
            let armored = backends.compressor.decompress(ctx.blob(K_COMPRESSED)?)?;
            ctx.put_blob(K_ARMORED, armored)?;
        }
        PhaseId::VerifyAndHeal => {
            let metadata = sidecar(&ctx)?;
            let report =
                restore::verify_and_restore(ctx.blob(K_ARMORED)?, Some(metadata.parity_ratio));
            if report.restoration == Restoration::Failed {
                let detail = report.error.as_deref().unwrap_or("unknown recovery failure");
                return Err(ForgeError::Parse(detail.to_owned()));
            }
            let healed = report
                .healed_payload
                .clone()
                .ok_or_else(|| ForgeError::Parse("recovery produced no payload".into()))?;
            let record = PayloadRecord::parse(&healed)?;
            ctx.put_blob(K_PAYLOAD, record.payload_bytes()?)?;
            ctx.put_meta(
                M_REPORT,
                serde_json::to_string(&report).map_err(|e| {
                    ForgeError::Validation(format!("restoration report serialization failed: {e}"))
                })?,
            )?;
        }
    }
    Ok(ctx)
}
