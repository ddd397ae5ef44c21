// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! The structured payload record carried through the pipeline.
//!
//! The record is UTF-8 JSON wrapping the raw payload as base64 plus
//! identifying metadata. Serialization is canonical: field order is fixed
//! and the metadata map is sorted, so validating and re-serializing a record
//! is byte-stable. The recovery engine depends on that stability — verifying
//! an already-healed payload must report that nothing needed healing.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ForgeError, Result};

/// Structured payload record. `name` and `data` are required; everything
/// else is descriptive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Raw payload bytes, base64-encoded.
    pub data: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PayloadRecord {
    /// Wrap raw payload bytes into a record with size and digest metadata.
    pub fn from_raw(name: &str, kind: Option<&str>, raw: &[u8]) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("size".to_string(), serde_json::json!(raw.len()));
        metadata.insert(
            "sha256".to_string(),
            serde_json::json!(hex::encode(Sha256::digest(raw))),
        );
        Self {
            name: name.to_string(),
            kind: kind.map(str::to_string),
            data: BASE64.encode(raw),
            metadata,
        }
    }

    /// Parse and validate a record from UTF-8 JSON bytes.
    ///
    /// # Errors
    /// [`ForgeError::Parse`] when the bytes are not valid JSON, required
    /// fields are missing or empty, or `data` is not valid base64.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let record: Self = serde_json::from_slice(bytes)
            .map_err(|e| ForgeError::Parse(e.to_string()))?;
        if record.name.is_empty() {
            return Err(ForgeError::Parse("record has an empty name".into()));
        }
        BASE64
            .decode(&record.data)
            .map_err(|e| ForgeError::Parse(format!("data field is not valid base64: {e}")))?;
        Ok(record)
    }

    /// Canonical byte form: parse(canonical_bytes(r)) re-serializes to the
    /// same bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("record serialization cannot fail")
    }

    /// Decode the raw payload bytes.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.data)
            .map_err(|e| ForgeError::Parse(format!("data field is not valid base64: {e}")))
    }
}
