// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Per-job data carried between pipeline stages.

use std::collections::BTreeMap;

use crate::error::{ForgeError, Result};

/// Accumulating map of named byte blobs and scalar metadata.
///
/// Each stage reads the keys it needs and writes new ones. Keys are
/// write-once: a stage never overwrites something another stage produced,
/// and an attempt to do so is a bug surfaced as a validation error. The
/// context lives for exactly one job execution.
#[derive(Debug, Default, Clone)]
pub struct TransformContext {
    blobs: BTreeMap<String, Vec<u8>>,
    meta: BTreeMap<String, String>,
}

impl TransformContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_blob(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.blobs.contains_key(key) {
            return Err(ForgeError::Validation(format!(
                "context blob '{key}' written twice"
            )));
        }
        self.blobs.insert(key.to_owned(), value);
        Ok(())
    }

    pub fn blob(&self, key: &str) -> Result<&[u8]> {
        self.blobs
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| ForgeError::Validation(format!("context blob '{key}' missing")))
    }

    pub fn take_blob(&mut self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .remove(key)
            .ok_or_else(|| ForgeError::Validation(format!("context blob '{key}' missing")))
    }

    pub fn put_meta(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        if self.meta.contains_key(key) {
            return Err(ForgeError::Validation(format!(
                "context meta '{key}' written twice"
            )));
        }
        self.meta.insert(key.to_owned(), value.into());
        Ok(())
    }

    pub fn meta(&self, key: &str) -> Result<&str> {
        self.meta
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ForgeError::Validation(format!("context meta '{key}' missing")))
    }

    pub fn has_blob(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let mut ctx = TransformContext::new();
        ctx.put_blob("payload", vec![1, 2, 3]).unwrap();
        assert_eq!(ctx.blob("payload").unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn double_write_rejected() {
        let mut ctx = TransformContext::new();
        ctx.put_blob("payload", vec![1]).unwrap();
        assert!(ctx.put_blob("payload", vec![2]).is_err());
        ctx.put_meta("key", "a").unwrap();
        assert!(ctx.put_meta("key", "b").is_err());
    }

    #[test]
    fn missing_key_is_an_error() {
        let ctx = TransformContext::new();
        assert!(ctx.blob("absent").is_err());
        assert!(ctx.meta("absent").is_err());
    }
}
