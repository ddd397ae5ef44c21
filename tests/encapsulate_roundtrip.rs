// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! End-to-end encapsulate/extract round trips through the job controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use forge_core::job::phases::{K_ARTIFACT, K_CARRIER, K_PAYLOAD};
use forge_core::job::publish::ChannelPublisher;
use forge_core::job::store::MemoryStore;
use forge_core::job::{JobController, JobKind, JobOptions, JobStatus};
use forge_core::{PixelFormat, PixelGrid};

fn test_carrier() -> Vec<u8> {
    let samples: Vec<u8> = (0..64 * 64 * 3).map(|i| (i * 31 % 251) as u8).collect();
    PixelGrid { width: 64, height: 64, format: PixelFormat::Rgb8, samples }
        .encode_png()
        .unwrap()
}

fn controller() -> JobController {
    JobController::new(Arc::new(MemoryStore::new()), Arc::new(ChannelPublisher::new()))
}

fn options(password: &str) -> JobOptions {
    JobOptions {
        password: password.to_owned(),
        payload_name: "greeting.txt".to_owned(),
        payload_kind: Some("text/plain".to_owned()),
        // keep the KDF cheap in tests, production default is 100k
        kdf_iterations: 1_000,
        compression_level: 3,
        ..Default::default()
    }
}

#[test]
fn encapsulate_then_extract_roundtrip() {
    let controller = controller();
    let payload = b"hello-forge".to_vec();

    let blobs = HashMap::from([
        (K_PAYLOAD.to_owned(), payload.clone()),
        (K_CARRIER.to_owned(), test_carrier()),
    ]);
    let id = controller
        .submit(JobKind::Encapsulation, blobs, options("travel far"))
        .unwrap();
    let sealed = controller.wait_terminal(id, Duration::from_secs(60)).unwrap();
    assert_eq!(sealed.status, JobStatus::Completed, "error: {:?}", sealed.error);
    let artifact = sealed.output.clone().unwrap();
    let sidecar = sealed.seal_metadata.clone().unwrap();
    assert!(sealed.progress.values().all(|&p| p == 100));

    let blobs = HashMap::from([(K_ARTIFACT.to_owned(), artifact)]);
    let mut extract_options = options("travel far");
    extract_options.seal_metadata = Some(sidecar);
    let id = controller
        .submit(JobKind::Extraction, blobs, extract_options)
        .unwrap();
    let extracted = controller.wait_terminal(id, Duration::from_secs(60)).unwrap();
    assert_eq!(extracted.status, JobStatus::Completed, "error: {:?}", extracted.error);
    assert_eq!(extracted.output.unwrap(), payload);
    assert!(extracted.restoration_report.is_some());

    // the unscrambled carrier comes back for inspection; only the two
    // embedding bit layers may differ from the original
    let restored = PixelGrid::decode(&extracted.restored_carrier.unwrap()).unwrap();
    let original = PixelGrid::decode(&test_carrier()).unwrap();
    assert_eq!((restored.width, restored.height), (original.width, original.height));
    assert!(restored
        .samples
        .iter()
        .zip(&original.samples)
        .all(|(r, o)| r >> 2 == o >> 2));
}

#[test]
fn wrong_password_fails_at_unseal() {
    let controller = controller();
    let blobs = HashMap::from([
        (K_PAYLOAD.to_owned(), b"secret".to_vec()),
        (K_CARRIER.to_owned(), test_carrier()),
    ]);
    let id = controller
        .submit(JobKind::Encapsulation, blobs, options("abc"))
        .unwrap();
    let sealed = controller.wait_terminal(id, Duration::from_secs(60)).unwrap();
    assert_eq!(sealed.status, JobStatus::Completed);

    let blobs = HashMap::from([(K_ARTIFACT.to_owned(), sealed.output.unwrap())]);
    let mut extract_options = options("xyz");
    extract_options.seal_metadata = sealed.seal_metadata;
    let id = controller
        .submit(JobKind::Extraction, blobs, extract_options)
        .unwrap();
    let extracted = controller.wait_terminal(id, Duration::from_secs(60)).unwrap();
    assert_eq!(extracted.status, JobStatus::Error);
    let error = extracted.error.unwrap();
    assert!(error.starts_with("unseal:"), "failed in the wrong phase: {error}");
    assert!(error.contains("integrity"), "unexpected error: {error}");
}

#[test]
fn artifact_is_written_to_output_dir() {
    let dir = std::env::temp_dir().join(format!("forge-test-{}", std::process::id()));
    let controller = controller();
    let blobs = HashMap::from([
        (K_PAYLOAD.to_owned(), b"persist me".to_vec()),
        (K_CARRIER.to_owned(), test_carrier()),
    ]);
    let mut opts = options("pw");
    opts.output_dir = Some(dir.clone());
    let id = controller.submit(JobKind::Encapsulation, blobs, opts).unwrap();
    let job = controller.wait_terminal(id, Duration::from_secs(60)).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let path = job.output_path.unwrap();
    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap(), job.output.unwrap());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn identical_submissions_produce_distinct_artifacts() {
    let controller = controller();
    let blobs = HashMap::from([
        (K_PAYLOAD.to_owned(), b"same input".to_vec()),
        (K_CARRIER.to_owned(), test_carrier()),
    ]);
    let a = controller
        .submit(JobKind::Encapsulation, blobs.clone(), options("pw"))
        .unwrap();
    let b = controller
        .submit(JobKind::Encapsulation, blobs, options("pw"))
        .unwrap();
    let job_a = controller.wait_terminal(a, Duration::from_secs(60)).unwrap();
    let job_b = controller.wait_terminal(b, Duration::from_secs(60)).unwrap();
    assert_eq!(job_a.status, JobStatus::Completed);
    assert_eq!(job_b.status, JobStatus::Completed);
    // fresh salt, nonce and permutation key per run
    assert_ne!(job_a.output.unwrap(), job_b.output.unwrap());
    assert_ne!(
        job_a.seal_metadata.unwrap().permutation_key,
        job_b.seal_metadata.unwrap().permutation_key
    );
}
