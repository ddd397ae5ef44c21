// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Job orchestration.
//!
//! [`JobController`] owns every job: it validates inputs, runs each job's
//! phase list on its own thread, and is the only writer of job state.
//! Callers interact through [`JobController::submit`] and snapshot reads;
//! there is no cancellation, and a job that reaches `Completed` or `Error`
//! is frozen. Persistence and status fan-out are injected capabilities,
//! resolved once at construction.

pub mod context;
pub mod phases;
pub mod publish;
pub mod store;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::compress::{Compressor, ZstdCompressor, DEFAULT_ZSTD_LEVEL};
use crate::error::{ForgeError, Result};
use crate::seal::{SealMetadata, DEFAULT_KDF_ITERATIONS};
use crate::stego::{LsbCodec, StegoCodec, DEFAULT_LAYERS};

use context::TransformContext;
use phases::{PhaseId, ENCAPSULATION_PHASES, EXTRACTION_PHASES};
use publish::UpdatePublisher;
use store::PersistentStore;

/// Direction of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Encapsulation,
    Extraction,
}

impl JobKind {
    pub fn phases(self) -> &'static [PhaseId] {
        match self {
            Self::Encapsulation => ENCAPSULATION_PHASES,
            Self::Extraction => EXTRACTION_PHASES,
        }
    }
}

/// Lifecycle states. Transitions only move forward; `Completed` and
/// `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Per-job tuning. The password is held for the worker thread but never
/// serialized into snapshots or the persistent store.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobOptions {
    #[serde(skip)]
    pub password: String,
    pub payload_name: String,
    pub payload_kind: Option<String>,
    pub kdf_iterations: u32,
    pub compression_level: i32,
    /// Parity-to-data share for erasure armor.
    pub parity_ratio: f64,
    pub stego_layers: u8,
    /// Required for extraction; recorded by the sealing job.
    pub seal_metadata: Option<SealMetadata>,
    /// When set, the final artifact is written here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            password: String::new(),
            payload_name: "payload.bin".to_owned(),
            payload_kind: None,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            compression_level: DEFAULT_ZSTD_LEVEL,
            parity_ratio: 0.1,
            stego_layers: DEFAULT_LAYERS,
            seal_metadata: None,
            output_dir: None,
        }
    }
}

/// Size bookkeeping recorded by the compress phase.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct JobMetrics {
    /// Armored record size entering compression, in bytes.
    pub original_size: usize,
    pub compressed_size: usize,
    /// `original_size / compressed_size`; below 1 when the armor parity
    /// dominates a small payload.
    pub compression_ratio: f64,
    /// Carrier embedding capacity in bytes, known once the carrier has
    /// been scrambled and measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_capacity: Option<usize>,
}

/// One pipeline run. Owned exclusively by the controller; external code
/// only ever sees clones.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Index of the last completed phase in the job's phase list.
    pub phase_index: usize,
    /// Phase currently executing, or the last one to run.
    pub phase_id: Option<PhaseId>,
    /// Percent complete per phase name.
    pub progress: BTreeMap<String, u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub options: JobOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<JobMetrics>,
    /// Sidecar produced by the seal phase; required to extract later.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seal_metadata: Option<SealMetadata>,
    /// Recovery diagnostics from the verify phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restoration_report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Result bytes, held in process only.
    #[serde(skip)]
    pub output: Option<Vec<u8>>,
    /// Unscrambled carrier from an extraction, for visual inspection.
    /// Carries residual low-bit noise from the embedding.
    #[serde(skip)]
    pub restored_carrier: Option<Vec<u8>>,
}

impl Job {
    fn new(kind: JobKind, options: JobOptions) -> Self {
        let now = Utc::now();
        let progress = kind
            .phases()
            .iter()
            .map(|p| (p.as_str().to_owned(), 0u8))
            .collect();
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            phase_index: 0,
            phase_id: None,
            progress,
            created_at: now,
            updated_at: now,
            options,
            error: None,
            metrics: None,
            seal_metadata: None,
            restoration_report: None,
            output_path: None,
            output: None,
            restored_carrier: None,
        }
    }
}

/// Codec capabilities injected at construction. Resolved once; never
/// probed per call.
pub struct PipelineBackends {
    pub compressor: Box<dyn Compressor>,
    pub codec: Box<dyn StegoCodec>,
}

impl Default for PipelineBackends {
    fn default() -> Self {
        Self {
            compressor: Box::new(ZstdCompressor),
            codec: Box::new(LsbCodec),
        }
    }
}

/// Owns the job registry and schedules one worker thread per job.
#[derive(Clone)]
pub struct JobController {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    store: Arc<dyn PersistentStore>,
    publisher: Arc<dyn UpdatePublisher>,
    backends: Arc<PipelineBackends>,
}

impl JobController {
    pub fn new(store: Arc<dyn PersistentStore>, publisher: Arc<dyn UpdatePublisher>) -> Self {
        Self::with_backends(store, publisher, PipelineBackends::default())
    }

    pub fn with_backends(
        store: Arc<dyn PersistentStore>,
        publisher: Arc<dyn UpdatePublisher>,
        backends: PipelineBackends,
    ) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            store,
            publisher,
            backends: Arc::new(backends),
        }
    }

    /// Validate inputs, register the job, and schedule it. Returns as
    /// soon as the worker thread is spawned.
    pub fn submit(
        &self,
        kind: JobKind,
        input_blobs: HashMap<String, Vec<u8>>,
        options: JobOptions,
    ) -> Result<Uuid> {
        if options.password.is_empty() {
            return Err(ForgeError::Validation("password must not be empty".into()));
        }
        let non_empty = |key: &str| -> Result<()> {
            match input_blobs.get(key) {
                Some(blob) if !blob.is_empty() => Ok(()),
                _ => Err(ForgeError::Validation(format!(
                    "input blob '{key}' is required and must be non-empty"
                ))),
            }
        };
        match kind {
            JobKind::Encapsulation => {
                non_empty(phases::K_PAYLOAD)?;
                non_empty(phases::K_CARRIER)?;
            }
            JobKind::Extraction => {
                non_empty(phases::K_ARTIFACT)?;
                if options.seal_metadata.is_none() {
                    return Err(ForgeError::Validation(
                        "extraction requires the seal metadata sidecar".into(),
                    ));
                }
            }
        }

        let job = Job::new(kind, options);
        let id = job.id;
        let snapshot = job.clone();
        {
            let mut jobs = lock(&self.jobs);
            jobs.insert(id, job);
        }
        self.persist_and_publish(&snapshot);
        info!(job_id = %id, ?kind, "job submitted");

        let controller = self.clone();
        std::thread::spawn(move || controller.run(id, input_blobs));
        Ok(id)
    }

    /// Snapshot of a job's current state.
    pub fn get_status(&self, id: Uuid) -> Result<Job> {
        let jobs = lock(&self.jobs);
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(id.to_string()))
    }

    /// Poll until the job reaches a terminal state.
    pub fn wait_terminal(&self, id: Uuid, timeout: Duration) -> Result<Job> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.get_status(id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            if Instant::now() >= deadline {
                return Err(ForgeError::Validation(format!(
                    "job {id} still {:?} after {timeout:?}",
                    job.status
                )));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Apply `mutate` under the registry lock, then persist and publish
    /// the resulting snapshot. Terminal jobs are frozen; the mutation is
    /// dropped and `None` returned.
    fn update(&self, id: Uuid, mutate: impl FnOnce(&mut Job)) -> Option<Job> {
        let snapshot = {
            let mut jobs = lock(&self.jobs);
            let job = jobs.get_mut(&id)?;
            if job.status.is_terminal() {
                return None;
            }
            mutate(job);
            job.updated_at = Utc::now();
            job.clone()
        };
        self.persist_and_publish(&snapshot);
        Some(snapshot)
    }

    fn persist_and_publish(&self, job: &Job) {
        match serde_json::to_value(job) {
            Ok(value) => {
                self.store.upsert(&job.id.to_string(), value.clone());
                self.publisher.publish(&job.id.to_string(), value);
            }
            Err(e) => error!(job_id = %job.id, "job snapshot serialization failed: {e}"),
        }
    }

    /// Worker body. Walks the phase list in order; the first stage error
    /// is fatal to the job.
    fn run(&self, id: Uuid, input_blobs: HashMap<String, Vec<u8>>) {
        let Some(job) = self.update(id, |job| job.status = JobStatus::Processing) else {
            return;
        };
        let options = job.options.clone();

        let mut ctx = TransformContext::new();
        for (key, blob) in input_blobs {
            if ctx.put_blob(&key, blob).is_err() {
                self.fail(id, "duplicate input blob".into());
                return;
            }
        }
        if let Some(metadata) = &options.seal_metadata {
            let encoded = match serde_json::to_string(metadata) {
                Ok(s) => s,
                Err(e) => {
                    self.fail(id, format!("seal metadata sidecar is malformed: {e}"));
                    return;
                }
            };
            if let Err(e) = ctx.put_meta(phases::M_SEAL, encoded) {
                self.fail(id, e.to_string());
                return;
            }
        }

        for (index, &phase) in job.kind.phases().iter().enumerate() {
            self.update(id, |job| job.phase_id = Some(phase));
            match phases::run_phase(phase, ctx, &options, self.backends.as_ref()) {
                Ok(next) => {
                    ctx = next;
                    let metrics = (phase == PhaseId::Compress)
                        .then(|| ctx.meta(phases::M_METRICS).ok())
                        .flatten()
                        .and_then(|raw| serde_json::from_str::<JobMetrics>(raw).ok());
                    self.update(id, |job| {
                        job.phase_index = index;
                        job.progress.insert(phase.as_str().to_owned(), 100);
                        if metrics.is_some() {
                            job.metrics = metrics;
                        }
                    });
                }
                Err(e) => {
                    error!(job_id = %id, phase = phase.as_str(), "phase failed: {e}");
                    self.fail(id, format!("{}: {e}", phase.as_str()));
                    return;
                }
            }
        }

        if let Err(e) = self.finalize(id, job.kind, &options, &mut ctx) {
            self.fail(id, format!("finalize: {e}"));
            return;
        }
        info!(job_id = %id, "job completed");
    }

    fn fail(&self, id: Uuid, message: String) {
        self.update(id, |job| {
            job.status = JobStatus::Error;
            job.error = Some(message);
        });
    }

    /// Collect pipeline outputs onto the job record and mark it done.
    fn finalize(
        &self,
        id: Uuid,
        kind: JobKind,
        options: &JobOptions,
        ctx: &mut TransformContext,
    ) -> Result<()> {
        let (output, seal_metadata, report, restored_carrier) = match kind {
            JobKind::Encapsulation => {
                let sealed = ctx.take_blob(phases::K_SEALED)?;
                let metadata: SealMetadata = serde_json::from_str(ctx.meta(phases::M_SEAL)?)
                    .map_err(|e| {
                        ForgeError::Validation(format!("seal metadata sidecar is malformed: {e}"))
                    })?;
                (sealed, Some(metadata), None, None)
            }
            JobKind::Extraction => {
                let payload = ctx.take_blob(phases::K_PAYLOAD)?;
                let report: serde_json::Value = serde_json::from_str(ctx.meta(phases::M_REPORT)?)
                    .map_err(|e| {
                        ForgeError::Validation(format!("restoration report is malformed: {e}"))
                    })?;
                let restored = ctx.take_blob(phases::K_RESTORED)?;
                (payload, None, Some(report), Some(restored))
            }
        };
        let estimated_capacity = seal_metadata
            .as_ref()
            .map(|m| m.element_count * m.stego_layers as usize / 8);

        let output_path = match &options.output_dir {
            Some(dir) => {
                let name = match kind {
                    JobKind::Encapsulation => format!("{id}.png"),
                    JobKind::Extraction => format!("{id}_{}", options.payload_name),
                };
                let path = dir.join(name);
                std::fs::create_dir_all(dir)?;
                std::fs::write(&path, &output)?;
                Some(path)
            }
            None => None,
        };

        self.update(id, |job| {
            job.status = JobStatus::Completed;
            if let Some(metrics) = job.metrics.as_mut() {
                metrics.estimated_capacity = estimated_capacity;
            }
            job.seal_metadata = seal_metadata;
            job.restoration_report = report;
            job.restored_carrier = restored_carrier;
            job.output_path = output_path;
            job.output = Some(output);
        });
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
