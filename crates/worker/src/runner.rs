//! Job Runner (spec §4.1): the poll/claim/download/dispatch loop.
//! Grounded on `original_source/worker/src/main.py`'s `main()` for the
//! control flow and on `other_examples/.../ocr_queue.rs.rs`'s
//! single-job-per-process claim/fail shape, adapted to `tokio::select!`
//! against `ctrl_c()` instead of a synchronous `KeyboardInterrupt`
//! (SPEC_FULL.md §4.1 ambient addition).

use std::sync::Arc;
use std::time::Duration;

use docflow_common::{Job, JobType};
use docflow_storage::{Claimed, MetadataStorage, ObjectStorage};

use crate::config::Config;
use crate::handlers;

/// Claims and runs jobs until interrupted. Holds the storage backends as
/// trait objects (resolved Open Question "Global mutable state",
/// SPEC_FULL.md §9) rather than reaching for a process-global client.
pub struct Worker {
    metadata: Arc<dyn MetadataStorage>,
    objects: Arc<dyn ObjectStorage>,
    config: Config,
}

impl Worker {
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataStorage>, objects: Arc<dyn ObjectStorage>, config: Config) -> Self {
        Self {
            metadata,
            objects,
            config,
        }
    }

    /// Run until `ctrl_c()` resolves. Returns the number of jobs
    /// processed (for the shutdown banner), always running any in-flight
    /// job to completion before exiting (spec §5).
    pub async fn run(&self) -> u64 {
        let mut processed = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(jobs_processed = processed, "received interrupt, shutting down");
                    return processed;
                }

                claim = self.metadata.claim_job(&self.config.worker_id, &[JobType::Extraction, JobType::Ocr]) => {
                    match claim {
                        Ok(Some(claimed)) => {
                            processed += 1;
                            tracing::info!(
                                job_id = %claimed.job.id,
                                document_id = %claimed.job.document_id,
                                job_type = ?claimed.job.job_type,
                                n = processed,
                                "claimed job"
                            );
                            self.process(claimed).await;
                        }
                        Ok(None) => {
                            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "claim failed, backing off");
                            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                        }
                    }
                }
            }
        }
    }

    async fn process(&self, claimed: Claimed) {
        let Claimed { job, document } = claimed;

        let pdf_bytes = match self.objects.retrieve_file(&document.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(&job, &format!("Failed to download PDF: {e}")).await;
                return;
            }
        };

        let outcome = match job.job_type {
            JobType::Extraction => handlers::handle_extraction(&self.config, &pdf_bytes),
            JobType::Ocr => handlers::handle_ocr(&self.config, &job, &pdf_bytes),
        };

        match outcome {
            Ok((version, status)) => self.complete(&job, version, status).await,
            Err(message) => self.fail(&job, &format!("Processing failed: {message}")).await,
        }
    }

    async fn complete(&self, job: &Job, version: docflow_common::OcrVersion, status: docflow_common::DocumentStatus) {
        let payload = docflow_common::JobPayload::Result(Box::new(version));
        if let Err(e) = self.metadata.complete_job(job, payload, status).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to persist job result, marking job failed");
            self.fail(job, &format!("Failed to persist result: {e}")).await;
        } else {
            tracing::info!(job_id = %job.id, status = ?status, "job completed");
        }
    }

    async fn fail(&self, job: &Job, message: &str) {
        tracing::warn!(job_id = %job.id, error = message, "job failed");
        if let Err(e) = self.metadata.fail_job(job, message).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to record job failure");
        }
    }
}
