//! In-memory [`MetadataStorage`] fake for tests that exercise the
//! claim/complete/fail protocol's semantics (spec §4.9, §8) without a
//! live Postgres connection (SPEC_FULL.md §4 "Test tooling").

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Claimed, MetadataStorage, StorageError, StorageResult};
use docflow_common::{Document, DocumentStatus, Job, JobPayload, JobStatus, JobType};

/// A single-process, mutex-guarded stand-in for [`PostgresMetadataStorage`](crate::PostgresMetadataStorage).
/// Claims are serialised by the lock rather than by SQL's row-level
/// locking, but the externally-observable protocol is identical: once a
/// job leaves `pending`, no further `claim_job` call can return it.
pub struct FakeMetadataStorage {
    jobs: Mutex<HashMap<String, Job>>,
    documents: Mutex<HashMap<String, Document>>,
}

impl FakeMetadataStorage {
    #[must_use]
    pub fn new(jobs: Vec<Job>, documents: Vec<Document>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().map(|j| (j.id.clone(), j)).collect()),
            documents: Mutex::new(documents.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }
}

#[async_trait::async_trait]
impl MetadataStorage for FakeMetadataStorage {
    async fn init_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn claim_job(&self, worker_id: &str, job_types: &[JobType]) -> StorageResult<Option<Claimed>> {
        let mut jobs = self.jobs.lock().unwrap();

        let candidate_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.attempts < j.max_attempts && job_types.contains(&j.job_type))
            .min_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)))
            .map(|j| j.id.clone());

        let Some(id) = candidate_id else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).unwrap();
        job.status = JobStatus::Processing;
        job.locked_by = Some(worker_id.to_string());
        let job = job.clone();

        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .get_mut(&job.document_id)
            .ok_or_else(|| StorageError::NotFound(job.document_id.clone()))?;
        document.status = DocumentStatus::Processing;

        Ok(Some(Claimed {
            job,
            document: document.clone(),
        }))
    }

    async fn complete_job(&self, job: &Job, result: JobPayload, final_status: DocumentStatus) -> StorageResult<()> {
        let JobPayload::Result(version) = result else {
            return Err(StorageError::InvalidConfig("complete_job requires a Result payload".to_string()));
        };

        let mut jobs = self.jobs.lock().unwrap();
        let stored = jobs.get_mut(&job.id).ok_or_else(|| StorageError::NotFound(job.id.clone()))?;
        stored.status = JobStatus::Completed;

        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .get_mut(&job.document_id)
            .ok_or_else(|| StorageError::NotFound(job.document_id.clone()))?;
        document.status = final_status;
        document.page_count = Some(version.pages.len() as u32);
        let epoch_millis = version.created_at.timestamp_millis();
        document.ocr_versions.insert(version.version_key(epoch_millis), *version);

        Ok(())
    }

    async fn fail_job(&self, job: &Job, error_message: &str) -> StorageResult<()> {
        let is_final = job.next_failure_is_final();
        let new_attempts = job.attempts + 1;

        let mut jobs = self.jobs.lock().unwrap();
        let stored = jobs.get_mut(&job.id).ok_or_else(|| StorageError::NotFound(job.id.clone()))?;
        stored.attempts = new_attempts;
        stored.last_error = Some(error_message.to_string());
        stored.status = if is_final { JobStatus::Failed } else { JobStatus::Pending };
        stored.locked_by = None;

        if is_final {
            let mut documents = self.documents.lock().unwrap();
            let document = documents
                .get_mut(&job.document_id)
                .ok_or_else(|| StorageError::NotFound(job.document_id.clone()))?;
            document.status = DocumentStatus::Error;
            document.error_message = Some(format!("Processing failed after {new_attempts} attempts: {error_message}"));
        }

        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> StorageResult<Document> {
        self.documents
            .lock()
            .unwrap()
            .get(document_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(document_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docflow_common::{Metrics, Method, OcrVersion};

    fn sample_job(max_attempts: u32) -> Job {
        Job {
            id: "job-1".to_string(),
            document_id: "doc-1".to_string(),
            job_type: JobType::Extraction,
            status: JobStatus::Pending,
            priority: 0,
            attempts: 0,
            max_attempts,
            locked_at: None,
            locked_by: None,
            last_error: None,
            payload: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn sample_document() -> Document {
        Document {
            id: "doc-1".to_string(),
            storage_key: "docs/doc-1.pdf".to_string(),
            status: DocumentStatus::Pending,
            ocr_versions: HashMap::new(),
            page_count: None,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    fn sample_version() -> OcrVersion {
        OcrVersion {
            created_at: Utc::now(),
            engine: "pdfium".to_string(),
            engine_version: "1.0".to_string(),
            pipeline_version: "1.0.0".to_string(),
            pages: vec![],
            doc_text: Some(String::new()),
            metrics: Metrics {
                total_pages: 0,
                method: Method::Direct,
                char_count: 0,
                avg_conf: None,
                runtime_ms: 0,
                dpi_initial: None,
                dpi_rerun: None,
                bad_pages: vec![],
                fallback_pages: vec![],
            },
            warnings: vec![],
            model_name: None,
            model_version: None,
        }
    }

    #[tokio::test]
    async fn claimed_job_cannot_be_claimed_again() {
        let store = FakeMetadataStorage::new(vec![sample_job(3)], vec![sample_document()]);
        let first = store.claim_job("worker-a", &[JobType::Extraction]).await.unwrap();
        assert!(first.is_some());

        let second = store.claim_job("worker-b", &[JobType::Extraction]).await.unwrap();
        assert!(second.is_none(), "a job already claimed must not be handed to a second worker");
    }

    #[tokio::test]
    async fn claim_job_filters_by_job_type() {
        let store = FakeMetadataStorage::new(vec![sample_job(3)], vec![sample_document()]);
        let claimed = store.claim_job("worker-a", &[JobType::Ocr]).await.unwrap();
        assert!(claimed.is_none(), "an extraction job must not be claimed for an OCR-only request");
    }

    #[tokio::test]
    async fn two_failures_then_success_matches_spec_scenario_six() {
        let store = FakeMetadataStorage::new(vec![sample_job(3)], vec![sample_document()]);

        let claimed = store.claim_job("worker-a", &[JobType::Extraction]).await.unwrap().unwrap();
        store.fail_job(&claimed.job, "transient error").await.unwrap();
        let job = store.jobs.lock().unwrap().get("job-1").unwrap().clone();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.status, JobStatus::Pending);

        let claimed = store.claim_job("worker-a", &[JobType::Extraction]).await.unwrap().unwrap();
        store.fail_job(&claimed.job, "transient error").await.unwrap();
        let job = store.jobs.lock().unwrap().get("job-1").unwrap().clone();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.status, JobStatus::Pending);

        let claimed = store.claim_job("worker-a", &[JobType::Extraction]).await.unwrap().unwrap();
        store
            .complete_job(&claimed.job, JobPayload::Result(Box::new(sample_version())), DocumentStatus::Ready)
            .await
            .unwrap();
        let job = store.jobs.lock().unwrap().get("job-1").unwrap().clone();
        assert_eq!(job.status, JobStatus::Completed);

        let document = store.get_document("doc-1").await.unwrap();
        assert_eq!(document.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn final_failure_marks_document_error_with_formatted_message() {
        let store = FakeMetadataStorage::new(vec![sample_job(1)], vec![sample_document()]);
        let claimed = store.claim_job("worker-a", &[JobType::Extraction]).await.unwrap().unwrap();
        assert!(claimed.job.next_failure_is_final());

        store.fail_job(&claimed.job, "disk full").await.unwrap();

        let job = store.jobs.lock().unwrap().get("job-1").unwrap().clone();
        assert_eq!(job.status, JobStatus::Failed);

        let document = store.get_document("doc-1").await.unwrap();
        assert_eq!(document.status, DocumentStatus::Error);
        assert_eq!(document.error_message.as_deref(), Some("Processing failed after 1 attempts: disk full"));
    }
}
