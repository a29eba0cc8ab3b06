//! Relational half of the Store Gateway: `documents` and `document_jobs`
//! tables, plus the claim/complete/fail protocol (spec §4.9).
//!
//! The claim query's shape — `SELECT ... FOR UPDATE SKIP LOCKED` isn't
//! available since this client issues bare statements outside an
//! explicit transaction handle, so the protocol instead follows the
//! conditional-`UPDATE ... WHERE status = 'pending'` pattern from
//! `original_source/worker/src/db.py`'s `claim_job`: a `SELECT` to find a
//! candidate, then an `UPDATE` guarded by the same predicate, checking
//! rows-affected to detect a lost race — the same two-step shape
//! `other_examples/.../ocr_queue.rs.rs`'s `dequeue` uses around its own
//! transaction.

use crate::{Claimed, StorageError, StorageResult};
use docflow_common::{Document, DocumentStatus, Job, JobPayload, JobStatus, JobType};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls, Row};

/// `PostgreSQL` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "docflow".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// The relational operations the pipeline consumes against jobs and
/// documents (spec §4.9).
#[async_trait::async_trait]
pub trait MetadataStorage: Send + Sync {
    /// Create `documents`/`document_jobs` tables if they don't exist.
    async fn init_schema(&self) -> StorageResult<()>;

    /// Claim the oldest eligible pending job of one of `job_types`,
    /// ordered by priority descending then creation time ascending
    /// (spec §4.9 Claim). Returns `None` when no job is eligible, or
    /// when the candidate was claimed by a racing worker between the
    /// select and the guarded update.
    async fn claim_job(&self, worker_id: &str, job_types: &[JobType]) -> StorageResult<Option<Claimed>>;

    /// Record a completed job: stores `result` under the document's
    /// `ocr_versions` map at its version key, advances the document's
    /// status to `final_status`, and marks the job `completed`.
    async fn complete_job(
        &self,
        job: &Job,
        result: JobPayload,
        final_status: DocumentStatus,
    ) -> StorageResult<()>;

    /// Record a failed attempt. Escalates the job to `failed` and the
    /// document to `error` when this was the final allowed attempt;
    /// otherwise returns the job to `pending` for a later retry.
    async fn fail_job(&self, job: &Job, error_message: &str) -> StorageResult<()>;

    async fn get_document(&self, document_id: &str) -> StorageResult<Document>;
}

pub struct PostgresMetadataStorage {
    client: Client,
}

impl PostgresMetadataStorage {
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {e}");
            }
        });

        Ok(Self { client })
    }

    async fn load_job(&self, job_id: &str) -> StorageResult<Job> {
        let row = self
            .client
            .query_one(
                r"
                SELECT id, document_id, job_type, status, priority, attempts,
                       max_attempts, locked_at, locked_by, last_error, payload,
                       created_at, updated_at, started_at, completed_at
                FROM document_jobs
                WHERE id = $1
                ",
                &[&job_id],
            )
            .await
            .map_err(|e| pg_error(job_id, &e))?;
        row_to_job(&row)
    }
}

#[async_trait::async_trait]
impl MetadataStorage for PostgresMetadataStorage {
    async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS documents (
                    id TEXT PRIMARY KEY,
                    storage_key TEXT NOT NULL,
                    status TEXT NOT NULL,
                    ocr_versions JSONB NOT NULL DEFAULT '{}',
                    page_count INTEGER,
                    error_message TEXT,
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS document_jobs (
                    id TEXT PRIMARY KEY,
                    document_id TEXT NOT NULL REFERENCES documents(id),
                    job_type TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    priority INTEGER NOT NULL DEFAULT 0,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    max_attempts INTEGER NOT NULL DEFAULT 3,
                    locked_at TIMESTAMP WITH TIME ZONE,
                    locked_by TEXT,
                    last_error TEXT,
                    payload JSONB,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    started_at TIMESTAMP WITH TIME ZONE,
                    completed_at TIMESTAMP WITH TIME ZONE
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_document_jobs_claim \
                 ON document_jobs(status, priority DESC, created_at ASC)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("PostgreSQL schema initialized");
        Ok(())
    }

    async fn claim_job(&self, worker_id: &str, job_types: &[JobType]) -> StorageResult<Option<Claimed>> {
        let type_strings: Vec<String> = job_types.iter().map(|t| job_type_to_str(*t).to_string()).collect();

        let candidate = self
            .client
            .query_opt(
                r"
                SELECT id FROM document_jobs
                WHERE status = 'pending'
                  AND attempts < max_attempts
                  AND job_type = ANY($1)
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                ",
                &[&type_strings],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        let Some(row) = candidate else {
            return Ok(None);
        };
        let job_id: String = row.get(0);

        let affected = self
            .client
            .execute(
                r"
                UPDATE document_jobs
                SET status = 'processing',
                    locked_by = $1,
                    locked_at = NOW(),
                    started_at = NOW(),
                    updated_at = NOW()
                WHERE id = $2 AND status = 'pending'
                ",
                &[&worker_id, &job_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        if affected != 1 {
            // Lost the race to another worker between the select and
            // the guarded update (spec §4.9 "exactly one winner").
            return Ok(None);
        }

        let job = self.load_job(&job_id).await?;

        self.client
            .execute(
                "UPDATE documents SET status = 'processing', updated_at = NOW() WHERE id = $1",
                &[&job.document_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        let document = self.get_document(&job.document_id).await?;
        Ok(Some(Claimed { job, document }))
    }

    async fn complete_job(
        &self,
        job: &Job,
        result: JobPayload,
        final_status: DocumentStatus,
    ) -> StorageResult<()> {
        let JobPayload::Result(version) = result else {
            return Err(StorageError::InvalidConfig(
                "complete_job requires a Result payload".to_string(),
            ));
        };
        let epoch_millis = version.created_at.timestamp_millis();
        let version_key = version.version_key(epoch_millis);
        let version_json = serde_json::to_value(&*version)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.client
            .execute(
                r"
                UPDATE documents
                SET ocr_versions = ocr_versions || jsonb_build_object($1::text, $2::jsonb),
                    page_count = $3,
                    status = $4,
                    updated_at = NOW()
                WHERE id = $5
                ",
                &[
                    &version_key,
                    &version_json,
                    &(version.pages.len() as i32),
                    &document_status_to_str(final_status),
                    &job.document_id,
                ],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                r"
                UPDATE document_jobs
                SET status = 'completed', completed_at = NOW(), updated_at = NOW()
                WHERE id = $1
                ",
                &[&job.id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(())
    }

    async fn fail_job(&self, job: &Job, error_message: &str) -> StorageResult<()> {
        let is_final = job.next_failure_is_final();
        let new_attempts = (job.attempts + 1) as i32;

        let next_status = if is_final { "failed" } else { "pending" };
        self.client
            .execute(
                r"
                UPDATE document_jobs
                SET status = $1, attempts = $2, last_error = $3,
                    locked_by = NULL, locked_at = NULL, updated_at = NOW()
                WHERE id = $4
                ",
                &[&next_status, &new_attempts, &error_message, &job.id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        if is_final {
            let doc_message =
                format!("Processing failed after {new_attempts} attempts: {error_message}");
            self.client
                .execute(
                    r"
                    UPDATE documents
                    SET status = 'error', error_message = $1, updated_at = NOW()
                    WHERE id = $2
                    ",
                    &[&doc_message, &job.document_id],
                )
                .await
                .map_err(|e| StorageError::PostgresError(e.to_string()))?;
        }

        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> StorageResult<Document> {
        let row = self
            .client
            .query_one(
                r"
                SELECT id, storage_key, status, ocr_versions, page_count, error_message, updated_at
                FROM documents
                WHERE id = $1
                ",
                &[&document_id],
            )
            .await
            .map_err(|e| pg_error(document_id, &e))?;

        let ocr_versions_json: serde_json::Value = row.get(3);
        let ocr_versions = serde_json::from_value(ocr_versions_json)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        Ok(Document {
            id: row.get(0),
            storage_key: row.get(1),
            status: str_to_document_status(row.get(2)),
            ocr_versions,
            page_count: row.get::<_, Option<i32>>(4).map(|p| p as u32),
            error_message: row.get(5),
            updated_at: row.get(6),
        })
    }
}

fn pg_error(key: &str, e: &tokio_postgres::Error) -> StorageError {
    if e.to_string().contains("no rows") {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::PostgresError(e.to_string())
    }
}

fn job_type_to_str(t: JobType) -> &'static str {
    match t {
        JobType::Extraction => "extraction",
        JobType::Ocr => "ocr",
    }
}

fn str_to_job_type(s: &str) -> JobType {
    match s {
        "ocr" => JobType::Ocr,
        _ => JobType::Extraction,
    }
}

fn job_status_to_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn str_to_job_status(s: &str) -> JobStatus {
    match s {
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn document_status_to_str(s: DocumentStatus) -> &'static str {
    match s {
        DocumentStatus::Pending => "pending",
        DocumentStatus::Processing => "processing",
        DocumentStatus::Ready => "ready",
        DocumentStatus::PendingOcr => "pending_ocr",
        DocumentStatus::OcrFailed => "ocr_failed",
        DocumentStatus::Error => "error",
    }
}

fn str_to_document_status(s: &str) -> DocumentStatus {
    match s {
        "processing" => DocumentStatus::Processing,
        "ready" => DocumentStatus::Ready,
        "pending_ocr" => DocumentStatus::PendingOcr,
        "ocr_failed" => DocumentStatus::OcrFailed,
        "error" => DocumentStatus::Error,
        _ => DocumentStatus::Pending,
    }
}

fn row_to_job(row: &Row) -> StorageResult<Job> {
    let payload_json: Option<serde_json::Value> = row.get(10);
    let payload = payload_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;

    Ok(Job {
        id: row.get(0),
        document_id: row.get(1),
        job_type: str_to_job_type(row.get(2)),
        status: str_to_job_status(row.get(3)),
        priority: row.get(4),
        attempts: row.get::<_, i32>(5) as u32,
        max_attempts: row.get::<_, i32>(6) as u32,
        locked_at: row.get(7),
        locked_by: row.get(8),
        last_error: row.get(9),
        payload,
        created_at: row.get(11),
        updated_at: row.get(12),
        started_at: row.get(13),
        completed_at: row.get(14),
    })
}
