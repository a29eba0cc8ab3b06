//! Store Gateway (spec §4.9 / §6): the bounded set of operations the
//! pipeline consumes against the relational store (jobs/documents) and
//! the object store (PDF bytes).
//!
//! Grounded on `video_audio_extracts/crates/storage/src/lib.rs` for the
//! trait-object/config shape; the media-specific tables and structs
//! (`media_metadata`, `transcription_segments`, `detection_results`,
//! `timeline_entries`, and the Qdrant vector store) have no counterpart
//! in this spec and are replaced outright by the claim/complete/fail
//! protocol below, grounded on
//! `other_examples/.../ocr_queue.rs.rs`'s `dequeue`/`mark_completed`/
//! `mark_failed`.

use docflow_common::{Document, Job};
use thiserror::Error;

pub mod metadata_storage;
pub mod object_storage;

#[cfg(test)]
mod fake;

pub use metadata_storage::{MetadataStorage, PostgresConfig, PostgresMetadataStorage};
pub use object_storage::{ObjectStorage, S3Config, S3ObjectStorage};

/// Store Gateway errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Complete storage configuration for both backends.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub s3: S3Config,
    pub postgres: PostgresConfig,
}

/// The result of a successful claim: the claimed job plus the document
/// it references, matching spec §4.9 step 3 ("mark document processing"
/// happens as part of the same claim call).
#[derive(Debug, Clone, PartialEq)]
pub struct Claimed {
    pub job: Job,
    pub document: Document,
}
