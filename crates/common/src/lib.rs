//! Shared data model for the document processing pipeline.
//!
//! These types describe the documents, jobs, and versioned results that
//! flow between the Job Runner, the Store Gateway, and the extraction/OCR
//! pipeline. They mirror the JSON shape persisted to the relational store
//! (see `docflow-storage`) so a `Document`/`Job`/`OcrVersion` round-trips
//! through storage without a separate wire schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors shared across the pipeline that don't belong to one specific
/// crate's concerns (malformed data model invariants, mostly).
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("confidence {0} out of range [0,1]")]
    ConfidenceOutOfRange(f32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for common-crate operations.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Semantic role assigned to a [`Block`] by the Block Classifier.
///
/// Closed set per the data model: no role outside this enum may be
/// produced by a classifier or engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRole {
    Title,
    SectionHeader,
    Header,
    Paragraph,
    Equation,
    Table,
    Figure,
    Caption,
    List,
    Code,
    Citation,
    Footnote,
    PageNumber,
    Other,
    Unknown,
}

/// Axis-aligned bounding box in pixel units of the rendered page,
/// `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Position of this box normalised to `[0,1]` fractions of the page,
    /// as consumed by the Block Classifier (spec §4.5).
    #[must_use]
    pub fn normalised(&self, page_width: f32, page_height: f32) -> NormalisedPosition {
        NormalisedPosition {
            y_start: self.y / page_height,
            y_end: (self.y + self.height) / page_height,
            x_center: (self.x + self.width / 2.0) / page_width,
            width_ratio: self.width / page_width,
        }
    }
}

/// A block's position expressed as fractions of the page's dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalisedPosition {
    pub y_start: f32,
    pub y_end: f32,
    pub x_center: f32,
    pub width_ratio: f32,
}

/// A semantically-classified region of text on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub role: BlockRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,

    /// Reserved for a future formula-recognition phase; always `None` in
    /// this implementation's own output, accepted on read for forward
    /// compatibility with records a later pipeline version might write.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latex: Option<String>,
    /// Reserved for a future table-structure-recognition phase.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cells: Option<Vec<Vec<String>>>,
}

impl Block {
    #[must_use]
    pub fn new(role: BlockRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            confidence: None,
            bbox: None,
            latex: None,
            cells: None,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: Option<f32>) -> Self {
        self.confidence = confidence;
        self
    }

    #[must_use]
    pub fn with_bbox(mut self, bbox: Option<BBox>) -> Self {
        self.bbox = bbox;
        self
    }

    /// Whether this block's role belongs to the core-content filter used
    /// to build reading-order `doc_text` (spec §4.5).
    #[must_use]
    pub fn is_core_content(&self) -> bool {
        matches!(
            self.role,
            BlockRole::Title | BlockRole::SectionHeader | BlockRole::Paragraph | BlockRole::List
        )
    }
}

/// A single 1-indexed page of a [`OcrVersion`] result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub blocks: Vec<Block>,
    pub text: String,
    pub raw_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// The method that produced a [`Metrics`]/[`OcrVersion`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Direct,
    Paddle,
    Tesseract,
    Hybrid,
}

/// Aggregate statistics about one extraction/OCR pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_pages: u32,
    pub method: Method,
    pub char_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_conf: Option<f32>,
    pub runtime_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi_initial: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi_rerun: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub bad_pages: Vec<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fallback_pages: Vec<u32>,
}

/// The immutable, versioned result of one extraction or OCR pass over a
/// document. Written once to `documents.ocr_versions[<version_key>]` and
/// never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrVersion {
    pub created_at: DateTime<Utc>,
    pub engine: String,
    pub engine_version: String,
    pub pipeline_version: String,
    pub pages: Vec<Page>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_text: Option<String>,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,

    /// Legacy aliases kept for read-compatibility with records written
    /// before `engine`/`engine_version` were split out; never populated
    /// by this implementation's writers.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_version: Option<String>,
}

impl OcrVersion {
    /// Deterministic storage key: `<engine>_<engine_version>_<pipeline_version>_<epoch_millis>`.
    #[must_use]
    pub fn version_key(&self, epoch_millis: i64) -> String {
        format!(
            "{}_{}_{}_{}",
            self.engine, self.engine_version, self.pipeline_version, epoch_millis
        )
    }
}

/// A document awaiting or having undergone extraction/OCR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub storage_key: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub ocr_versions: HashMap<String, OcrVersion>,
    pub page_count: Option<u32>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal and in-flight statuses a [`Document`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    PendingOcr,
    OcrFailed,
    Error,
}

/// Kind of work a [`Job`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Extraction,
    Ocr,
}

/// A [`Job`]'s lifecycle state (spec §3 invariants: `pending -> processing
/// -> {completed, failed}`, with a recoverable failure re-entering
/// `pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// The overloaded `result` field of the original source is split here
/// into an explicit tagged union (resolved Open Question, see
/// SPEC_FULL.md §9): `Options` carries OCR request parameters, `Result`
/// carries the completed result once the job finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobPayload {
    Options {
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Result(Box<OcrVersion>),
}

/// A unit of processing work against one [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub document_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub payload: Option<JobPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The language requested for an OCR job, defaulting to `"en"` per
    /// spec §4.1's OCR handler ("read language from the job's options
    /// blob (default `en`)").
    #[must_use]
    pub fn requested_language(&self) -> String {
        match &self.payload {
            Some(JobPayload::Options { language: Some(l) }) => l.clone(),
            _ => "en".to_string(),
        }
    }

    /// `true` iff incrementing `attempts` by one would reach
    /// `max_attempts`, i.e. a subsequent failure is final (spec §4.9
    /// Fail).
    #[must_use]
    pub fn next_failure_is_final(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }
}
