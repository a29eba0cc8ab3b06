//! Job Runner (spec §4.1): polls the Store Gateway for eligible jobs,
//! dispatches each to the Direct Extractor or the OCR Router, and
//! records the outcome. This crate is the only one in the workspace that
//! reads the process environment or installs a `tracing` subscriber —
//! everything it calls is a library.

pub mod config;
pub mod handlers;
pub mod runner;

pub use config::{Config, ConfigError};
pub use runner::Worker;

/// Errors surfaced at the process-entrypoint level, composing the
/// per-crate errors of the components this binary wires together.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] docflow_storage::StorageError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
