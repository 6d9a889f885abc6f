use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlatstoreError {
    #[error("Invalid dataset name: {0}")]
    InvalidName(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Row not found: {dataset}/{id}")]
    RowNotFound { dataset: String, id: String },

    #[error("Duplicate row id: {dataset}/{id}")]
    DuplicateId { dataset: String, id: String },

    #[error("Filter error: {0}")]
    FilterEvaluation(String),

    #[error("Lock on {path} not acquired within {timeout:?}")]
    LockTimeout { path: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FlatstoreError>;
