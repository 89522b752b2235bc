//! Error types for rust_genesetdb

use thiserror::Error;

/// Main error type for gene-set database operations
#[derive(Error, Debug)]
pub enum GeneSetError {
    #[error("Cannot construct GeneSetDb: {reason}")]
    Construction { reason: String },

    #[error("Schema violation: {reason}")]
    Schema { reason: String },

    #[error("Gene set not found: collection '{collection}', name '{name}'")]
    SetNotFound { collection: String, name: String },

    #[error("Collection not found: '{collection}'")]
    CollectionNotFound { collection: String },

    #[error("Malformed gene set key '{key}' (separator '{sep}')")]
    MalformedKey { key: String, sep: String },

    #[error("Cannot align result to gene sets: {reason}")]
    ResultAlignment { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Unknown enrichment method '{name}'")]
    UnknownMethod { name: String },

    #[error("Enrichment method '{method}' failed: {reason}")]
    MethodFailed { method: String, reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for gene-set database operations
pub type Result<T> = std::result::Result<T, GeneSetError>;
