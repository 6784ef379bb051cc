//! Row store error types

use std::io;

use thiserror::Error;

/// Result type for row store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a row store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// No store with this identifier
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    /// The store exists but has no such sheet
    #[error("The sheet {sheet} was not found in store with ID {store_id}")]
    SheetNotFound { store_id: String, sheet: String },

    /// A row position outside the data rows was addressed
    #[error("Row position {0} is outside the data rows")]
    RowOutOfRange(usize),

    /// Disk I/O failure (file-backed stores)
    #[error("Store I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted workbook could not be encoded or decoded
    #[error("Store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
