use crate::types::DataType;
use thiserror::Error;

/// Error code attached to rows routed to the error stream because no
/// matching row was found in the cache or the table.
pub const ERROR_CODE_NO_LOOKUP: &str = "DBL001";

/// Error code attached to rows routed to the error stream because the row
/// could not be processed (conversion or database failure).
pub const ERROR_CODE_ROW_FAILURE: &str = "DBLOOKUPD001";

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Conversion error: cannot convert {value} from {from} to {to}")]
    Conversion {
        value: String,
        from: DataType,
        to: DataType,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LookupError {
    /// Whether the error belongs to a single row and may be diverted to the
    /// error stream instead of aborting the step.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            LookupError::Conversion { .. } | LookupError::Database(_)
        )
    }

    pub fn conversion(value: impl ToString, from: DataType, to: DataType) -> Self {
        LookupError::Conversion {
            value: value.to_string(),
            from,
            to,
        }
    }
}

pub type Result<T> = std::result::Result<T, LookupError>;
