use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InkfolioError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into InkfolioError automatically

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Logger error: {0}")]
    LoggerError(#[from] flexi_logger::FlexiLoggerError),

    /// The catalog file is missing or is not a JSON array of records.
    #[error("Catalog '{}' is unreadable: {reason}", path.display())]
    CatalogUnreadable { path: PathBuf, reason: String },

    /// A rename target already exists. Renames completed before this one stand.
    #[error("Destination already exists: {}", path.display())]
    DestinationConflict { path: PathBuf },

    /// An indexed asset vanished between the scan and the move. Logged, never fatal.
    #[error("Source file is missing: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("Record {index} is malformed: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Generated id '{id}' was produced more than once")]
    IdCollision { id: String },

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}

impl InkfolioError {
    /// Exit status for the process. Catalog problems keep the historical status of 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            InkfolioError::CatalogUnreadable { .. } => 2,
            _ => 1,
        }
    }
}
