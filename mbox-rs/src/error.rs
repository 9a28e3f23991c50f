use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ExportError {
    /// Wrap a store-side failure so it aborts the current export.
    pub fn source_unavailable(detail: impl std::fmt::Display) -> Self {
        ExportError::SourceUnavailable(detail.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
