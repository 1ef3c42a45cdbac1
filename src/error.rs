//! Error types for Imaris container operations

use thiserror::Error;

/// Main error type for container operations
#[derive(Error, Debug)]
pub enum ImsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("Unsupported Imaris file format version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid Imaris container: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(String),

    #[error("Imaris format does not support non-identity direction cosine matrix")]
    NonIdentityDirection,

    #[error("XML error: {0}")]
    Xml(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Coarse classification of [`ImsError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unrecognized container version.
    Format,
    /// Time, resolution, channel or sub-region index outside valid bounds.
    Range,
    /// New data or settings inconsistent with the container.
    Value,
    /// Pixel type or orientation the format cannot express.
    Type,
    /// Failures of the underlying store, filesystem or worker tasks.
    Storage,
}

impl ImsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImsError::UnsupportedVersion(_) => ErrorKind::Format,
            ImsError::OutOfRange(_) => ErrorKind::Range,
            ImsError::InvalidValue(_) | ImsError::Xml(_) | ImsError::Csv(_) => ErrorKind::Value,
            ImsError::UnsupportedPixelType(_) | ImsError::NonIdentityDirection => ErrorKind::Type,
            ImsError::Io(_)
            | ImsError::Hdf5(_)
            | ImsError::InvalidFormat(_)
            | ImsError::MissingField(_)
            | ImsError::Serialization(_)
            | ImsError::Task(_) => ErrorKind::Storage,
        }
    }
}

/// Specialized Result type for container operations
pub type Result<T> = std::result::Result<T, ImsError>;

impl From<quick_xml::Error> for ImsError {
    fn from(err: quick_xml::Error) -> Self {
        ImsError::Xml(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ImsError {
    fn from(err: tokio::task::JoinError) -> Self {
        ImsError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ImsError::UnsupportedVersion("4.0".into()).kind(),
            ErrorKind::Format
        );
        assert_eq!(ImsError::OutOfRange("t".into()).kind(), ErrorKind::Range);
        assert_eq!(ImsError::InvalidValue("x".into()).kind(), ErrorKind::Value);
        assert_eq!(ImsError::NonIdentityDirection.kind(), ErrorKind::Type);
        assert_eq!(ImsError::MissingField("Name".into()).kind(), ErrorKind::Storage);
    }
}
