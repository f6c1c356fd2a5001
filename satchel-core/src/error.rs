//! Upload error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;

/// Classification and persistence errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No destination directory could be resolved for an implicit save.
    #[error("No upload directory configured and no explicit path given")]
    MissingConfig,

    /// No filename is available to compose an implicit destination path.
    #[error("Uploaded file has no filename to build a destination path from")]
    MissingFilename,

    /// Destination exists and overwriting is disabled.
    #[error("Destination already exists: {0}")]
    OverwriteDenied(PathBuf),

    /// The temporary source can no longer be read.
    #[error("Temporary source is not readable: {0}")]
    SourceUnreadable(PathBuf),

    /// Neither the destination nor its parent directory is writable.
    #[error("Destination is not writable: {0}")]
    DestinationUnwritable(PathBuf),

    /// I/O error while streaming bytes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A field pattern failed to compile.
    #[error("Invalid field pattern: {0}")]
    InvalidPattern(String),

    /// A parameter bag could not be built from its source.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// One or more automatic saves failed.
    #[error("Autosave failed for {} file(s)", .0.len())]
    Autosave(Vec<(String, UploadError)>),
}

impl UploadError {
    /// Check if this error comes from a configuration gap.
    pub fn is_missing_config(&self) -> bool {
        matches!(self, Self::MissingConfig | Self::MissingFilename)
    }

    /// Check if this is an overwrite refusal.
    pub fn is_overwrite_denied(&self) -> bool {
        matches!(self, Self::OverwriteDenied(_))
    }

    /// Check if this is a filesystem permission failure.
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            Self::SourceUnreadable(_) | Self::DestinationUnwritable(_)
        )
    }

    /// Failures collected by an autosave pass, empty for other errors.
    pub fn autosave_failures(&self) -> &[(String, UploadError)] {
        match self {
            Self::Autosave(failures) => failures,
            _ => &[],
        }
    }

    /// Convert to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::OverwriteDenied(_) => 409,
            Self::InvalidParams(_) => 400,
            Self::MissingFilename => 422,
            _ => 500,
        }
    }
}

impl From<regex::Error> for UploadError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidPattern(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(UploadError::OverwriteDenied(PathBuf::from("/x")).status_code(), 409);
        assert_eq!(UploadError::MissingFilename.status_code(), 422);
        assert_eq!(UploadError::MissingConfig.status_code(), 500);
    }

    #[test]
    fn test_autosave_failures() {
        let err = UploadError::Autosave(vec![("avatar".to_string(), UploadError::MissingConfig)]);
        assert_eq!(err.autosave_failures().len(), 1);
        assert_eq!(err.to_string(), "Autosave failed for 1 file(s)");
        assert!(UploadError::MissingConfig.autosave_failures().is_empty());
    }
}
