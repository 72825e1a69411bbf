//! Error types for partwise

use thiserror::Error;

/// Failure reported by an object store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network faults, timeouts and server-side (5xx) failures
    #[error("Transient store error: {0}")]
    Transient(String),

    /// The store refused the request (auth, validation, part too small, ...)
    #[error("Store rejected request: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The store answered but left out a field the protocol requires
    #[error("Invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Returns true if repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Terminal failure of an upload request
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to initiate multipart upload for {key}: {source}")]
    Initiation {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to read part {part_number} of {key}: {source}")]
    Read {
        key: String,
        part_number: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload part {part_number} of {key}: {source}")]
    PartUpload {
        key: String,
        part_number: u32,
        #[source]
        source: StoreError,
    },

    #[error("Failed to complete upload of {key}: {source}")]
    Completion {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to abort upload of {key}: {source}")]
    Abort {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Cannot {operation} an upload in state {state}")]
    InvalidState {
        state: String,
        operation: &'static str,
    },

    #[error("Upload needs {parts} parts, the store allows at most {max}")]
    TooManyParts { parts: u64, max: u32 },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid part number: {0}")]
    InvalidPartNumber(u32),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Classification surfaced to callers alongside the underlying cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    Initiation,
    Read,
    PartUpload,
    Completion,
    Abort,
    InvalidState,
    InvalidInput,
}

impl UploadError {
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::Initiation { .. } => UploadErrorKind::Initiation,
            UploadError::Read { .. } => UploadErrorKind::Read,
            UploadError::PartUpload { .. } => UploadErrorKind::PartUpload,
            UploadError::Completion { .. } => UploadErrorKind::Completion,
            UploadError::Abort { .. } => UploadErrorKind::Abort,
            UploadError::InvalidState { .. } => UploadErrorKind::InvalidState,
            UploadError::TooManyParts { .. }
            | UploadError::InvalidKey(_)
            | UploadError::InvalidPartNumber(_)
            | UploadError::Config(_) => UploadErrorKind::InvalidInput,
        }
    }

    /// The store failure behind this error, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            UploadError::Initiation { source, .. }
            | UploadError::PartUpload { source, .. }
            | UploadError::Completion { source, .. }
            | UploadError::Abort { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for store backend calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;
