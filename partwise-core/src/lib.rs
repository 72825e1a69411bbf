//! Core data models and types for partwise

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;

/// Result type alias for partwise operations
pub type Result<T> = std::result::Result<T, UploadError>;
