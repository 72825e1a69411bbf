//! Core data types for partwise

use serde::{Deserialize, Serialize};

/// Largest part number an object store accepts
pub const MAX_PARTS: u32 = 10_000;

/// Longest object key accepted, in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Object key inside the target bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new key with validation
    pub fn new(key: &str) -> crate::Result<Self> {
        if key.is_empty() {
            return Err(crate::UploadError::InvalidKey("empty key".to_string()));
        }

        if key.len() > MAX_KEY_LEN {
            return Err(crate::UploadError::InvalidKey(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }

        // Basic validation - no control characters
        if key.chars().any(|c| c.is_control()) {
            return Err(crate::UploadError::InvalidKey(
                "control characters not allowed".to_string(),
            ));
        }

        Ok(ObjectKey(key.to_string()))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token issued by the store when a multipart upload starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        UploadId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based part sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartNumber(u32);

impl PartNumber {
    /// Validate a raw part number against `1..=MAX_PARTS`
    pub fn new(n: u32) -> crate::Result<Self> {
        if n == 0 || n > MAX_PARTS {
            return Err(crate::UploadError::InvalidPartNumber(n));
        }
        Ok(PartNumber(n))
    }

    pub fn first() -> Self {
        PartNumber(1)
    }

    /// The following part number, or `None` past `MAX_PARTS`
    pub fn next(self) -> Option<Self> {
        if self.0 >= MAX_PARTS {
            None
        } else {
            Some(PartNumber(self.0 + 1))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PartNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integrity tag returned by the store for a stored part or object.
///
/// Kept exactly as the store returned it, quotes included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    pub fn new(tag: impl Into<String>) -> Self {
        ETag(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A part the store has acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: PartNumber,
    pub e_tag: ETag,
    /// Bytes actually uploaded for this part
    pub size: u64,
}

/// Reference to a durably stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub key: ObjectKey,
    pub e_tag: Option<ETag>,
    pub size: u64,
    /// Number of parts assembled; zero when written with a single put
    pub parts: u32,
    pub version_id: Option<String>,
}

impl ObjectReference {
    /// Check if the object was assembled from a multipart upload
    pub fn is_multipart(&self) -> bool {
        self.parts > 0
    }
}

/// Number of parts needed to carry `declared_size` bytes in `part_size` pieces
pub fn expected_parts(declared_size: u64, part_size: u64) -> u64 {
    if part_size == 0 {
        return 0;
    }
    declared_size.div_ceil(part_size)
}
