//! One in-flight multipart upload and its state machine

use bytes::Bytes;
use partwise_core::*;
use tracing::{debug, error, info, warn};

use crate::retry::with_retry;
use crate::store::ObjectStore;

/// Lifecycle of a multipart upload.
///
/// `Completed`, `Aborted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initiated,
    /// Last part acknowledged by the store
    Uploading(PartNumber),
    Completed,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Initiated => write!(f, "initiated"),
            SessionState::Uploading(part) => write!(f, "uploading(part {})", part),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Aborted => write!(f, "aborted"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Handle over one remote multipart upload.
///
/// Parts are numbered contiguously from 1 in the order they are uploaded.
/// Once the session reaches a terminal state every further call is refused
/// without contacting the store.
pub struct MultipartUpload<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    retry: RetryPolicy,
    key: ObjectKey,
    upload_id: Option<UploadId>,
    parts: Vec<CompletedPart>,
    state: SessionState,
}

impl<'a, S: ObjectStore + ?Sized> MultipartUpload<'a, S> {
    /// Session in the `Created` state; nothing has been sent yet
    pub fn new(store: &'a S, key: ObjectKey, retry: RetryPolicy) -> Self {
        MultipartUpload {
            store,
            retry,
            key,
            upload_id: None,
            parts: Vec::new(),
            state: SessionState::Created,
        }
    }

    /// Create a session and ask the store for an upload id
    pub async fn initiate(store: &'a S, key: ObjectKey, retry: RetryPolicy) -> Result<Self> {
        let mut upload = Self::new(store, key, retry);
        upload.start().await?;
        Ok(upload)
    }

    /// `Created -> Initiated`, or `Created -> Failed`
    pub async fn start(&mut self) -> Result<()> {
        self.ensure(SessionState::Created == self.state, "initiate")?;

        let store = self.store;
        let key = &self.key;
        match with_retry(&self.retry, "initiate_multipart_upload", || {
            store.initiate_multipart_upload(key)
        })
        .await
        {
            Ok(upload_id) => {
                info!(key = %self.key, upload_id = %upload_id, "Multipart upload initiated");
                self.upload_id = Some(upload_id);
                self.state = SessionState::Initiated;
                Ok(())
            }
            Err(source) => {
                self.state = SessionState::Failed;
                Err(UploadError::Initiation {
                    key: self.key.to_string(),
                    source,
                })
            }
        }
    }

    /// Upload the next part and record its eTag.
    ///
    /// A failed part leaves the session open so the caller can abort it.
    pub async fn upload_part(&mut self, data: Bytes) -> Result<&CompletedPart> {
        let upload_id = self.active_upload_id("upload a part to")?;
        let part_number = self.next_part_number()?;
        let size = data.len() as u64;

        let store = self.store;
        let key = &self.key;
        let e_tag = with_retry(&self.retry, "upload_part", || {
            store.upload_part(key, &upload_id, part_number, data.clone())
        })
        .await
        .map_err(|source| UploadError::PartUpload {
            key: self.key.to_string(),
            part_number: part_number.get(),
            source,
        })?;

        debug!(key = %self.key, part = %part_number, size, e_tag = %e_tag, "Part uploaded");
        self.parts.push(CompletedPart {
            part_number,
            e_tag,
            size,
        });
        self.state = SessionState::Uploading(part_number);

        Ok(&self.parts[self.parts.len() - 1])
    }

    /// Ask the store to assemble the uploaded parts.
    ///
    /// On failure the session stays open so the caller can abort it.
    pub async fn complete(&mut self) -> Result<ObjectReference> {
        let upload_id = self.active_upload_id("complete")?;
        if self.parts.is_empty() {
            return Err(UploadError::InvalidState {
                state: self.state.to_string(),
                operation: "complete with no parts",
            });
        }

        let store = self.store;
        let key = &self.key;
        let parts = &self.parts;
        let reference = with_retry(&self.retry, "complete_multipart_upload", || {
            store.complete_multipart_upload(key, &upload_id, parts)
        })
        .await
        .map_err(|source| UploadError::Completion {
            key: self.key.to_string(),
            source,
        })?;

        self.state = SessionState::Completed;
        info!(
            key = %self.key,
            upload_id = %upload_id,
            parts = self.parts.len(),
            size = reference.size,
            "Multipart upload completed"
        );
        Ok(reference)
    }

    /// Release the remote upload. The session ends `Aborted` even when the
    /// store call fails, since nothing more may be sent for it.
    pub async fn abort(&mut self) -> Result<()> {
        let upload_id = self.active_upload_id("abort")?;
        self.state = SessionState::Aborted;

        let store = self.store;
        let key = &self.key;
        match with_retry(&self.retry, "abort_multipart_upload", || {
            store.abort_multipart_upload(key, &upload_id)
        })
        .await
        {
            Ok(()) => {
                warn!(key = %self.key, upload_id = %upload_id, "Multipart upload aborted");
                Ok(())
            }
            Err(source) => {
                error!(
                    key = %self.key,
                    upload_id = %upload_id,
                    error = %source,
                    "Failed to abort multipart upload, incomplete parts may remain in the store"
                );
                Err(UploadError::Abort {
                    key: self.key.to_string(),
                    source,
                })
            }
        }
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn upload_id(&self) -> Option<&UploadId> {
        self.upload_id.as_ref()
    }

    /// Acknowledged parts, ascending by part number
    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn ensure(&self, allowed: bool, operation: &'static str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(UploadError::InvalidState {
                state: self.state.to_string(),
                operation,
            })
        }
    }

    fn active_upload_id(&self, operation: &'static str) -> Result<UploadId> {
        let active = matches!(
            self.state,
            SessionState::Initiated | SessionState::Uploading(_)
        );
        match (&self.upload_id, active) {
            (Some(upload_id), true) => Ok(upload_id.clone()),
            _ => Err(UploadError::InvalidState {
                state: self.state.to_string(),
                operation,
            }),
        }
    }

    fn next_part_number(&self) -> Result<PartNumber> {
        match self.parts.last() {
            None => Ok(PartNumber::first()),
            Some(last) => last.part_number.next().ok_or(UploadError::TooManyParts {
                parts: u64::from(MAX_PARTS) + 1,
                max: MAX_PARTS,
            }),
        }
    }
}
