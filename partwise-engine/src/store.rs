//! Object store collaborator interface

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use partwise_core::*;

/// Smallest non-final part S3-compatible stores accept (5 MiB)
pub const S3_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// The multipart-upload capability an orchestrator drives.
///
/// Implementations namespace in-flight state by upload id, so one store can
/// serve many concurrent sessions.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Smallest size the store accepts for any part but the last
    fn min_part_size(&self) -> u64 {
        S3_MIN_PART_SIZE
    }

    async fn initiate_multipart_upload(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<UploadId>;

    async fn upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        part_number: PartNumber,
        data: Bytes,
    ) -> StoreResult<ETag>;

    /// Assemble the object from `parts`, which are ordered by part number
    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectReference>;

    async fn abort_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
    ) -> StoreResult<()>;

    /// Single-request write, used for objects with no bytes
    async fn put_object(
        &self,
        key: &ObjectKey,
        data: Bytes,
    ) -> StoreResult<ObjectReference>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn min_part_size(&self) -> u64 {
        (**self).min_part_size()
    }

    async fn initiate_multipart_upload(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<UploadId> {
        (**self).initiate_multipart_upload(key).await
    }

    async fn upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        part_number: PartNumber,
        data: Bytes,
    ) -> StoreResult<ETag> {
        (**self).upload_part(key, upload_id, part_number, data).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectReference> {
        (**self).complete_multipart_upload(key, upload_id, parts).await
    }

    async fn abort_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
    ) -> StoreResult<()> {
        (**self).abort_multipart_upload(key, upload_id).await
    }

    async fn put_object(
        &self,
        key: &ObjectKey,
        data: Bytes,
    ) -> StoreResult<ObjectReference> {
        (**self).put_object(key, data).await
    }
}
