//! Multipart upload engine: part splitting, session lifecycle and stores

pub mod memory;
pub mod reader;
pub mod retry;
pub mod s3;
pub mod session;
pub mod store;
pub mod uploader;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use memory::{Fault, MemoryStore, StoreCall, StoreOp, StoredObject};
pub use reader::PartReader;
pub use s3::{S3Config, S3Store};
pub use session::{MultipartUpload, SessionState};
pub use store::{ObjectStore, S3_MIN_PART_SIZE};
pub use uploader::Uploader;

#[cfg(test)]
mod tests {
    use super::*;
    use partwise_core::*;
    use std::sync::Arc;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_session_walks_its_states() {
        let store = MemoryStore::with_min_part_size(4).recording();
        let mut upload = MultipartUpload::new(&store, key("states"), RetryPolicy::none());
        assert_eq!(upload.state(), SessionState::Created);

        upload.start().await.unwrap();
        assert_eq!(upload.state(), SessionState::Initiated);
        assert!(upload.upload_id().is_some());

        upload.upload_part(bytes::Bytes::from_static(b"abcd")).await.unwrap();
        upload.upload_part(bytes::Bytes::from_static(b"ef")).await.unwrap();
        assert_eq!(
            upload.state(),
            SessionState::Uploading(PartNumber::new(2).unwrap())
        );

        let reference = upload.complete().await.unwrap();
        assert_eq!(upload.state(), SessionState::Completed);
        assert_eq!(reference.size, 6);
        assert_eq!(reference.parts, 2);
    }

    #[tokio::test]
    async fn test_terminal_session_refuses_calls() {
        let store = MemoryStore::with_min_part_size(4).recording();
        let mut upload = MultipartUpload::initiate(&store, key("done"), RetryPolicy::none())
            .await
            .unwrap();
        upload.upload_part(bytes::Bytes::from_static(b"abcd")).await.unwrap();
        upload.complete().await.unwrap();

        let calls_before = store.calls().len();
        let err = upload.complete().await.unwrap_err();
        assert_eq!(err.kind(), UploadErrorKind::InvalidState);
        assert!(upload.abort().await.is_err());
        assert!(upload
            .upload_part(bytes::Bytes::from_static(b"more"))
            .await
            .is_err());
        assert_eq!(store.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_complete_without_parts_is_refused() {
        let store = MemoryStore::new().recording();
        let mut upload = MultipartUpload::initiate(&store, key("empty"), RetryPolicy::none())
            .await
            .unwrap();

        let err = upload.complete().await.unwrap_err();
        assert_eq!(err.kind(), UploadErrorKind::InvalidState);
        assert_eq!(store.count(StoreOp::Complete), 0);

        upload.abort().await.unwrap();
        assert_eq!(upload.state(), SessionState::Aborted);
    }

    #[tokio::test]
    async fn test_failed_abort_still_ends_session() {
        let store = MemoryStore::new().recording();
        store.inject(Fault::permanent(StoreOp::Abort));
        let mut upload = MultipartUpload::initiate(&store, key("stuck"), RetryPolicy::none())
            .await
            .unwrap();

        let err = upload.abort().await.unwrap_err();
        assert_eq!(err.kind(), UploadErrorKind::Abort);
        assert_eq!(upload.state(), SessionState::Aborted);
        assert_eq!(store.pending_uploads(), 1);
    }

    #[tokio::test]
    async fn test_uploader_over_shared_store() {
        let store = Arc::new(MemoryStore::with_min_part_size(8).recording());
        let uploader = Uploader::new(store.clone(), UploadConfig::with_part_size(8)).unwrap();

        let data = vec![3u8; 20];
        let reference = uploader
            .upload_stream(&data[..], key("shared"))
            .await
            .unwrap();

        assert_eq!(reference.parts, 3);
        assert_eq!(store.object(&key("shared")).unwrap().data.len(), 20);
    }
}
