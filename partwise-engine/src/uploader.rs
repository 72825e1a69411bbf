//! Upload orchestration: initiate, transfer parts, complete or abort

use bytes::Bytes;
use partwise_core::*;
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::reader::PartReader;
use crate::retry::with_retry;
use crate::session::MultipartUpload;
use crate::store::ObjectStore;

/// Drives the multipart protocol for whole byte streams.
///
/// Parts are read and uploaded strictly one after another: a part's read
/// finishes before its upload starts, and its eTag is recorded before the
/// next read begins.
pub struct Uploader<S> {
    store: S,
    config: UploadConfig,
}

impl<S: ObjectStore> Uploader<S> {
    /// Create an orchestrator, checking the part size against the store
    pub fn new(store: S, config: UploadConfig) -> Result<Self> {
        config.validate()?;

        let min_part_size = store.min_part_size();
        if config.part_size < min_part_size {
            return Err(UploadError::Config(format!(
                "part size {} is below the store minimum of {}",
                config.part_size, min_part_size
            )));
        }

        Ok(Uploader { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `declared_size` bytes from `source` as `key`.
    ///
    /// Bytes past `declared_size` are left unread.
    pub async fn upload<R>(
        &self,
        source: R,
        declared_size: u64,
        key: ObjectKey,
    ) -> Result<ObjectReference>
    where
        R: AsyncRead + Unpin + Send,
    {
        let num_parts = expected_parts(declared_size, self.config.part_size);
        if num_parts > u64::from(MAX_PARTS) {
            return Err(UploadError::TooManyParts {
                parts: num_parts,
                max: MAX_PARTS,
            });
        }

        info!(
            key = %key,
            declared_size,
            part_size = self.config.part_size,
            expected_parts = num_parts,
            "Starting upload"
        );

        let reader = PartReader::sized(source, self.part_size(), declared_size);
        self.run(reader, key).await
    }

    /// Upload everything `source` yields until EOF as `key`
    pub async fn upload_stream<R>(&self, source: R, key: ObjectKey) -> Result<ObjectReference>
    where
        R: AsyncRead + Unpin + Send,
    {
        info!(key = %key, part_size = self.config.part_size, "Starting streamed upload");

        let reader = PartReader::unbounded(source, self.part_size());
        self.run(reader, key).await
    }

    async fn run<R>(&self, mut reader: PartReader<R>, key: ObjectKey) -> Result<ObjectReference>
    where
        R: AsyncRead + Unpin + Send,
    {
        // The first part is read before anything is created remotely, so an
        // empty source never opens a multipart upload.
        let first = reader
            .next_part()
            .await
            .map_err(|source| UploadError::Read {
                key: key.to_string(),
                part_number: PartNumber::first().get(),
                source,
            })?;

        let Some(first) = first else {
            return self.put_empty(key).await;
        };

        let mut upload =
            MultipartUpload::initiate(&self.store, key, self.config.retry.clone()).await?;

        match Self::transfer(&mut upload, &mut reader, first).await {
            Ok(reference) => {
                info!(
                    key = %reference.key,
                    size = reference.size,
                    parts = reference.parts,
                    "Upload finished"
                );
                Ok(reference)
            }
            Err(error) => {
                warn!(key = %upload.key(), error = %error, "Upload failed, aborting");
                // An abort failure is logged by the session; the caller
                // still sees the error that ended the upload.
                let _ = upload.abort().await;
                Err(error)
            }
        }
    }

    async fn transfer<R>(
        upload: &mut MultipartUpload<'_, S>,
        reader: &mut PartReader<R>,
        first: Bytes,
    ) -> Result<ObjectReference>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut next = Some(first);
        while let Some(data) = next.take() {
            upload.upload_part(data).await?;

            let part_number = upload.parts().len() as u32 + 1;
            next = reader
                .next_part()
                .await
                .map_err(|source| UploadError::Read {
                    key: upload.key().to_string(),
                    part_number,
                    source,
                })?;
        }

        upload.complete().await
    }

    /// Zero-byte sources bypass multipart: stores reject a completion with
    /// no parts.
    async fn put_empty(&self, key: ObjectKey) -> Result<ObjectReference> {
        info!(key = %key, "Source is empty, writing object with a single put");

        let store = &self.store;
        let key_ref = &key;
        with_retry(&self.config.retry, "put_object", || {
            store.put_object(key_ref, Bytes::new())
        })
        .await
        .map_err(|source| UploadError::Completion {
            key: key.to_string(),
            source,
        })
    }

    fn part_size(&self) -> usize {
        // validate() guarantees the part size fits in usize
        self.config.part_size as usize
    }
}
