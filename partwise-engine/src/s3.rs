//! S3-compatible object store backed by the AWS SDK

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use partwise_core::*;
use tracing::{debug, info};

use crate::store::ObjectStore;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...); `None` uses AWS
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// `endpoint/bucket/key` addressing instead of `bucket.endpoint/key`
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        S3Config {
            bucket: String::new(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

impl S3Config {
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(UploadError::Config("S3 bucket name is required".into()));
        }
        if self.region.is_empty() {
            return Err(UploadError::Config("S3 region is required".into()));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(UploadError::Config(
                "access key id and secret access key must be given together".into(),
            ));
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(UploadError::Config(format!(
                    "S3 endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Build a client. Static credentials are used when given, otherwise the
    /// default provider chain (environment, profile, instance role).
    pub async fn new(config: S3Config) -> Result<Self> {
        config.validate()?;

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style)
            // Retries happen in `with_retry`, bounded by `RetryPolicy`
            .retry_config(RetryConfig::disabled());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            builder = builder.credentials_provider(credentials);
        } else {
            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            if let Some(provider) = sdk_config.credentials_provider() {
                builder = builder.credentials_provider(provider);
            }
        }

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "S3 store configured"
        );

        Ok(S3Store {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn initiate_multipart_upload(&self, key: &ObjectKey) -> StoreResult<UploadId> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| classify("CreateMultipartUpload", e))?;

        let upload_id = output.upload_id().ok_or_else(|| {
            StoreError::InvalidResponse("CreateMultipartUpload returned no upload id".into())
        })?;
        Ok(UploadId::new(upload_id))
    }

    async fn upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        part_number: PartNumber,
        data: Bytes,
    ) -> StoreResult<ETag> {
        let size = data.len();
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key.as_str())
            .upload_id(upload_id.as_str())
            .part_number(part_number.get() as i32)
            .content_length(size as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify("UploadPart", e))?;

        let e_tag = output.e_tag().ok_or_else(|| {
            StoreError::InvalidResponse(format!("UploadPart {} returned no ETag", part_number))
        })?;
        debug!(key = %key, part = %part_number, size, "S3 part stored");
        Ok(ETag::new(e_tag))
    }

    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectReference> {
        let s3_parts = parts
            .iter()
            .map(|part| {
                S3CompletedPart::builder()
                    .part_number(part.part_number.get() as i32)
                    .e_tag(part.e_tag.as_str())
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .upload_id(upload_id.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(s3_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify("CompleteMultipartUpload", e))?;

        Ok(ObjectReference {
            key: key.clone(),
            e_tag: output.e_tag().map(ETag::new),
            size: parts.iter().map(|part| part.size).sum(),
            parts: parts.len() as u32,
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(&self, key: &ObjectKey, upload_id: &UploadId) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .upload_id(upload_id.as_str())
            .send()
            .await
            .map_err(|e| classify("AbortMultipartUpload", e))?;
        Ok(())
    }

    async fn put_object(&self, key: &ObjectKey, data: Bytes) -> StoreResult<ObjectReference> {
        let size = data.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_length(size as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify("PutObject", e))?;

        Ok(ObjectReference {
            key: key.clone(),
            e_tag: output.e_tag().map(ETag::new),
            size,
            parts: 0,
            version_id: output.version_id().map(str::to_string),
        })
    }
}

/// Sort SDK failures into retryable and permanent ones.
///
/// Network-level failures, throttling and 5xx responses are transient;
/// any other service response is final.
fn classify<E>(operation: &str, err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = format!("{}: {}", operation, DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreError::Transient(detail)
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let code = service.err().code();
            if status >= 500
                || matches!(code, Some("SlowDown" | "RequestTimeout" | "InternalError"))
            {
                StoreError::Transient(detail)
            } else if status == 404 || code == Some("NoSuchUpload") {
                StoreError::NotFound(detail)
            } else {
                StoreError::Rejected(detail)
            }
        }
        _ => StoreError::Rejected(detail),
    }
}
