//! Command line and environment configuration

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use partwise_core::{RetryPolicy, UploadConfig, DEFAULT_PART_SIZE};
use partwise_engine::s3::DEFAULT_REGION;
use partwise_engine::{MemoryStore, ObjectStore, S3Config, S3Store};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// S3 or any S3-compatible endpoint
    S3,
    /// Process-local store, contents are lost on exit
    Memory,
}

#[derive(Debug, Parser)]
#[command(
    name = "partwise-server",
    version,
    about = "Streams HTTP uploads into object storage as multipart uploads"
)]
pub struct Args {
    /// Bind address
    #[arg(long, env = "PARTWISE_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    #[arg(long, env = "PARTWISE_BACKEND", value_enum, default_value_t = Backend::S3)]
    pub backend: Backend,

    /// Target bucket (required for the s3 backend)
    #[arg(long, env = "PARTWISE_BUCKET")]
    pub bucket: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Custom S3 endpoint, e.g. http://localhost:9000 for MinIO
    #[arg(long, env = "PARTWISE_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, env = "PARTWISE_PATH_STYLE")]
    pub path_style: bool,

    /// Part size in bytes
    #[arg(long, env = "PARTWISE_PART_SIZE", default_value_t = DEFAULT_PART_SIZE)]
    pub part_size: u64,

    /// Attempts per store call, including the first
    #[arg(long, env = "PARTWISE_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Emit logs as JSON lines
    #[arg(long, env = "PARTWISE_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            part_size: self.part_size,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
        }
    }

    pub fn s3_config(&self) -> anyhow::Result<S3Config> {
        let Some(bucket) = self.bucket.clone() else {
            bail!("--bucket (or PARTWISE_BUCKET) is required for the s3 backend");
        };

        Ok(S3Config {
            bucket,
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            force_path_style: self.path_style,
        })
    }

    pub async fn build_store(&self) -> anyhow::Result<Arc<dyn ObjectStore>> {
        match self.backend {
            Backend::S3 => {
                let store = S3Store::new(self.s3_config()?)
                    .await
                    .context("failed to configure S3 store")?;
                Ok(Arc::new(store))
            }
            Backend::Memory => {
                warn!("Using in-memory store, uploaded objects are not persisted");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}
