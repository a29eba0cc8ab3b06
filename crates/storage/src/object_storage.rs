//! Object storage half of the Store Gateway: S3/MinIO-compatible bytes
//! for source PDFs (spec §6, "Object-store operations consumed:
//! `get_object(bucket, key) -> bytes`"). Carried over from
//! `video-audio-storage::object_storage` near-verbatim — storing and
//! retrieving opaque byte blobs by key is identical work regardless of
//! what the bytes represent.

use crate::{StorageError, StorageResult};
use aws_sdk_s3::{
    config::{Credentials, Region},
    Client,
};
use serde::{Deserialize, Serialize};

/// S3/MinIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-west-2") or "us-east-1" for `MinIO`
    pub region: String,

    /// S3 endpoint (custom for `MinIO`, empty for AWS S3)
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Path prefix for all objects (e.g., "video-extracts/")
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "flashread-documents".to_string(),
            region: "auto".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            prefix: String::new(),
        }
    }
}

/// Object storage trait. Spec §6 bounds object-store operations to
/// `get_object(bucket, key) -> bytes` — the Store Gateway never writes
/// or enumerates objects, so the trait carries only the one operation
/// the Job Runner actually consumes.
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Retrieve a file as bytes
    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>>;
}

/// S3/MinIO object storage implementation
pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ObjectStorage {
    /// Create a new S3 object storage client
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "docflow-storage",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Set custom endpoint for MinIO
        if let Some(endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix,
        })
    }

    /// Combine prefix with key
    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full_key = self.full_key(key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound(full_key.clone())
                } else {
                    StorageError::S3Error(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}
