use crate::adapters::storage::ObjectStorage;
use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

#[derive(Clone, Debug)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    #[must_use]
    pub const fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

/// Builds an S3 client from configuration, honoring custom endpoints and
/// static credentials for S3-compatible stores.
pub async fn initialize_client(config: &StorageConfig) -> Client {
    let region_provider = aws_config::Region::new(config.region.clone());
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region_provider);

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(ak), Some(sk)) = (&config.access_key, &config.secret_key) {
        let creds = aws_credential_types::Credentials::new(ak.clone(), sk.clone(), None, None, "static");
        loader = loader.credentials_provider(creds);
    }

    let sdk_config = loader.load().await;
    let s3_config =
        aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style).build();

    Client::from_conf(s3_config)
}

#[async_trait]
impl ObjectStorage for S3Storage {
    #[tracing::instrument(level = "debug", skip(self, body), fields(size = body.len()))]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, key = %key, "S3 Upload failed");
                AppError::Upstream(format!("S3 upload failed for {key}"))
            })?;

        Ok(())
    }

    async fn check(&self) -> Result<()> {
        self.client.head_bucket().bucket(&self.bucket).send().await.map_err(|e| {
            tracing::warn!(error = ?e, bucket = %self.bucket, "S3 Head bucket failed");
            AppError::Upstream(format!("bucket {} unreachable", self.bucket))
        })?;
        Ok(())
    }
}
