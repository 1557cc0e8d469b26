use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use crate::error::{Result, StoreErrorContext};

/// The object store seam. The real implementation talks to S3; tests swap in
/// a fake that records calls and injects failures.
#[async_trait]
pub trait ObjectStore {
    /// Public URL under which an uploaded object is reachable.
    fn public_url(&self, key: &str) -> String;

    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<()>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket: String,
    /// Domain the bucket is served from, e.g. `s3.amazonaws.com`.
    pub public_domain: String,
}

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    config: StoreConfig,
}

impl S3Storage {
    /// Region and credentials come from the environment, the same way the
    /// rest of the aws sdk finds them.
    pub async fn new(config: StoreConfig) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        let client = aws_sdk_s3::Client::new(&sdk_config);
        Self { client, config }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}/{}",
            self.config.bucket, self.config.public_domain, key
        )
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<()> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(bytes));
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        req.send()
            .await
            .with_context(|| format!("cannot put object {key}"))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("cannot delete object {key}"))?;
        Ok(())
    }
}
