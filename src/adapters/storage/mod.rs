use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;
pub mod s3;

pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// Blob store for message images and avatars.
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug + 'static {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Verifies the backing store is reachable.
    async fn check(&self) -> Result<()>;
}
