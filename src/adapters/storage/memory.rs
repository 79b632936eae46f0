use crate::adapters::storage::ObjectStorage;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

/// Keeps uploaded objects in memory. Used by tests and local development.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    objects: Arc<DashMap<String, (String, Bytes)>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type and body of a stored object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<(String, Bytes)> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.objects.insert(key.to_string(), (content_type.to_string(), body));
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        Ok(())
    }
}
