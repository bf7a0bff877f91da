use async_trait::async_trait;
use bytes::Bytes;
use common::{Error, Result};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use std::sync::Arc;

/// Key/value blob access scoped to one location. Keys are relative to that location.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;
    async fn get_object(&self, key: &str) -> Result<Bytes>;
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete_object(&self, key: &str) -> Result<()>;
    async fn check_file_exists(&self, key: &str) -> Result<bool>;
    fn location(&self) -> &str;
}

pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    location: String,
}

impl ObjectStoreStorage {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str, location: &str) -> Self {
        Self {
            store,
            prefix: prefix.trim_matches('/').to_string(),
            location: location.to_string(),
        }
    }

    fn full_path(&self, key: &str) -> Result<Path> {
        let key = key.trim_matches('/');
        let full = match (self.prefix.is_empty(), key.is_empty()) {
            (true, _) => key.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, key),
        };
        Ok(Path::parse(full)?)
    }

    fn relative_key(&self, path: &Path) -> String {
        let raw = path.as_ref();
        if self.prefix.is_empty() {
            return raw.to_string();
        }
        raw.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(raw)
            .to_string()
    }
}

#[async_trait]
impl ObjectStorage for ObjectStoreStorage {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.full_path(key)?;
        self.store
            .put(&path, data.into())
            .await
            .map_err(|e| Error::Storage(format!("Failed to put {} in {}: {}", key, self.location, e)))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let path = self.full_path(key)?;
        let data = match self.store.get(&path).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(Error::Storage(format!(
                    "Object {} not found in {}",
                    key, self.location
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(data)
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.full_path(prefix)?;
        let objects: Vec<ObjectMeta> = self.store.list(Some(&path)).try_collect().await?;

        let mut keys: Vec<String> = objects
            .iter()
            .map(|meta| self.relative_key(&meta.location))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.full_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to delete {} in {}: {}",
                key, self.location, e
            ))),
        }
    }

    async fn check_file_exists(&self, key: &str) -> Result<bool> {
        let path = self.full_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self) -> &str {
        &self.location
    }
}
