pub mod object;

pub use object::{ObjectStorage, ObjectStoreStorage};

use common::config::StorageConfig;
use common::{Error, Result};
use dashmap::DashMap;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Resolves location strings (`s3://bucket/prefix`, `file:///dir`, `memory://name/prefix`,
/// plain paths) to scoped [`ObjectStorage`] handles, sharing one client per bucket or root.
#[derive(Clone)]
pub struct StorageManager {
    pub config: StorageConfig,
    object_store_cache: Arc<DashMap<String, Arc<dyn ObjectStore>>>,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            object_store_cache: Arc::new(DashMap::new()),
        }
    }

    /// Storage for reading. A local directory must already exist.
    pub fn storage_for(&self, location: &str) -> Result<Arc<dyn ObjectStorage>> {
        self.resolve(location, false)
    }

    /// Storage for writing. A missing local directory is created.
    pub fn output_storage_for(&self, location: &str) -> Result<Arc<dyn ObjectStorage>> {
        self.resolve(location, true)
    }

    fn resolve(&self, location: &str, create: bool) -> Result<Arc<dyn ObjectStorage>> {
        let location = location.trim();
        if location.is_empty() {
            return Err(Error::InvalidUri("Storage location must not be empty".to_string()));
        }

        if !location.contains("://") {
            return self.local_storage(location, create);
        }

        let url = Url::parse(location)?;
        let prefix = url.path().trim_matches('/').to_string();

        match url.scheme() {
            "s3" | "s3a" => {
                let bucket = url.host_str().ok_or_else(|| {
                    Error::InvalidUri(format!("Missing bucket in '{}'", location))
                })?;
                let store = self.get_object_store(&format!("s3://{}", bucket), || {
                    Ok(Arc::new(self.build_s3_store(bucket)?))
                })?;
                Ok(Arc::new(ObjectStoreStorage::new(store, &prefix, location)))
            }
            "memory" => {
                let name = url.host_str().unwrap_or_default();
                let store = self.get_object_store(&format!("memory://{}", name), || {
                    Ok(Arc::new(InMemory::new()))
                })?;
                Ok(Arc::new(ObjectStoreStorage::new(store, &prefix, location)))
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    Error::InvalidUri(format!("Invalid file location '{}'", location))
                })?;
                self.local_storage(&path.to_string_lossy(), create)
            }
            other => Err(Error::InvalidUri(format!(
                "Unsupported storage scheme '{}' in '{}'",
                other, location
            ))),
        }
    }

    fn local_storage(&self, dir: &str, create: bool) -> Result<Arc<dyn ObjectStorage>> {
        if create {
            std::fs::create_dir_all(dir)?;
        } else if !std::path::Path::new(dir).is_dir() {
            return Err(Error::InvalidInput(format!(
                "Local location '{}' is not a directory",
                dir
            )));
        }
        let root = std::fs::canonicalize(dir)?;
        let root_str = root.to_string_lossy().to_string();
        let store = self.get_object_store(&format!("file://{}", root_str), || {
            Ok(Arc::new(LocalFileSystem::new_with_prefix(&root)?))
        })?;
        Ok(Arc::new(ObjectStoreStorage::new(store, "", &root_str)))
    }

    fn get_object_store<F>(&self, cache_key: &str, build: F) -> Result<Arc<dyn ObjectStore>>
    where
        F: FnOnce() -> Result<Arc<dyn ObjectStore>>,
    {
        if let Some(store) = self.object_store_cache.get(cache_key) {
            return Ok(store.clone());
        }

        debug!(store = cache_key, "Creating object store client");
        let store = build()?;
        self.object_store_cache
            .insert(cache_key.to_string(), store.clone());
        Ok(store)
    }

    fn build_s3_store(&self, bucket: &str) -> Result<object_store::aws::AmazonS3> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_allow_http(self.config.allow_http);

        if let Some(access_key) = &self.config.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &self.config.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }
        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        Ok(builder.build()?)
    }
}
