//! Object-store seam used for both photo reads and report publication.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StoreError;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Deterministic location of a rendered report.
pub fn report_key(agency_id: &str, property_id: &str, inspection_id: &str) -> String {
    format!("inspections/{agency_id}/{property_id}/{inspection_id}.pdf")
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads a complete object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// A URL granting read access to the object until `expires_in` elapses.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// Process-local store; every instance is independent.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        self.object(bucket, key)
            .await
            .map(|object| object.body)
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        Ok(format!(
            "memory://{bucket}/{key}?expires={}",
            expiry_timestamp(expires_in)
        ))
    }
}

/// Store rooted in a local directory; objects live at `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.join(checked_segment(bucket)?);
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => path.push(part),
                _ => return Err(StoreError::InvalidKey(key.to_string())),
            }
        }
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::not_found(bucket, key))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body).await?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let path = self.object_path(bucket, key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let path = self.object_path(bucket, key)?;
        let absolute = std::path::absolute(&path)?;
        let mut url = url::Url::from_file_path(&absolute)
            .map_err(|_| StoreError::InvalidKey(key.to_string()))?;
        url.query_pairs_mut()
            .append_pair("expires", &expiry_timestamp(expires_in).to_string());
        Ok(url.to_string())
    }
}

fn checked_segment(bucket: &str) -> Result<&str, StoreError> {
    if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
        return Err(StoreError::InvalidKey(bucket.to_string()));
    }
    Ok(bucket)
}

fn expiry_timestamp(expires_in: Duration) -> i64 {
    (OffsetDateTime::now_utc() + expires_in).unix_timestamp()
}
