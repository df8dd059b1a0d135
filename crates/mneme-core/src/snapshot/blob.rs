//! Blob storage port for snapshot bundles.

use std::collections::BTreeMap;

use mneme_types::error::BlobStoreError;

/// One object to upload, named relative to the bundle path.
#[derive(Debug, Clone)]
pub struct NamedBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NamedBlob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Put/list/get bytes under `bucket/path`.
pub trait BlobStore: Send + Sync {
    /// Write every blob under `{path}/{blob.name}`, overwriting existing objects.
    fn put(
        &self,
        bucket: &str,
        path: &str,
        blobs: &[NamedBlob],
    ) -> impl std::future::Future<Output = Result<(), BlobStoreError>> + Send;

    /// Every object below `prefix`, keyed by its name relative to `prefix`.
    ///
    /// An absent prefix yields an empty map, not an error.
    fn list_and_get(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<BTreeMap<String, Vec<u8>>, BlobStoreError>>
    + Send;
}
