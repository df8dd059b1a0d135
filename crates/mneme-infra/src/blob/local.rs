//! Local filesystem blob store.
//!
//! Objects live at `{root}/{bucket}/{path}/{name}`. Each object is written to a
//! temporary sibling and renamed into place, so a reader never sees a
//! half-written file.
//!
//! ```text
//! {root}/mneme/snapshots/default/
//!   manifest.json
//!   metadata/conversations.arrow
//!   metadata/memories.arrow
//!   index/{conversation_id}.index
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mneme_core::snapshot::blob::{BlobStore, NamedBlob};
use mneme_types::error::BlobStoreError;

const TEMP_SUFFIX: &str = ".partial";

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `bucket` plus slash-separated segments under the root,
    /// rejecting anything that could escape it.
    fn resolve(&self, bucket: &str, relative: &str) -> Result<PathBuf, BlobStoreError> {
        let mut path = self.root.join(checked_segment(bucket)?);
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            path.push(checked_segment(segment)?);
        }
        Ok(path)
    }
}

fn checked_segment(segment: &str) -> Result<&str, BlobStoreError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('\\')
        || segment.contains('\0')
        || segment.ends_with(TEMP_SUFFIX)
    {
        return Err(BlobStoreError::InvalidPath(segment.to_string()));
    }
    Ok(segment)
}

fn io_error(path: &Path, e: std::io::Error) -> BlobStoreError {
    BlobStoreError::Io(format!("{}: {e}", path.display()))
}

impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        blobs: &[NamedBlob],
    ) -> Result<(), BlobStoreError> {
        for blob in blobs {
            let target = self.resolve(bucket, &format!("{path}/{}", blob.name))?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }

            let mut temp = target.clone().into_os_string();
            temp.push(TEMP_SUFFIX);
            let temp = PathBuf::from(temp);

            tokio::fs::write(&temp, &blob.bytes)
                .await
                .map_err(|e| io_error(&temp, e))?;
            tokio::fs::rename(&temp, &target)
                .await
                .map_err(|e| io_error(&target, e))?;

            tracing::debug!(object = %target.display(), bytes = blob.bytes.len(), "blob written");
        }
        Ok(())
    }

    async fn list_and_get(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, BlobStoreError> {
        let base = self.resolve(bucket, prefix)?;
        let mut objects = BTreeMap::new();

        match tokio::fs::metadata(&base).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(BlobStoreError::InvalidPath(format!(
                    "{} is not a directory",
                    base.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(objects),
            Err(e) => return Err(io_error(&base, e)),
        }

        let mut pending = vec![base.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| io_error(&dir, e))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| io_error(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&base) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| io_error(&path, e))?;
                objects.insert(key, bytes);
            }
        }

        Ok(objects)
    }
}
