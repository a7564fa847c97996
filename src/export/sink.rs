//! Artifact sink built on object_store

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::{ExportError, ExportFormat, Result};

/// A rendered document ready to be written
#[derive(Debug, Clone)]
pub struct Artifact {
    pub task_id: String,
    pub file_name: String,
    pub format: ExportFormat,
    pub body: String,
    pub chapter_count: usize,
    pub missing_count: usize,
}

impl Artifact {
    /// Storage key: exports/{task_id}/{file_name}.{ext}
    pub fn key(&self) -> String {
        format!(
            "exports/{}/{}",
            self.task_id,
            self.file_name_with_extension()
        )
    }

    pub fn file_name_with_extension(&self) -> String {
        format!("{}.{}", sanitize_file_name(&self.file_name), self.format.extension())
    }
}

/// Where a written artifact ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHandle {
    pub key: String,
    pub file_name: String,
    /// MIME type of the rendered format, for whoever serves the file
    pub content_type: &'static str,
    pub size: usize,
    pub chapter_count: usize,
    pub missing_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn write(&self, artifact: Artifact) -> Result<ArtifactHandle>;
}

/// Sink writing artifacts into any object_store backend
#[derive(Clone)]
pub struct ArtifactStore {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Store artifacts as plain files below `root`
    pub fn local<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store)))
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);
        let result = self.store.get(&path).await?;
        let bytes = result.bytes().await?;

        tracing::debug!(key, size = bytes.len(), "Artifact read");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ExportSink for ArtifactStore {
    async fn write(&self, artifact: Artifact) -> Result<ArtifactHandle> {
        let key = artifact.key();
        let path = StoragePath::from(key.as_str());
        let file_name = artifact.file_name_with_extension();
        let size = artifact.body.len();
        let content_type = artifact.format.content_type();

        let put_result = self
            .store
            .put(&path, Bytes::from(artifact.body).into())
            .await
            .map_err(ExportError::Storage)?;

        tracing::info!(
            task_id = %artifact.task_id,
            key = %key,
            size,
            missing = artifact.missing_count,
            "Artifact written"
        );

        Ok(ArtifactHandle {
            key,
            file_name,
            content_type,
            size,
            chapter_count: artifact.chapter_count,
            missing_count: artifact.missing_count,
            etag: put_result.e_tag,
        })
    }
}

/// Path separators and control characters would change the object key layout
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(file_name: &str) -> Artifact {
        Artifact {
            task_id: "task_1".into(),
            file_name: file_name.into(),
            format: ExportFormat::Text,
            body: "Book\n\n".into(),
            chapter_count: 1,
            missing_count: 0,
        }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(artifact("Book").key(), "exports/task_1/Book.txt");
        assert_eq!(artifact("a/b: c").key(), "exports/task_1/a_b_ c.txt");
        assert_eq!(artifact("  ").key(), "exports/task_1/export.txt");
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let store = ArtifactStore::in_memory();
        let handle = store.write(artifact("Book")).await.unwrap();

        assert_eq!(handle.key, "exports/task_1/Book.txt");
        assert_eq!(handle.file_name, "Book.txt");
        assert_eq!(handle.content_type, "text/plain; charset=utf-8");
        assert_eq!(handle.size, 6);
        assert_eq!(store.read(&handle.key).await.unwrap(), b"Book\n\n");
    }

    #[tokio::test]
    async fn test_local_store_writes_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::local(temp_dir.path().join("exports")).unwrap();

        let handle = store.write(artifact("Book")).await.unwrap();
        let on_disk = std::fs::read(temp_dir.path().join("exports").join(&handle.key)).unwrap();
        assert_eq!(on_disk, b"Book\n\n");
    }
}
