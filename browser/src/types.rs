//! File browser types.

use std::path::{Path, PathBuf};

use crate::error::{FileBrowserError, Result};

/// One object in cloud storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBrowserFile {
    /// Full key relative to the bucket or container root.
    pub path: String,
    /// Backend-native address (`gs://...` or a SAS-qualified blob URL).
    pub url: String,
    pub content_type: String,
    pub size: u64,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

impl FileBrowserFile {
    /// Last path segment.
    pub fn name(&self) -> &str {
        basename(&self.path)
    }
}

/// A shared key prefix presented as a directory. `path` always ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBrowserDirectory {
    pub path: String,
    pub url: Option<String>,
}

impl FileBrowserDirectory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn name(&self) -> &str {
        basename(&self.path)
    }
}

/// Where an upload's bytes come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Memory(Vec<u8>),
    /// Read from disk only once the upload actually starts.
    Path(PathBuf),
}

/// A file queued for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub source: UploadSource,
}

impl UploadFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: content.len() as u64,
            source: UploadSource::Memory(content),
        }
    }

    /// Describe a local file without reading its contents.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| FileBrowserError::InvalidPath(path.display().to_string()))?;
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();

        Ok(Self {
            name,
            content_type,
            size: metadata.len(),
            source: UploadSource::Path(path.to_path_buf()),
        })
    }

    /// Load the body for sending.
    pub async fn read_content(&self) -> Result<Vec<u8>> {
        match &self.source {
            UploadSource::Memory(content) => Ok(content.clone()),
            UploadSource::Path(path) => Ok(tokio::fs::read(path).await?),
        }
    }
}

/// Last segment of a storage path, ignoring a trailing `/`.
pub fn basename(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Reject non-root directory paths that lack the trailing separator.
pub fn ensure_directory_path(path: &str) -> Result<()> {
    if path.is_empty() || path.ends_with('/') {
        Ok(())
    } else {
        Err(FileBrowserError::InvalidPath(format!(
            "directory path must end with '/': {path}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("a/b/c.txt"), "c.txt");
        assert_eq!(basename("a/b/"), "b");
        assert_eq!(basename("c.txt"), "c.txt");
        assert_eq!(basename(""), "");
    }

    #[test]
    fn test_ensure_directory_path() {
        assert!(ensure_directory_path("").is_ok());
        assert!(ensure_directory_path("dir/").is_ok());
        assert!(matches!(
            ensure_directory_path("dir"),
            Err(FileBrowserError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.csv");
        tokio::fs::write(&path, b"id,value\n1,2\n").await.unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "reads.csv");
        assert_eq!(file.content_type, "text/csv");
        assert_eq!(file.size, 13);
        assert_eq!(file.read_content().await.unwrap(), b"id,value\n1,2\n");
    }

    #[test]
    fn test_upload_file_from_bytes() {
        let file = UploadFile::from_bytes("notes.txt", b"hello".to_vec(), "text/plain");
        assert_eq!(file.size, 5);
        assert!(matches!(file.source, UploadSource::Memory(_)));
    }
}
