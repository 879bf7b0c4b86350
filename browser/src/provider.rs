//! The storage-backend contract and backend selection.

use std::sync::Arc;

use async_trait::async_trait;

use crate::azure::{AzureBlobStorageFileBrowserProvider, WorkspaceManagerClient};
use crate::config::BrowserConfig;
use crate::error::Result;
use crate::gcs::GcsFileBrowserProvider;
use crate::http::{HttpClient, RequestOptions};
use crate::incremental::IncrementalResponse;
use crate::types::{FileBrowserDirectory, FileBrowserFile, UploadFile};

/// Operations every cloud storage backend supports.
///
/// Directory paths are key prefixes: empty for the root, otherwise ending in
/// `/`. None of the operations retry.
#[async_trait]
pub trait FileBrowserProvider: Send + Sync {
    /// Whether directories can exist without any files in them.
    fn supports_empty_directories(&self) -> bool;

    async fn get_files_in_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<IncrementalResponse<FileBrowserFile>>;

    async fn get_directories_in_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<IncrementalResponse<FileBrowserDirectory>>;

    /// A URL a browser or `curl` can fetch directly.
    async fn get_download_url_for_file(&self, path: &str, options: &RequestOptions)
    -> Result<String>;

    /// A copy-pasteable shell command that downloads the file.
    async fn get_download_command_for_file(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<String>;

    async fn upload_file_to_directory(
        &self,
        directory_path: &str,
        file: &UploadFile,
        options: &RequestOptions,
    ) -> Result<()>;

    async fn delete_file(&self, path: &str, options: &RequestOptions) -> Result<()>;

    /// Copy to `destination_path`, then delete `source_path`.
    ///
    /// Not atomic: if the delete fails the object exists at both paths.
    async fn move_file(
        &self,
        source_path: &str,
        destination_path: &str,
        options: &RequestOptions,
    ) -> Result<()>;

    async fn create_empty_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<FileBrowserDirectory>;

    /// Remove a directory placeholder. A missing placeholder is not an error.
    async fn delete_empty_directory(&self, path: &str, options: &RequestOptions) -> Result<()>;
}

/// Storage location of a workspace, by cloud platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceStorage {
    Gcp { project: String, bucket: String },
    Azure { workspace_id: String },
}

/// Build the provider matching a workspace's cloud platform.
pub fn provider_for_workspace(
    storage: &WorkspaceStorage,
    config: &BrowserConfig,
    http: HttpClient,
) -> Arc<dyn FileBrowserProvider> {
    match storage {
        WorkspaceStorage::Gcp { project, bucket } => Arc::new(
            GcsFileBrowserProvider::new(project, bucket, config, http)
                .with_page_size(config.page_size()),
        ),
        WorkspaceStorage::Azure { workspace_id } => {
            let details = WorkspaceManagerClient::new(config, http.clone());
            Arc::new(
                AzureBlobStorageFileBrowserProvider::new(workspace_id, Arc::new(details), http)
                    .with_page_size(config.page_size()),
            )
        }
    }
}
