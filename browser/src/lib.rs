//! Paginated browsing of Terra workspace storage.
//!
//! A workspace keeps its files either in a Google Cloud Storage bucket or in
//! an Azure Blob Storage container. Both are exposed through one
//! [`FileBrowserProvider`] contract: directory listings that grow a page at a
//! time, download URLs and commands, uploads, deletes, moves, and directory
//! placeholders. Every operation takes a [`RequestOptions`] whose signal can
//! cancel it mid-flight.

mod azure;
mod batch;
mod config;
mod error;
mod gcs;
mod http;
mod incremental;
mod mock;
mod provider;
mod types;
mod upload;

pub use azure::{
    AzureBlobStorageFileBrowserProvider, MAX_UPLOAD_BYTES, SAS_EXPIRATION_SECONDS, StorageDetails,
    StorageDetailsSource, WorkspaceManagerClient,
};
pub use batch::{BatchOutcome, delete_files};
pub use config::{BrowserConfig, DEFAULT_PAGE_SIZE, TerraEnv};
pub use error::{FileBrowserError, Result};
pub use gcs::GcsFileBrowserProvider;
pub use http::{HttpClient, Method, RequestBuilder, RequestOptions, Response};
pub use incremental::{IncrementalResponse, Page, PageSource};
pub use mock::MockFileBrowserProvider;
pub use provider::{FileBrowserProvider, WorkspaceStorage, provider_for_workspace};
pub use types::{
    FileBrowserDirectory, FileBrowserFile, UploadFile, UploadSource, basename,
    ensure_directory_path,
};
pub use upload::{UploadAction, UploadFailure, UploadState, UploadTracker, UploadedFile};
