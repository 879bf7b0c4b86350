//! Azure Blob Storage provider.
//!
//! Every request is authorized by a container SAS token issued by Workspace
//! Manager. The token is resolved once per provider and shared by all of its
//! operations. Listings come back as XML; empty directories are zero-byte
//! blobs whose name ends in `/`, which are hidden from listings.

use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::config::{BrowserConfig, DEFAULT_PAGE_SIZE};
use crate::error::{FileBrowserError, Result};
use crate::http::{HttpClient, RequestOptions};
use crate::incremental::{IncrementalResponse, Page, PageSource};
use crate::provider::FileBrowserProvider;
use crate::types::{FileBrowserDirectory, FileBrowserFile, UploadFile, ensure_directory_path};

/// Largest blob a single Put Blob request accepts.
pub const MAX_UPLOAD_BYTES: u64 = 5000 * 1024 * 1024;

/// Lifetime requested for container SAS tokens, in seconds (8 hours).
pub const SAS_EXPIRATION_SECONDS: u64 = 8 * 60 * 60;

/// Container address plus the SAS query string that authorizes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDetails {
    /// Container URL without a query string.
    pub container_url: String,
    /// SAS token, without a leading `?`.
    pub sas_token: String,
}

impl StorageDetails {
    pub fn new(container_url: impl Into<String>, sas_token: impl Into<String>) -> Self {
        let container_url = container_url.into();
        Self {
            container_url: container_url.trim_end_matches('/').to_owned(),
            sas_token: sas_token.into().trim_start_matches('?').to_owned(),
        }
    }

    /// Split a SAS-qualified container URL. `token` wins when both are given.
    pub fn from_sas_url(sas_url: &str, token: Option<&str>) -> Self {
        let (container_url, query) = sas_url.split_once('?').unwrap_or((sas_url, ""));
        Self::new(container_url, token.unwrap_or(query))
    }

    /// Blob URL without authorization.
    pub fn blob_url(&self, path: &str) -> String {
        format!("{}/{}", self.container_url, encode_blob_path(path))
    }

    /// Blob URL with the SAS token appended.
    pub fn sas_url(&self, path: &str) -> String {
        format!("{}?{}", self.blob_url(path), self.sas_token)
    }
}

fn encode_blob_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves the storage container of a workspace.
#[async_trait]
pub trait StorageDetailsSource: Send + Sync {
    async fn storage_details(&self, workspace_id: &str) -> Result<StorageDetails>;
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<ResourceDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceDescription {
    metadata: ResourceMetadata,
    #[serde(default)]
    resource_attributes: Option<ResourceAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceMetadata {
    resource_id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceAttributes {
    azure_storage_container: Option<StorageContainerAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageContainerAttributes {
    storage_container_name: String,
}

#[derive(Debug, Deserialize)]
struct SasTokenResponse {
    token: Option<String>,
    url: String,
}

/// Workspace Manager client that finds a workspace's controlled storage
/// container and issues an 8 hour SAS for it.
#[derive(Clone)]
pub struct WorkspaceManagerClient {
    http: HttpClient,
    base_url: String,
    access_token: String,
}

impl WorkspaceManagerClient {
    pub fn new(config: &BrowserConfig, http: HttpClient) -> Self {
        Self {
            http,
            base_url: config.workspace_manager_url().to_owned(),
            access_token: config.access_token().to_owned(),
        }
    }

    async fn find_container(&self, workspace_id: &str) -> Result<String> {
        let list: ResourceList = self
            .http
            .get(format!(
                "{}/api/workspaces/v1/{workspace_id}/resources",
                self.base_url
            ))
            .bearer_auth(&self.access_token)
            .query("offset", "0")
            .query("limit", "1000")
            .query("resource", "AZURE_STORAGE_CONTAINER")
            .query("stewardship", "CONTROLLED")
            .send(&RequestOptions::new())
            .await?
            .error_for_status()?
            .json()?;

        let workspace_container = format!("sc-{workspace_id}");
        let container_name = |resource: &ResourceDescription| {
            resource
                .resource_attributes
                .as_ref()
                .and_then(|attributes| attributes.azure_storage_container.as_ref())
                .map(|container| container.storage_container_name.clone())
                .or_else(|| resource.metadata.name.clone())
        };

        list.resources
            .iter()
            .find(|resource| {
                container_name(resource).as_deref() == Some(workspace_container.as_str())
            })
            .or_else(|| list.resources.first())
            .map(|resource| resource.metadata.resource_id.clone())
            .ok_or_else(|| {
                FileBrowserError::StorageDetails(format!(
                    "workspace {workspace_id} has no storage container"
                ))
            })
    }
}

#[async_trait]
impl StorageDetailsSource for WorkspaceManagerClient {
    #[instrument(level = "debug", skip(self))]
    async fn storage_details(&self, workspace_id: &str) -> Result<StorageDetails> {
        let resource_id = self.find_container(workspace_id).await?;
        let sas: SasTokenResponse = self
            .http
            .post(format!(
                "{}/api/workspaces/v1/{workspace_id}/resources/controlled/azure/storageContainer/{resource_id}/getSasToken",
                self.base_url
            ))
            .bearer_auth(&self.access_token)
            .query("sasExpirationDuration", SAS_EXPIRATION_SECONDS.to_string())
            .send(&RequestOptions::new())
            .await?
            .error_for_status()?
            .json()?;
        Ok(StorageDetails::from_sas_url(&sas.url, sas.token.as_deref()))
    }
}

/// One `Blob` element of a List Blobs response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BlobItem {
    name: String,
    creation_time: String,
    last_modified: String,
    content_length: String,
    content_type: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ListBlobsResult {
    blobs: Vec<BlobItem>,
    prefixes: Vec<String>,
    next_marker: Option<String>,
}

/// Parse a List Blobs XML body, mapping elements by tag name.
fn parse_list_blobs(xml: &str) -> Result<ListBlobsResult> {
    let parse_error = |e: quick_xml::Error| FileBrowserError::Parse(format!("invalid XML: {e}"));

    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut result = ListBlobsResult::default();
    let mut blob: Option<BlobItem> = None;
    let mut prefix: Option<String> = None;
    let mut next_marker = String::new();

    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(element) => {
                let tag = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                match tag.as_str() {
                    "Blob" => blob = Some(BlobItem::default()),
                    "BlobPrefix" => prefix = Some(String::new()),
                    _ => {}
                }
                stack.push(tag);
            }
            Event::End(_) => match stack.pop().as_deref() {
                Some("Blob") => result.blobs.extend(blob.take()),
                Some("BlobPrefix") => result.prefixes.extend(prefix.take()),
                _ => {}
            },
            Event::Text(text) => {
                let text = text.unescape().map_err(parse_error)?;
                let Some(tag) = stack.last() else {
                    continue;
                };
                if let Some(blob) = blob.as_mut() {
                    let field = match tag.as_str() {
                        "Name" => &mut blob.name,
                        "Creation-Time" => &mut blob.creation_time,
                        "Last-Modified" => &mut blob.last_modified,
                        "Content-Length" => &mut blob.content_length,
                        "Content-Type" => &mut blob.content_type,
                        _ => continue,
                    };
                    field.push_str(&text);
                } else if let Some(prefix) = prefix.as_mut() {
                    if tag == "Name" {
                        prefix.push_str(&text);
                    }
                } else if tag == "NextMarker" {
                    next_marker.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let next_marker = next_marker.trim();
    result.next_marker = (!next_marker.is_empty()).then(|| next_marker.to_owned());
    Ok(result)
}

fn rfc1123_millis(value: &str) -> Result<i64> {
    if value.is_empty() {
        return Ok(0);
    }
    chrono::DateTime::parse_from_rfc2822(value)
        .map(|time| time.timestamp_millis())
        .map_err(|e| FileBrowserError::Parse(format!("invalid timestamp {value:?}: {e}")))
}

fn blob_to_file(blob: BlobItem, details: &StorageDetails) -> Result<FileBrowserFile> {
    let size = if blob.content_length.is_empty() {
        0
    } else {
        blob.content_length.trim().parse().map_err(|e| {
            FileBrowserError::Parse(format!(
                "invalid Content-Length {:?}: {e}",
                blob.content_length
            ))
        })?
    };
    let content_type = if blob.content_type.is_empty() {
        "application/octet-stream".to_owned()
    } else {
        blob.content_type
    };

    Ok(FileBrowserFile {
        url: details.sas_url(&blob.name),
        content_type,
        size,
        created_at: rfc1123_millis(&blob.creation_time)?,
        updated_at: rfc1123_millis(&blob.last_modified)?,
        path: blob.name,
    })
}

struct AzureBlobClient {
    workspace_id: String,
    source: Arc<dyn StorageDetailsSource>,
    details: OnceCell<StorageDetails>,
    http: HttpClient,
}

impl AzureBlobClient {
    async fn details(&self) -> Result<&StorageDetails> {
        self.details
            .get_or_try_init(|| self.source.storage_details(&self.workspace_id))
            .await
    }

    /// Await the shared resolution, giving up early if the caller aborts.
    async fn details_with(&self, options: &RequestOptions) -> Result<&StorageDetails> {
        match &options.signal {
            Some(signal) => {
                tokio::select! {
                    biased;
                    () = signal.cancelled() => Err(FileBrowserError::Aborted),
                    details = self.details() => details,
                }
            }
            None => self.details().await,
        }
    }

    async fn list_blobs(
        &self,
        prefix: &str,
        max_results: usize,
        marker: Option<String>,
        options: &RequestOptions,
    ) -> Result<(ListBlobsResult, &StorageDetails)> {
        let details = self.details_with(options).await?;
        debug!(workspace_id = %self.workspace_id, prefix, "listing blobs");
        let body = self
            .http
            .get(&details.container_url)
            .query("restype", "container")
            .query("comp", "list")
            .query("delimiter", "/")
            .query("prefix", prefix)
            .query("maxresults", max_results.to_string())
            .query_opt("marker", marker)
            .raw_query(&details.sas_token)
            .send(options)
            .await?
            .error_for_status()?
            .text();
        Ok((parse_list_blobs(&body)?, details))
    }

    async fn put_blob(
        &self,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
        options: &RequestOptions,
    ) -> Result<()> {
        let details = self.details_with(options).await?;
        self.http
            .put(details.sas_url(path))
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type)
            .body(content)
            .send(options)
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_blob(&self, path: &str, options: &RequestOptions) -> Result<()> {
        let details = self.details_with(options).await?;
        self.http
            .delete(details.sas_url(path))
            .send(options)
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Server-side copy. The copy may still be running when this returns;
    /// `x-ms-copy-status` is not polled.
    async fn copy_blob(
        &self,
        source_path: &str,
        destination_path: &str,
        options: &RequestOptions,
    ) -> Result<()> {
        let details = self.details_with(options).await?;
        self.http
            .put(details.sas_url(destination_path))
            .header("x-ms-copy-source", details.sas_url(source_path))
            .body(Vec::new())
            .send(options)
            .await?
            .error_for_status()?;
        Ok(())
    }
}

struct FileListing {
    client: Arc<AzureBlobClient>,
    prefix: String,
    page_size: usize,
}

#[async_trait]
impl PageSource<FileBrowserFile> for FileListing {
    async fn fetch_page(
        &self,
        page_token: Option<String>,
        options: &RequestOptions,
    ) -> Result<Page<FileBrowserFile>> {
        let (result, details) = self
            .client
            .list_blobs(&self.prefix, self.page_size, page_token, options)
            .await?;

        let items = result
            .blobs
            .into_iter()
            // Placeholder marking this directory.
            .filter(|blob| blob.name != self.prefix)
            .map(|blob| blob_to_file(blob, details))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            next_page_token: result.next_marker,
        })
    }
}

struct DirectoryListing {
    client: Arc<AzureBlobClient>,
    prefix: String,
    page_size: usize,
}

#[async_trait]
impl PageSource<FileBrowserDirectory> for DirectoryListing {
    async fn fetch_page(
        &self,
        page_token: Option<String>,
        options: &RequestOptions,
    ) -> Result<Page<FileBrowserDirectory>> {
        let (result, _) = self
            .client
            .list_blobs(&self.prefix, self.page_size, page_token, options)
            .await?;

        let items = result
            .prefixes
            .into_iter()
            .filter(|name| *name != self.prefix)
            .map(FileBrowserDirectory::new)
            .collect();

        Ok(Page {
            items,
            next_page_token: result.next_marker,
        })
    }
}

/// File browser over the storage container of one Azure workspace.
#[derive(Clone)]
pub struct AzureBlobStorageFileBrowserProvider {
    client: Arc<AzureBlobClient>,
    page_size: usize,
}

impl AzureBlobStorageFileBrowserProvider {
    /// Create the provider and, inside a Tokio runtime, start resolving the
    /// container SAS right away.
    pub fn new(
        workspace_id: impl Into<String>,
        source: Arc<dyn StorageDetailsSource>,
        http: HttpClient,
    ) -> Self {
        let client = Arc::new(AzureBlobClient {
            workspace_id: workspace_id.into(),
            source,
            details: OnceCell::new(),
            http,
        });

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = Arc::clone(&client);
            handle.spawn(async move {
                if let Err(err) = client.details().await {
                    debug!(workspace_id = %client.workspace_id, %err, "storage details prefetch failed");
                }
            });
        }

        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl FileBrowserProvider for AzureBlobStorageFileBrowserProvider {
    fn supports_empty_directories(&self) -> bool {
        true
    }

    #[instrument(level = "debug", skip(self, options), fields(workspace_id = %self.client.workspace_id))]
    async fn get_files_in_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<IncrementalResponse<FileBrowserFile>> {
        ensure_directory_path(path)?;
        let source = Arc::new(FileListing {
            client: Arc::clone(&self.client),
            prefix: path.to_owned(),
            page_size: self.page_size,
        });
        IncrementalResponse::first_page(source, self.page_size, options).await
    }

    #[instrument(level = "debug", skip(self, options), fields(workspace_id = %self.client.workspace_id))]
    async fn get_directories_in_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<IncrementalResponse<FileBrowserDirectory>> {
        ensure_directory_path(path)?;
        let source = Arc::new(DirectoryListing {
            client: Arc::clone(&self.client),
            prefix: path.to_owned(),
            page_size: self.page_size,
        });
        IncrementalResponse::first_page(source, self.page_size, options).await
    }

    async fn get_download_url_for_file(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        Ok(self.client.details_with(options).await?.sas_url(path))
    }

    async fn get_download_command_for_file(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        let url = self.get_download_url_for_file(path, options).await?;
        Ok(format!("azcopy copy '{url}' ."))
    }

    #[instrument(level = "debug", skip(self, file, options), fields(file = %file.name, size = file.size))]
    async fn upload_file_to_directory(
        &self,
        directory_path: &str,
        file: &UploadFile,
        options: &RequestOptions,
    ) -> Result<()> {
        if file.size > MAX_UPLOAD_BYTES {
            return Err(FileBrowserError::FileTooLarge {
                size: file.size,
                max_size: MAX_UPLOAD_BYTES,
            });
        }
        ensure_directory_path(directory_path)?;
        let content = file.read_content().await?;
        self.client
            .put_blob(
                &format!("{directory_path}{}", file.name),
                &file.content_type,
                content,
                options,
            )
            .await
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn delete_file(&self, path: &str, options: &RequestOptions) -> Result<()> {
        self.client.delete_blob(path, options).await
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn move_file(
        &self,
        source_path: &str,
        destination_path: &str,
        options: &RequestOptions,
    ) -> Result<()> {
        self.client
            .copy_blob(source_path, destination_path, options)
            .await?;
        self.client.delete_blob(source_path, options).await
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn create_empty_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<FileBrowserDirectory> {
        if !path.ends_with('/') {
            return Err(FileBrowserError::InvalidPath(format!(
                "directory path must end with '/': {path:?}"
            )));
        }
        self.client
            .put_blob(path, "application/octet-stream", Vec::new(), options)
            .await?;
        Ok(FileBrowserDirectory::new(path))
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn delete_empty_directory(&self, path: &str, options: &RequestOptions) -> Result<()> {
        ensure_directory_path(path)?;
        match self.client.delete_blob(path, options).await {
            Err(err) if err.is_not_found() => Ok(()),
            result => result,
        }
    }
}
