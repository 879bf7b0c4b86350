//! Google Cloud Storage provider.
//!
//! Listings use the JSON API's `prefix`/`delimiter`/`pageToken` parameters.
//! Download URLs are signed by Sam, not by the storage API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::{BrowserConfig, DEFAULT_PAGE_SIZE};
use crate::error::{FileBrowserError, Result};
use crate::http::{HttpClient, RequestOptions};
use crate::incremental::{IncrementalResponse, Page, PageSource};
use crate::provider::FileBrowserProvider;
use crate::types::{FileBrowserDirectory, FileBrowserFile, UploadFile, ensure_directory_path};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    size: Option<String>,
    content_type: Option<String>,
    time_created: Option<String>,
    updated: Option<String>,
}

struct GcsClient {
    http: HttpClient,
    gcs_api_url: String,
    sam_url: String,
    access_token: String,
    project: String,
    bucket: String,
}

impl GcsClient {
    fn gs_url(&self, path: &str) -> String {
        format!("gs://{}/{}", self.bucket, path)
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.gcs_api_url,
            self.bucket,
            urlencoding::encode(path)
        )
    }

    async fn list(
        &self,
        prefix: &str,
        max_results: usize,
        page_token: Option<String>,
        options: &RequestOptions,
    ) -> Result<ListObjectsResponse> {
        debug!(bucket = %self.bucket, prefix, "listing objects");
        self.http
            .get(format!("{}/storage/v1/b/{}/o", self.gcs_api_url, self.bucket))
            .bearer_auth(&self.access_token)
            .query("prefix", prefix)
            .query("delimiter", "/")
            .query("maxResults", max_results.to_string())
            .query("userProject", &self.project)
            .query_opt("pageToken", page_token)
            .send(options)
            .await?
            .error_for_status()?
            .json()
    }

    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        content: Vec<u8>,
        options: &RequestOptions,
    ) -> Result<()> {
        self.http
            .post(format!(
                "{}/upload/storage/v1/b/{}/o",
                self.gcs_api_url, self.bucket
            ))
            .bearer_auth(&self.access_token)
            .query("uploadType", "media")
            .query("name", name)
            .query("userProject", &self.project)
            .header("Content-Type", content_type)
            .body(content)
            .send(options)
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, path: &str, options: &RequestOptions) -> Result<()> {
        self.http
            .delete(self.object_url(path))
            .bearer_auth(&self.access_token)
            .query("userProject", &self.project)
            .send(options)
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn copy_within_bucket(
        &self,
        source_path: &str,
        destination_path: &str,
        options: &RequestOptions,
    ) -> Result<()> {
        self.http
            .post(format!(
                "{}/copyTo/b/{}/o/{}",
                self.object_url(source_path),
                self.bucket,
                urlencoding::encode(destination_path)
            ))
            .bearer_auth(&self.access_token)
            .query("userProject", &self.project)
            .send(options)
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn rfc3339_millis(value: Option<&str>) -> Result<i64> {
    match value {
        Some(value) => chrono::DateTime::parse_from_rfc3339(value)
            .map(|time| time.timestamp_millis())
            .map_err(|e| FileBrowserError::Parse(format!("invalid timestamp {value:?}: {e}"))),
        None => Ok(0),
    }
}

fn parse_size(value: Option<&str>) -> Result<u64> {
    value.map_or(Ok(0), |value| {
        value
            .parse()
            .map_err(|e| FileBrowserError::Parse(format!("invalid object size {value:?}: {e}")))
    })
}

struct FileListing {
    client: Arc<GcsClient>,
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
        let response = self
            .client
            .list(&self.prefix, self.page_size, page_token, options)
            .await?;

        let items = response
            .items
            .into_iter()
            // The directory's own placeholder object.
            .filter(|object| object.name != self.prefix)
            .map(|object| -> Result<FileBrowserFile> {
                Ok(FileBrowserFile {
                    url: self.client.gs_url(&object.name),
                    content_type: object
                        .content_type
                        .unwrap_or_else(|| "application/octet-stream".to_owned()),
                    size: parse_size(object.size.as_deref())?,
                    created_at: rfc3339_millis(object.time_created.as_deref())?,
                    updated_at: rfc3339_millis(object.updated.as_deref())?,
                    path: object.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }
}

struct DirectoryListing {
    client: Arc<GcsClient>,
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
        let response = self
            .client
            .list(&self.prefix, self.page_size, page_token, options)
            .await?;

        let items = response
            .prefixes
            .into_iter()
            .filter(|prefix| *prefix != self.prefix)
            .map(|prefix| {
                let url = self.client.gs_url(&prefix);
                FileBrowserDirectory::new(prefix).with_url(url)
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }
}

/// File browser over one GCS bucket, billed to the workspace's project.
#[derive(Clone)]
pub struct GcsFileBrowserProvider {
    client: Arc<GcsClient>,
    page_size: usize,
}

impl GcsFileBrowserProvider {
    pub fn new(
        project: impl Into<String>,
        bucket: impl Into<String>,
        config: &BrowserConfig,
        http: HttpClient,
    ) -> Self {
        Self {
            client: Arc::new(GcsClient {
                http,
                gcs_api_url: config.gcs_api_url().to_owned(),
                sam_url: config.sam_url().to_owned(),
                access_token: config.access_token().to_owned(),
                project: project.into(),
                bucket: bucket.into(),
            }),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl FileBrowserProvider for GcsFileBrowserProvider {
    fn supports_empty_directories(&self) -> bool {
        true
    }

    #[instrument(level = "debug", skip(self, options), fields(bucket = %self.client.bucket))]
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

    #[instrument(level = "debug", skip(self, options), fields(bucket = %self.client.bucket))]
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

    #[instrument(level = "debug", skip(self, options))]
    async fn get_download_url_for_file(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        let client = &self.client;
        client
            .http
            .post(format!(
                "{}/api/google/v1/user/signedUrlForBlob",
                client.sam_url
            ))
            .bearer_auth(&client.access_token)
            .json(&serde_json::json!({
                "gsPath": client.gs_url(path),
                "requesterPaysProject": client.project,
            }))?
            .send(options)
            .await?
            .error_for_status()?
            .json()
    }

    async fn get_download_command_for_file(
        &self,
        path: &str,
        _options: &RequestOptions,
    ) -> Result<String> {
        Ok(format!(
            "gcloud storage cp '{}' .",
            self.client.gs_url(path)
        ))
    }

    #[instrument(level = "debug", skip(self, file, options), fields(file = %file.name, size = file.size))]
    async fn upload_file_to_directory(
        &self,
        directory_path: &str,
        file: &UploadFile,
        options: &RequestOptions,
    ) -> Result<()> {
        ensure_directory_path(directory_path)?;
        let content = file.read_content().await?;
        self.client
            .upload(
                &format!("{directory_path}{}", file.name),
                &file.content_type,
                content,
                options,
            )
            .await
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn delete_file(&self, path: &str, options: &RequestOptions) -> Result<()> {
        self.client.delete(path, options).await
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn move_file(
        &self,
        source_path: &str,
        destination_path: &str,
        options: &RequestOptions,
    ) -> Result<()> {
        self.client
            .copy_within_bucket(source_path, destination_path, options)
            .await?;
        self.client.delete(source_path, options).await
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn create_empty_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<FileBrowserDirectory> {
        if path.is_empty() {
            return Err(FileBrowserError::InvalidPath(
                "cannot create the root directory".to_owned(),
            ));
        }
        ensure_directory_path(path)?;
        self.client
            .upload(path, "text/plain", Vec::new(), options)
            .await?;
        Ok(FileBrowserDirectory::new(path).with_url(self.client.gs_url(path)))
    }

    #[instrument(level = "debug", skip(self, options))]
    async fn delete_empty_directory(&self, path: &str, options: &RequestOptions) -> Result<()> {
        ensure_directory_path(path)?;
        match self.client.delete(path, options).await {
            Err(err) if err.is_not_found() => Ok(()),
            result => result,
        }
    }
}
