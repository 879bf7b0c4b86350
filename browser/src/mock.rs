//! In-memory provider for testing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::{FileBrowserError, Result};
use crate::http::RequestOptions;
use crate::incremental::{IncrementalResponse, Page, PageSource};
use crate::provider::FileBrowserProvider;
use crate::types::{
    FileBrowserDirectory, FileBrowserFile, UploadFile, basename, ensure_directory_path,
};

/// In-memory implementation of [`FileBrowserProvider`].
///
/// Objects live in a sorted map keyed by path, so listings come back in key
/// order like they do from a real bucket. Failures can be injected per path.
#[derive(Clone)]
pub struct MockFileBrowserProvider {
    objects: Arc<RwLock<BTreeMap<String, MockObject>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    cancel_after: Arc<RwLock<HashMap<String, CancellationToken>>>,
    stalled: Arc<RwLock<HashSet<String>>>,
    page_size: usize,
    empty_directories: bool,
}

#[derive(Clone)]
struct MockObject {
    content: Vec<u8>,
    content_type: String,
}

impl Default for MockFileBrowserProvider {
    fn default() -> Self {
        Self {
            objects: Arc::default(),
            failing: Arc::default(),
            cancel_after: Arc::default(),
            stalled: Arc::default(),
            page_size: DEFAULT_PAGE_SIZE,
            empty_directories: true,
        }
    }
}

impl MockFileBrowserProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also the raw page size of the simulated backend.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Act like a backend with no directory placeholders.
    pub fn without_empty_directories(mut self) -> Self {
        self.empty_directories = false;
        self
    }

    pub fn insert_file(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        let path = path.into();
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();
        self.objects.write().expect("lock poisoned").insert(
            path,
            MockObject {
                content: content.into(),
                content_type,
            },
        );
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        let objects = self.objects.read().expect("lock poisoned");
        objects.get(path).map(|object| object.content.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .read()
            .expect("lock poisoned")
            .contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        let objects = self.objects.read().expect("lock poisoned");
        objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make writes and deletes touching `path` fail with a 500.
    pub fn fail_on(&self, path: impl Into<String>) {
        self.failing
            .write()
            .expect("lock poisoned")
            .insert(path.into());
    }

    /// Cancel `token` right after `path` has been uploaded.
    pub fn cancel_after_upload(&self, path: impl Into<String>, token: CancellationToken) {
        self.cancel_after
            .write()
            .expect("lock poisoned")
            .insert(path.into(), token);
    }

    /// Make the upload of `path` hang until its future is dropped.
    pub fn stall_upload(&self, path: impl Into<String>) {
        self.stalled
            .write()
            .expect("lock poisoned")
            .insert(path.into());
    }

    fn check(&self, path: &str, options: &RequestOptions) -> Result<()> {
        if options.is_aborted() {
            return Err(FileBrowserError::Aborted);
        }
        if self.failing.read().expect("lock poisoned").contains(path) {
            return Err(FileBrowserError::Http {
                status: 500,
                body: format!("injected failure for {path}"),
            });
        }
        Ok(())
    }

    fn not_found(path: &str) -> FileBrowserError {
        FileBrowserError::Http {
            status: 404,
            body: format!("No such object: {path}"),
        }
    }

    fn to_file(path: &str, object: &MockObject) -> FileBrowserFile {
        FileBrowserFile {
            path: path.to_owned(),
            url: format!("mock://{path}"),
            content_type: object.content_type.clone(),
            size: object.content.len() as u64,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// A fixed listing served in raw pages of `raw_page_size`.
struct SnapshotPages<T> {
    items: Vec<T>,
    raw_page_size: usize,
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> PageSource<T> for SnapshotPages<T> {
    async fn fetch_page(
        &self,
        page_token: Option<String>,
        options: &RequestOptions,
    ) -> Result<Page<T>> {
        if options.is_aborted() {
            return Err(FileBrowserError::Aborted);
        }
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| FileBrowserError::Parse(format!("bad page token: {token}")))?,
            None => 0,
        };
        let end = (start + self.raw_page_size).min(self.items.len());
        let items = self.items.get(start..end).unwrap_or_default().to_vec();
        Ok(Page {
            items,
            next_page_token: (end < self.items.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl FileBrowserProvider for MockFileBrowserProvider {
    fn supports_empty_directories(&self) -> bool {
        self.empty_directories
    }

    async fn get_files_in_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<IncrementalResponse<FileBrowserFile>> {
        let files: Vec<FileBrowserFile> = {
            let objects = self.objects.read().expect("lock poisoned");
            objects
                .iter()
                .filter(|(key, _)| {
                    key.strip_prefix(path)
                        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
                })
                .map(|(key, object)| Self::to_file(key, object))
                .collect()
        };
        let source = SnapshotPages {
            items: files,
            raw_page_size: self.page_size,
        };
        IncrementalResponse::first_page(Arc::new(source), self.page_size, options).await
    }

    async fn get_directories_in_directory(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<IncrementalResponse<FileBrowserDirectory>> {
        let prefixes: BTreeSet<String> = {
            let objects = self.objects.read().expect("lock poisoned");
            objects
                .keys()
                .filter_map(|key| {
                    let rest = key.strip_prefix(path)?;
                    let (child, _) = rest.split_once('/')?;
                    Some(format!("{path}{child}/"))
                })
                .collect()
        };
        let source = SnapshotPages {
            items: prefixes
                .into_iter()
                .map(|prefix| {
                    let url = format!("mock://{prefix}");
                    FileBrowserDirectory::new(prefix).with_url(url)
                })
                .collect(),
            raw_page_size: self.page_size,
        };
        IncrementalResponse::first_page(Arc::new(source), self.page_size, options).await
    }

    async fn get_download_url_for_file(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        self.check(path, options)?;
        if !self.contains(path) {
            return Err(Self::not_found(path));
        }
        Ok(format!("mock://{path}"))
    }

    async fn get_download_command_for_file(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        let url = self.get_download_url_for_file(path, options).await?;
        Ok(format!("cp '{url}' {}", basename(path)))
    }

    async fn upload_file_to_directory(
        &self,
        directory_path: &str,
        file: &UploadFile,
        options: &RequestOptions,
    ) -> Result<()> {
        ensure_directory_path(directory_path)?;
        let path = format!("{directory_path}{}", file.name);
        self.check(&path, options)?;
        let stalled = self.stalled.read().expect("lock poisoned").contains(&path);
        if stalled {
            std::future::pending::<()>().await;
        }

        let content = file.read_content().await?;
        self.objects.write().expect("lock poisoned").insert(
            path.clone(),
            MockObject {
                content,
                content_type: file.content_type.clone(),
            },
        );

        if let Some(token) = self.cancel_after.read().expect("lock poisoned").get(&path) {
            token.cancel();
        }
        Ok(())
    }

    async fn delete_file(&self, path: &str, options: &RequestOptions) -> Result<()> {
        self.check(path, options)?;
        match self.objects.write().expect("lock poisoned").remove(path) {
            Some(_) => Ok(()),
            None => Err(Self::not_found(path)),
        }
    }

    async fn move_file(
        &self,
        source_path: &str,
        destination_path: &str,
        options: &RequestOptions,
    ) -> Result<()> {
        self.check(destination_path, options)?;
        let object = {
            let objects = self.objects.read().expect("lock poisoned");
            objects
                .get(source_path)
                .cloned()
                .ok_or_else(|| Self::not_found(source_path))?
        };
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(destination_path.to_owned(), object);

        self.delete_file(source_path, options).await
    }

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
        self.check(path, options)?;
        self.objects.write().expect("lock poisoned").insert(
            path.to_owned(),
            MockObject {
                content: Vec::new(),
                content_type: "text/plain".to_owned(),
            },
        );
        Ok(FileBrowserDirectory::new(path).with_url(format!("mock://{path}")))
    }

    async fn delete_empty_directory(&self, path: &str, options: &RequestOptions) -> Result<()> {
        ensure_directory_path(path)?;
        self.check(path, options)?;
        self.objects.write().expect("lock poisoned").remove(path);
        Ok(())
    }
}
