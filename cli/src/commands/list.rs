//! List a directory.

use anyhow::{Context as _, Result};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use terra_files_browser::{
    FileBrowserDirectory, FileBrowserFile, FileBrowserProvider, IncrementalResponse,
    RequestOptions,
};
use tracing::instrument;

use crate::commands::directory_path;
use crate::context::CommandContext;
use crate::output::{Output, format_millis, format_size};

/// Directories and files fetched for one `ls`.
pub struct Listing {
    pub directories: Vec<FileBrowserDirectory>,
    pub files: Vec<FileBrowserFile>,
    /// True if either listing has pages left.
    pub truncated: bool,
}

/// How many pages of each listing to fetch; `None` means all of them.
#[derive(Debug, Clone, Copy)]
pub struct PageLimit(pub Option<usize>);

impl PageLimit {
    fn allows(self, fetched: usize) -> bool {
        self.0.is_none_or(|limit| fetched < limit)
    }
}

async fn fetch_pages<T: Send + Sync + Clone + 'static>(
    first: IncrementalResponse<T>,
    limit: PageLimit,
    options: &RequestOptions,
) -> terra_files_browser::Result<IncrementalResponse<T>> {
    let mut response = first;
    let mut fetched = 1;
    while response.has_next_page && limit.allows(fetched) {
        response = response.get_next_page(options).await?;
        fetched += 1;
    }
    Ok(response)
}

/// Fetch directories and files of `path` side by side.
pub async fn fetch_listing(
    provider: &dyn FileBrowserProvider,
    path: &str,
    limit: PageLimit,
    options: &RequestOptions,
) -> terra_files_browser::Result<Listing> {
    let (directories, files) = tokio::try_join!(
        async {
            let first = provider.get_directories_in_directory(path, options).await?;
            fetch_pages(first, limit, options).await
        },
        async {
            let first = provider.get_files_in_directory(path, options).await?;
            fetch_pages(first, limit, options).await
        },
    )?;

    Ok(Listing {
        truncated: directories.has_next_page || files.has_next_page,
        directories: directories.into_items(),
        files: files.into_items(),
    })
}

#[derive(Tabled)]
struct ListRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Type")]
    content_type: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

fn rows(listing: &Listing) -> Vec<ListRow> {
    let directories = listing.directories.iter().map(|directory| ListRow {
        name: format!("{}/", directory.name()),
        size: String::new(),
        content_type: "directory".to_owned(),
        updated: String::new(),
    });
    let files = listing.files.iter().map(|file| ListRow {
        name: file.name().to_owned(),
        size: format_size(file.size),
        content_type: file.content_type.clone(),
        updated: format_millis(file.updated_at),
    });
    directories.chain(files).collect()
}

#[instrument(skip_all, name = "ls", fields(path = %path, pages = ?limit.0))]
pub async fn run_list(ctx: &CommandContext, path: &str, limit: PageLimit) -> Result<()> {
    let out = Output::new();
    let path = directory_path(path);

    let listing = fetch_listing(ctx.provider.as_ref(), &path, limit, &ctx.options())
        .await
        .with_context(|| format!("Failed to list {}", display_directory(&path)))?;

    if listing.directories.is_empty() && listing.files.is_empty() {
        out.dim(format!("{} is empty.", display_directory(&path)));
        return Ok(());
    }

    let mut table = Table::new(rows(&listing));
    table.with(Style::rounded());
    out.print(table.to_string());
    out.count(
        "Total",
        listing.directories.len() + listing.files.len(),
        "item",
    );

    if listing.truncated {
        out.dim("More entries available; pass --pages N or --all to see them.");
    }
    Ok(())
}

pub fn display_directory(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}
