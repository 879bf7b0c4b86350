//! Upload local files with progress.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use terra_files_browser::{UploadFile, UploadState, UploadTracker};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::commands::directory_path;
use crate::commands::list::display_directory;
use crate::context::CommandContext;
use crate::output::{Output, format_size};

/// Print a line each time the tracker moves on to the next file.
fn report_progress(mut receiver: watch::Receiver<UploadState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let out = Output::new();
        let mut reported = 0;
        while receiver.changed().await.is_ok() {
            let state = receiver.borrow_and_update().clone();
            if state.current_file_num == reported {
                continue;
            }
            reported = state.current_file_num;
            if let Some(file) = &state.current_file {
                out.step(
                    state.current_file_num,
                    state.total_files,
                    format!("{} ({})", file.name, format_size(file.size)),
                );
            }
        }
    })
}

#[instrument(skip_all, name = "upload", fields(directory = %directory, count = files.len()))]
pub async fn run_upload(ctx: &CommandContext, directory: &str, files: Vec<PathBuf>) -> Result<()> {
    let out = Output::new();
    let directory = directory_path(directory);

    let mut uploads = Vec::with_capacity(files.len());
    for path in &files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        uploads.push(file);
    }

    let tracker = UploadTracker::new();
    let progress = report_progress(tracker.subscribe());
    let state = tracker
        .upload_files(ctx.provider.as_ref(), &directory, uploads, ctx.signal())
        .await
        .context("Another upload is already in progress")?;
    drop(tracker);
    progress.await.ok();

    for failure in &state.errors {
        out.error(format!("{}: {}", failure.file.name, failure.message));
    }

    if state.aborted {
        bail!(
            "Upload cancelled after {} of {} file(s)",
            state.completed_files.len(),
            state.total_files
        );
    }
    if !state.errors.is_empty() {
        bail!(
            "{} of {} upload(s) failed",
            state.errors.len(),
            state.total_files
        );
    }

    out.success(format!(
        "Uploaded {} file(s) ({}) to {}",
        state.completed_files.len(),
        format_size(state.uploaded_bytes),
        display_directory(&directory)
    ));
    Ok(())
}
