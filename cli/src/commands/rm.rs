//! Delete files.

use std::sync::Arc;

use anyhow::{Result, bail};
use terra_files_browser::delete_files;
use tracing::instrument;

use crate::context::CommandContext;
use crate::output::Output;

#[instrument(skip_all, name = "rm", fields(count = paths.len()))]
pub async fn run_remove(ctx: &CommandContext, paths: Vec<String>) -> Result<()> {
    let out = Output::new();
    let total = paths.len();

    let outcome = delete_files(Arc::clone(&ctx.provider), paths, &ctx.options()).await;

    for path in &outcome.succeeded {
        out.success(format!("Deleted {path}"));
    }
    for (path, err) in &outcome.failed {
        out.error(format!("{path}: {err}"));
    }

    if !outcome.is_success() {
        bail!("{} of {total} deletes failed", outcome.failed.len());
    }
    Ok(())
}
