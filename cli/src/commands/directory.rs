//! Create and remove empty directories.

use anyhow::{Context as _, Result, bail};
use tracing::instrument;

use crate::commands::directory_path;
use crate::context::CommandContext;
use crate::output::Output;

#[instrument(skip_all, name = "mkdir", fields(path = %path))]
pub async fn run_mkdir(ctx: &CommandContext, path: &str) -> Result<()> {
    if !ctx.provider.supports_empty_directories() {
        bail!("This storage backend cannot hold empty directories");
    }
    let path = directory_path(path);
    if path.is_empty() {
        bail!("Cannot create the root directory");
    }

    let directory = ctx
        .provider
        .create_empty_directory(&path, &ctx.options())
        .await
        .with_context(|| format!("Failed to create {path}"))?;
    Output::new().success(format!("Created {}", directory.path));
    Ok(())
}

#[instrument(skip_all, name = "rmdir", fields(path = %path))]
pub async fn run_rmdir(ctx: &CommandContext, path: &str) -> Result<()> {
    let path = directory_path(path);
    if path.is_empty() {
        bail!("Cannot remove the root directory");
    }

    ctx.provider
        .delete_empty_directory(&path, &ctx.options())
        .await
        .with_context(|| format!("Failed to remove {path}"))?;
    Output::new().success(format!("Removed {path}"));
    Ok(())
}
