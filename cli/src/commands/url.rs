//! Download URL and download command for a file.

use anyhow::{Context as _, Result};
use tracing::instrument;

use crate::context::CommandContext;
use crate::output::Output;

#[instrument(skip_all, name = "url", fields(path = %path))]
pub async fn run_url(ctx: &CommandContext, path: &str) -> Result<()> {
    let url = ctx
        .provider
        .get_download_url_for_file(path, &ctx.options())
        .await
        .with_context(|| format!("Failed to get a download URL for {path}"))?;
    Output::new().print(url);
    Ok(())
}

#[instrument(skip_all, name = "cmd", fields(path = %path))]
pub async fn run_download_command(ctx: &CommandContext, path: &str) -> Result<()> {
    let command = ctx
        .provider
        .get_download_command_for_file(path, &ctx.options())
        .await
        .with_context(|| format!("Failed to get a download command for {path}"))?;
    Output::new().print(command);
    Ok(())
}
