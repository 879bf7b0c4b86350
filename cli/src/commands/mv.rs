//! Move or rename a file.

use anyhow::{Context as _, Result};
use tracing::instrument;

use crate::context::CommandContext;
use crate::output::Output;

#[instrument(skip_all, name = "mv", fields(source = %source, destination = %destination))]
pub async fn run_move(ctx: &CommandContext, source: &str, destination: &str) -> Result<()> {
    ctx.provider
        .move_file(source, destination, &ctx.options())
        .await
        .with_context(|| {
            format!("Failed to move {source} to {destination}; check both paths before retrying")
        })?;
    Output::new().success(format!("Moved {source} to {destination}"));
    Ok(())
}
