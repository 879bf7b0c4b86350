//! `terra-files`: browse and manage the files of a Terra workspace.

mod cli;
mod commands;
mod context;
mod output;
mod timing;

use anyhow::Result;
use clap::Parser as _;

use crate::cli::{Cli, Commands};
use crate::commands::list::PageLimit;
use crate::commands::{
    generate_completions, run_download_command, run_list, run_mkdir, run_move, run_remove,
    run_rmdir, run_upload, run_url,
};
use crate::context::CommandContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    timing::init_tracing(cli.verbose, cli.timing);

    if let Commands::Completions { shell } = cli.command {
        return generate_completions(shell);
    }

    let ctx = CommandContext::from_workspace(&cli.workspace)?;
    ctx.cancel_on_ctrl_c();

    match cli.command {
        Commands::Ls { path, pages, all } => {
            let limit = PageLimit((!all).then_some(pages.max(1)));
            run_list(&ctx, &path, limit).await
        }
        Commands::Url { path } => run_url(&ctx, &path).await,
        Commands::Cmd { path } => run_download_command(&ctx, &path).await,
        Commands::Upload { directory, files } => run_upload(&ctx, &directory, files).await,
        Commands::Rm { paths } => run_remove(&ctx, paths).await,
        Commands::Mv {
            source,
            destination,
        } => run_move(&ctx, &source, &destination).await,
        Commands::Mkdir { path } => run_mkdir(&ctx, &path).await,
        Commands::Rmdir { path } => run_rmdir(&ctx, &path).await,
        Commands::Completions { .. } => Ok(()),
    }
}
