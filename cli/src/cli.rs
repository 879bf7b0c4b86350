use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use terra_files_browser::WorkspaceStorage;

#[derive(Parser)]
#[command(name = "terra-files")]
#[command(about = "Browse and manage files in a Terra workspace", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// Show timing/latency information
    #[arg(long, global = true)]
    pub timing: bool,

    /// Enable verbose debug output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Which workspace's storage to browse.
#[derive(Args, Debug, Default)]
pub struct WorkspaceArgs {
    /// Google project billed for bucket access (GCP workspaces)
    #[arg(long, global = true, env = "TERRA_PROJECT")]
    pub project: Option<String>,

    /// Workspace bucket name, without `gs://` (GCP workspaces)
    #[arg(long, global = true, env = "TERRA_BUCKET")]
    pub bucket: Option<String>,

    /// Workspace ID (Azure workspaces)
    #[arg(long, global = true, env = "TERRA_WORKSPACE_ID")]
    pub workspace_id: Option<String>,
}

impl WorkspaceArgs {
    pub fn storage(&self) -> Result<WorkspaceStorage> {
        match (&self.project, &self.bucket, &self.workspace_id) {
            (Some(project), Some(bucket), None) => Ok(WorkspaceStorage::Gcp {
                project: project.clone(),
                bucket: bucket.trim_start_matches("gs://").to_owned(),
            }),
            (None, None, Some(workspace_id)) => Ok(WorkspaceStorage::Azure {
                workspace_id: workspace_id.clone(),
            }),
            (_, _, Some(_)) => {
                bail!("--workspace-id cannot be combined with --project or --bucket")
            }
            _ => bail!("pass either --project and --bucket, or --workspace-id"),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the directories and files in a directory
    Ls {
        /// Directory to list, ending in `/`; the root when omitted
        #[arg(default_value = "")]
        path: String,

        /// Number of pages to fetch
        #[arg(long, short = 'p', default_value = "1")]
        pages: usize,

        /// Fetch every page
        #[arg(long, short = 'a', conflicts_with = "pages")]
        all: bool,
    },
    /// Print a download URL for a file
    Url {
        /// Path of the file
        path: String,
    },
    /// Print a shell command that downloads a file
    Cmd {
        /// Path of the file
        path: String,
    },
    /// Upload local files into a directory
    Upload {
        /// Destination directory, ending in `/`; use "" for the root
        directory: String,

        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete files
    Rm {
        /// Paths of the files
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Move or rename a file
    Mv {
        /// Current path
        source: String,

        /// New path
        destination: String,
    },
    /// Create an empty directory
    Mkdir {
        /// Directory path, ending in `/`
        path: String,
    },
    /// Remove an empty directory
    Rmdir {
        /// Directory path, ending in `/`
        path: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
