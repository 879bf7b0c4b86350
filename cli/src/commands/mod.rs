//! Command implementations for the Terra files CLI.
//!
//! Each subcommand is implemented in its own module.

pub mod completions;
pub mod directory;
pub mod list;
pub mod mv;
pub mod rm;
pub mod upload;
pub mod url;

pub use completions::generate_completions;
pub use directory::{run_mkdir, run_rmdir};
pub use list::run_list;
pub use mv::run_move;
pub use rm::run_remove;
pub use upload::run_upload;
pub use url::{run_download_command, run_url};

/// Normalize a user-typed directory: no leading `/`, a trailing `/` unless it
/// is the root.
pub fn directory_path(path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        path.to_owned()
    } else {
        format!("{path}/")
    }
}
