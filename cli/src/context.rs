//! Provider construction and cancellation shared by every command.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use terra_files_browser::{
    BrowserConfig, FileBrowserProvider, HttpClient, RequestOptions, provider_for_workspace,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cli::WorkspaceArgs;

/// The provider a command runs against plus the signal that cancels it.
pub struct CommandContext {
    pub provider: Arc<dyn FileBrowserProvider>,
    signal: CancellationToken,
}

impl CommandContext {
    pub fn new(provider: Arc<dyn FileBrowserProvider>) -> Self {
        Self {
            provider,
            signal: CancellationToken::new(),
        }
    }

    /// Load configuration from the environment and pick the provider for the
    /// selected workspace.
    #[instrument(skip_all, name = "connect")]
    pub fn from_workspace(args: &WorkspaceArgs) -> Result<Self> {
        let storage = args.storage()?;
        let config = BrowserConfig::init().context("Failed to load configuration")?;
        info!(env = %config.environment(), ?storage, "using workspace storage");
        Ok(Self::new(provider_for_workspace(
            &storage,
            &config,
            HttpClient::new(),
        )))
    }

    pub fn options(&self) -> RequestOptions {
        RequestOptions::with_signal(self.signal.clone())
    }

    pub fn signal(&self) -> CancellationToken {
        self.signal.clone()
    }

    /// Cancel in-flight requests on the first Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) {
        let signal = self.signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                signal.cancel();
            }
        });
    }
}
