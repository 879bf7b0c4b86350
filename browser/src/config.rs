use std::env::vars;
use std::fmt::Display;

use serde::Deserialize;
use tracing::info;

/// Default number of usable items per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const DEFAULT_GCS_API_URL: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TerraEnv {
    #[serde(rename = "dev")]
    Dev,
    #[serde(rename = "staging")]
    Staging,
    #[serde(rename = "prod")]
    Prod,
}

impl Display for TerraEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Staging => write!(f, "staging"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

// The final, validated configuration struct.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    env: TerraEnv,
    gcs_api_url: String,
    sam_url: String,
    workspace_manager_url: String,
    access_token: String,
    page_size: usize,
}

// An intermediate struct for deserializing environment variables
// where everything except the token has a default.
#[derive(Deserialize)]
struct RawConfig {
    terra_env: Option<TerraEnv>,
    gcs_api_url: Option<String>,
    sam_url: Option<String>,
    workspace_manager_url: Option<String>,
    access_token: Option<String>,
    page_size: Option<usize>,
}

impl BrowserConfig {
    /// Point every service at one base URL, typically a mock server.
    pub fn new_for_test(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            env: TerraEnv::Dev,
            gcs_api_url: base_url.clone(),
            sam_url: base_url.clone(),
            workspace_manager_url: base_url,
            access_token: "test-access-token".to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn environment(&self) -> TerraEnv {
        self.env
    }

    pub fn gcs_api_url(&self) -> &str {
        &self.gcs_api_url
    }

    pub fn sam_url(&self) -> &str {
        &self.sam_url
    }

    pub fn workspace_manager_url(&self) -> &str {
        &self.workspace_manager_url
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Initializes configuration by reading from environment variables
    /// and applying environment-aware defaults.
    pub fn init() -> anyhow::Result<Self> {
        info!("Loading configuration from environment variables");

        let raw_config: RawConfig = serde_env::from_iter(vars())?;
        Self::from_raw(raw_config)
    }

    fn from_raw(raw_config: RawConfig) -> anyhow::Result<Self> {
        let RawConfig {
            terra_env,
            gcs_api_url,
            sam_url,
            workspace_manager_url,
            access_token,
            page_size,
        } = raw_config;

        let env = terra_env.unwrap_or_else(|| {
            info!("TERRA_ENV not set, defaulting to prod");
            TerraEnv::Prod
        });

        let gcs_api_url = gcs_api_url.unwrap_or_else(|| DEFAULT_GCS_API_URL.to_owned());

        let sam_url = sam_url.unwrap_or_else(|| {
            let url = format!("https://sam.dsde-{env}.broadinstitute.org");
            info!("SAM_URL not set, defaulting to {} for {} environment", url, env);
            url
        });

        let workspace_manager_url = workspace_manager_url.unwrap_or_else(|| {
            let url = format!("https://workspace.dsde-{env}.broadinstitute.org");
            info!(
                "WORKSPACE_MANAGER_URL not set, defaulting to {} for {} environment",
                url, env
            );
            url
        });

        let Some(access_token) = access_token.filter(|token| !token.trim().is_empty()) else {
            anyhow::bail!(
                "ACCESS_TOKEN must be set, e.g. `export ACCESS_TOKEN=$(gcloud auth print-access-token)`"
            );
        };

        let page_size = match page_size {
            Some(0) => anyhow::bail!("PAGE_SIZE must be at least 1"),
            Some(size) => size,
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            env,
            gcs_api_url: trim_base(gcs_api_url),
            sam_url: trim_base(sam_url),
            workspace_manager_url: trim_base(workspace_manager_url),
            access_token,
            page_size,
        })
    }
}

fn trim_base(url: String) -> String {
    match url.strip_suffix('/') {
        Some(trimmed) => trimmed.to_owned(),
        None => url,
    }
}
