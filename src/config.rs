//! Run configuration.
//!
//! The configuration file is YAML; a JSON config is accepted as well since
//! JSON documents are valid YAML. The loaded [`Config`] is passed by
//! reference into the pipeline and every adapter.

use crate::error::{ConfigError, IngestError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

fn default_page_size() -> u32 {
    200
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

/// Base URLs of the remote services. Overridable so tests can point the
/// adapters at a mock server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub graph_api: String,
    pub disqus: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            graph_api: "https://graph.facebook.com/v2.2".to_string(),
            disqus: "https://disqus.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// Root directory of the snapshot store.
    pub download_location: PathBuf,
    /// Credential for the REST source; treated as an opaque string.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Page whose feed is ingested.
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    /// Strict mode: the first failed post aborts the run.
    #[serde(default)]
    pub abort_on_error: bool,
    /// Only feed entries whose message contains this substring are ingested.
    #[serde(default)]
    pub feedmessage_grep: Option<String>,
    /// URL groups to ingest in addition to `page`.
    #[serde(default)]
    pub urls: Vec<Vec<String>>,
    /// File holding further URL groups (YAML or JSON list of lists).
    #[serde(default)]
    pub urls_file: Option<PathBuf>,
    #[serde(default)]
    pub disqus_api_key: Option<String>,
    #[serde(default)]
    pub disqus_version: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Number of posts fetched in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Config {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?config.download_location, page = ?config.page, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// All URL groups: inline `urls` first, then those from `urls_file`.
    ///
    /// A relative `urls_file` is resolved against `base_dir` (the config
    /// file's directory).
    pub fn url_groups(&self, base_dir: &Path) -> Result<Vec<Vec<String>>, ConfigError> {
        let mut groups = self.urls.clone();
        if let Some(file) = &self.urls_file {
            let path = base_dir.join(file);
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let more: Vec<Vec<String>> = serde_yaml::from_str(&text)
                .map_err(|source| ConfigError::Parse { path, source })?;
            groups.extend(more);
        }
        Ok(groups)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn access_token(&self) -> Result<&str, IngestError> {
        self.access_token
            .as_deref()
            .ok_or(IngestError::MissingSetting("access_token"))
    }

    pub fn disqus_api_key(&self) -> Result<&str, IngestError> {
        self.disqus_api_key
            .as_deref()
            .ok_or(IngestError::MissingSetting("disqus_api_key"))
    }

    pub fn disqus_version(&self) -> Result<&str, IngestError> {
        self.disqus_version
            .as_deref()
            .ok_or(IngestError::MissingSetting("disqus_version"))
    }

    #[cfg(test)]
    pub fn for_testing(download_location: &Path) -> Self {
        Self {
            download_location: download_location.to_path_buf(),
            access_token: Some("TOKEN".to_string()),
            page: None,
            verbose: false,
            abort_on_error: false,
            feedmessage_grep: None,
            urls: Vec::new(),
            urls_file: None,
            disqus_api_key: Some("KEY".to_string()),
            disqus_version: Some("v1".to_string()),
            page_size: default_page_size(),
            concurrency: 2,
            request_timeout_secs: 5,
            endpoints: Endpoints::default(),
        }
    }
}
