//! On-disk snapshot store.
//!
//! Every run writes into its own directory under `download_location`, named
//! by the run key:
//!
//! ```text
//! download_location/
//! ├── 2015-05-01T101500/
//! │   ├── feed.json       # raw page enumeration, when a page was ingested
//! │   └── snapshot.json   # posts in feed order + recorded failures
//! └── 2015-05-02T080000/
//!     └── snapshot.json
//! ```
//!
//! Payloads are never overwritten. Run keys sort lexically in time order, so
//! the latest run is the greatest directory name.

use crate::error::StoreError;
use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

pub const RUN_KEY_FORMAT: &str = "%Y-%m-%dT%H%M%S";
pub const SNAPSHOT: &str = "snapshot";
pub const FEED: &str = "feed";

/// A fresh run key from the local clock.
pub fn new_run_key() -> String {
    Local::now().format(RUN_KEY_FORMAT).to_string()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn payload_path(&self, run_key: &str, name: &str) -> PathBuf {
        self.root.join(run_key).join(format!("{name}.json"))
    }

    /// Store `payload` as `name` in run `run_key`.
    #[instrument(level = "info", skip(self, payload))]
    pub async fn put<T: Serialize>(
        &self,
        run_key: &str,
        name: &str,
        payload: &T,
    ) -> Result<PathBuf, StoreError> {
        let run_dir = self.root.join(run_key);
        fs::create_dir_all(&run_dir).await.map_err(io_error(&run_dir))?;

        let target = self.payload_path(run_key, name);
        if fs::try_exists(&target).await.map_err(io_error(&target))? {
            return Err(StoreError::AlreadyExists(target));
        }

        let json = serde_json::to_vec_pretty(payload).map_err(|source| StoreError::Json {
            path: target.clone(),
            source,
        })?;
        let tmp = run_dir.join(format!(".{name}.json.{}.tmp", std::process::id()));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&tmp).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(StoreError::AlreadyExists(target)),
            Err(e) => return Err(io_error(&tmp)(e)),
        };
        let written = async {
            file.write_all(&json).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        // A hard link fails when the target exists, unlike a rename.
        let published = match written {
            Ok(()) => fs::hard_link(&tmp, &target).await,
            Err(e) => Err(e),
        };
        let cleanup = fs::remove_file(&tmp).await;
        match published {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(StoreError::AlreadyExists(target)),
            Err(e) => return Err(io_error(&target)(e)),
        }
        if let Err(e) = cleanup {
            debug!(path = %tmp.display(), error = %e, "Could not remove temporary file");
        }

        info!(path = %target.display(), bytes = json.len(), "Stored payload");
        Ok(target)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, run_key: &str, name: &str) -> Result<T, StoreError> {
        let path = self.payload_path(run_key, name);
        let bytes = fs::read(&path).await.map_err(io_error(&path))?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path, source })
    }

    /// The lexically greatest run directory under the root.
    pub async fn latest_run_key(&self) -> Result<String, StoreError> {
        let mut entries = fs::read_dir(&self.root).await.map_err(io_error(&self.root))?;
        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&self.root))? {
            let is_dir = entry.file_type().await.map_err(io_error(&entry.path()))?.is_dir();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_dir && latest.as_ref().is_none_or(|l| name > *l) {
                latest = Some(name);
            }
        }
        debug!(?latest, root = %self.root.display(), "Resolved latest run");
        latest.ok_or_else(|| StoreError::Empty(self.root.clone()))
    }
}
