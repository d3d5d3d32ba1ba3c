//! Error kinds raised while ingesting and storing discussion data.
//!
//! [`IngestError`] is the per-resource error every fetch, adapter and tree
//! build returns. Each variant carries the id of the resource (post id,
//! URL, page name) it failed on, so the pipeline can record it against the
//! right entry and keep going when the run is not strict.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Network or HTTP failure, including undecodable response bodies.
    #[error("request for {resource} failed: {source}")]
    Transport {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a shape the pagination contract forbids.
    #[error("protocol violation while fetching {resource}: {detail}")]
    ProtocolViolation { resource: String, detail: String },

    /// A marker or field the adapter relies on is missing.
    #[error("unexpected structure in {resource}: {detail}")]
    StructureMismatch { resource: String, detail: String },

    #[error("comment {comment} in {resource} references unknown parent {parent}")]
    UnresolvedParent {
        resource: String,
        comment: String,
        parent: String,
    },

    #[error("no source adapter handles {0}")]
    UnsupportedHandle(String),

    #[error("configuration setting `{0}` is required for this source")]
    MissingSetting(&'static str),
}

impl IngestError {
    pub fn transport(resource: impl Into<String>, source: reqwest::Error) -> Self {
        IngestError::Transport {
            resource: resource.into(),
            source,
        }
    }

    pub fn protocol(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        IngestError::ProtocolViolation {
            resource: resource.into(),
            detail: detail.into(),
        }
    }

    pub fn structure(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        IngestError::StructureMismatch {
            resource: resource.into(),
            detail: detail.into(),
        }
    }

    /// Id of the resource the failure belongs to, when there is one.
    pub fn resource(&self) -> Option<&str> {
        match self {
            IngestError::Transport { resource, .. }
            | IngestError::ProtocolViolation { resource, .. }
            | IngestError::StructureMismatch { resource, .. }
            | IngestError::UnresolvedParent { resource, .. } => Some(resource),
            IngestError::UnsupportedHandle(handle) => Some(handle),
            IngestError::MissingSetting(_) => None,
        }
    }

    /// Short label used in logs and in the failure listing.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Transport { .. } => "transport",
            IngestError::ProtocolViolation { .. } => "protocol_violation",
            IngestError::StructureMismatch { .. } => "structure_mismatch",
            IngestError::UnresolvedParent { .. } => "unresolved_parent",
            IngestError::UnsupportedHandle(_) => "unsupported_handle",
            IngestError::MissingSetting(_) => "missing_setting",
        }
    }

    /// HTTP status of a transport failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            IngestError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether this error ends the whole run even when failures are only
    /// being recorded.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::ProtocolViolation { .. }
                | IngestError::UnsupportedHandle(_)
                | IngestError::MissingSetting(_)
        )
    }
}

/// Failures of the on-disk snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode or decode {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload {0} already exists; runs are append-only")]
    AlreadyExists(PathBuf),

    #[error("no snapshot runs found under {0}")]
    Empty(PathBuf),
}

/// Why an ingestion run stopped before writing its snapshot.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures while loading the configuration file or URL lists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
