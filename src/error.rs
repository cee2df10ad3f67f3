use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Failures of a field completer call. None of these abort an upload; the
/// pipeline falls back to the heuristic partial.
#[derive(Debug, Error)]
pub enum CompleterError {
    #[error("completer did not answer within {0:?}")]
    Timeout(Duration),
    #[error("failed to start completer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("completer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("completer returned malformed output: {0}")]
    Malformed(String),
    #[error("completer worker stopped before replying")]
    Disconnected,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failure at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("stored document at {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("identifier '{0}' cannot be used as a storage key")]
    InvalidKey(String),
}
