// SPDX-License-Identifier: AGPL-3.0-only
//! Error type shared by every catalog operation.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used by callers that map errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Io,
    Conflict,
    Storage,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Software or release absent for a lookup.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or malformed trigger input or metadata field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A staged artifact the platform requires is not present.
    #[error("missing artifact {}", .0.display())]
    MissingArtifact(PathBuf),

    /// Archive entry would land outside the extraction directory.
    #[error("archive entry {entry:?} escapes {}", dest.display())]
    PathTraversal { entry: String, dest: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("metadata descriptor {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Blocking worker failed to complete (panicked or was cancelled).
    #[error("worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::NotFound(_) => ErrorKind::NotFound,
            CatalogError::Validation(_)
            | CatalogError::MissingArtifact(_)
            | CatalogError::Metadata { .. }
            | CatalogError::UnsupportedPlatform(_) => ErrorKind::Validation,
            CatalogError::PathTraversal { .. }
            | CatalogError::Io { .. }
            | CatalogError::Archive { .. }
            | CatalogError::Worker(_) => ErrorKind::Io,
            CatalogError::Conflict(_) => ErrorKind::Conflict,
            CatalogError::Database(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_path_traversal(&self) -> bool {
        matches!(self, CatalogError::PathTraversal { .. })
    }
}
