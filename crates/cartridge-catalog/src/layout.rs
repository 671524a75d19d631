// SPDX-License-Identifier: AGPL-3.0-only
//! Canonical on-disk locations of staged and published release artifacts.
//!
//! Ingestion writes to these paths and the serving side reads from them, so
//! everything here is a pure function of its inputs.

use std::path::{Component, Path, PathBuf};

use crate::error::{CatalogError, Result};

/// Join `relative` onto `root` after lexical normalization, returning `None`
/// if the result would leave `root` (absolute paths, drive prefixes, or `..`
/// segments climbing above it).
pub fn join_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let mut joined = root.to_path_buf();
    joined.extend(parts);
    Some(joined)
}

/// A name or version usable as exactly one path segment.
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

/// Locations for one `(name, version)` under the content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePaths {
    pub name: String,
    pub version: String,
    pub version_dir: PathBuf,
    pub html_root: PathBuf,
    pub docs_root: PathBuf,
}

impl ReleasePaths {
    /// `<name>-<version>`, the stem shared by every artifact file name.
    pub fn versioned_name(&self) -> String {
        versioned_name(&self.name, &self.version)
    }

    pub fn cartridge(&self, ext: &str) -> PathBuf {
        self.version_dir.join(format!("{}.{ext}", self.versioned_name()))
    }

    pub fn source(&self, ext: &str) -> PathBuf {
        self.version_dir.join(format!("{}.{ext}", self.versioned_name()))
    }
}

pub fn versioned_name(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    content_root: PathBuf,
    staging_root: PathBuf,
}

impl PathLayout {
    pub fn new(content_root: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            staging_root: staging_root.into(),
        }
    }

    /// Staging and content share one directory, as in a single drop folder.
    pub fn single_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::new(root.clone(), root)
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn software_dir(&self, name: &str) -> PathBuf {
        self.content_root.join(name)
    }

    pub fn paths(&self, name: &str, version: &str) -> ReleasePaths {
        let version_dir = self.software_dir(name).join(version);
        ReleasePaths {
            name: name.to_string(),
            version: version.to_string(),
            html_root: version_dir.join("html"),
            docs_root: version_dir.join("docs"),
            version_dir,
        }
    }

    /// `<staging>/<name>-<version><suffix>`; `suffix` includes its leading dot.
    pub fn staged(&self, name: &str, version: &str, suffix: &str) -> PathBuf {
        self.staging_root
            .join(format!("{}{suffix}", versioned_name(name, version)))
    }

    /// Content-root-relative form of `path`, with `/` separators.
    pub fn relative(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.content_root).map_err(|_| {
            CatalogError::Validation(format!(
                "{} is outside content root {}",
                path.display(),
                self.content_root.display()
            ))
        })?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    /// Inverse of [`PathLayout::relative`]; refuses anything escaping the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        join_within(&self.content_root, relative).ok_or_else(|| CatalogError::PathTraversal {
            entry: relative.to_string(),
            dest: self.content_root.clone(),
        })
    }
}
