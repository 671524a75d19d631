// SPDX-License-Identifier: AGPL-3.0-only
//! Zip extraction for browser bundles and documentation trees.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{CatalogError, Result};
use crate::layout::join_within;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
}

/// Extracts an archive into a destination directory.
///
/// Implementations must refuse entries that resolve outside `dest`.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractSummary>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

struct PlannedEntry {
    target: PathBuf,
    is_dir: bool,
    mode: Option<u32>,
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractSummary> {
        let file = File::open(archive).map_err(|e| CatalogError::io(archive, e))?;
        let zip_err = |source| CatalogError::Archive {
            path: archive.to_path_buf(),
            source,
        };
        let mut zip = ZipArchive::new(file).map_err(zip_err)?;

        // Every name is checked before the first write.
        let mut plan = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip.by_index_raw(i).map_err(zip_err)?;
            let target = join_within(dest, entry.name()).ok_or_else(|| CatalogError::PathTraversal {
                entry: entry.name().to_string(),
                dest: dest.to_path_buf(),
            })?;
            plan.push(PlannedEntry {
                target,
                is_dir: entry.is_dir(),
                mode: entry.unix_mode(),
            });
        }

        fs::create_dir_all(dest).map_err(|e| CatalogError::io(dest, e))?;

        let mut summary = ExtractSummary::default();
        for (i, planned) in plan.into_iter().enumerate() {
            if planned.is_dir {
                fs::create_dir_all(&planned.target)
                    .map_err(|e| CatalogError::io(&planned.target, e))?;
                summary.directories += 1;
                continue;
            }
            if let Some(parent) = planned.target.parent() {
                fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
            }

            let mut entry = zip.by_index(i).map_err(zip_err)?;
            let mut out = open_output(&planned.target, planned.mode)
                .map_err(|e| CatalogError::io(&planned.target, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| CatalogError::io(&planned.target, e))?;
            summary.files += 1;
            debug!(path = %planned.target.display(), "extracted");
        }

        Ok(summary)
    }
}

fn open_output(path: &Path, mode: Option<u32>) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode.map(|m| m & 0o7777).unwrap_or(0o644));
    }
    #[cfg(not(unix))]
    let _ = mode;
    opts.open(path)
}
