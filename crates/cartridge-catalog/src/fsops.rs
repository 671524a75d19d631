// SPDX-License-Identifier: AGPL-3.0-only
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::{CatalogError, Result};

/// Move `src` to `dst`, creating `dst`'s parent. Falls back to copy + delete
/// when a rename is refused (e.g. across filesystems).
pub async fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CatalogError::io(parent, e))?;
    }
    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if fs::metadata(src).await.is_err() {
                return Err(CatalogError::io(src, rename_err));
            }
            debug!(src = %src.display(), dst = %dst.display(), error = %rename_err, "rename failed; copying");
            fs::copy(src, dst).await.map_err(|e| CatalogError::io(dst, e))?;
            fs::remove_file(src).await.map_err(|e| CatalogError::io(src, e))?;
            Ok(())
        }
    }
}

/// Remove `dir` if present, then create it empty.
pub async fn reset_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(CatalogError::io(dir, e)),
    }
    fs::create_dir_all(dir)
        .await
        .map_err(|e| CatalogError::io(dir, e))
}
