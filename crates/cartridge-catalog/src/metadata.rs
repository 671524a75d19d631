// SPDX-License-Identifier: AGPL-3.0-only
//! Descriptive metadata carried next to, or inside, a staged release.
//!
//! Two sources are understood:
//! - a leading comment header in a source file (`--title: Pong`), read by
//!   [`read_header_fields`];
//! - a JSON descriptor file, read by [`read_descriptor`].

use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{CatalogError, Result};

/// Lua line-comment marker.
pub const LUA_COMMENT: &str = "--";

/// Descriptive fields shared by every platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub title: String,
    pub author: String,
    pub desc: String,
    pub site: String,
    pub license: String,
}

impl Metadata {
    /// Pick the recognized keys out of a header mapping; everything else is ignored.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let get = |k: &str| fields.get(k).cloned().unwrap_or_default();
        Self {
            name: fields.get("name").cloned().filter(|v| !v.is_empty()),
            version: fields.get("version").cloned().filter(|v| !v.is_empty()),
            title: get("title"),
            author: get("author"),
            desc: get("desc"),
            site: get("site"),
            license: get("license"),
        }
    }
}

/// JSON descriptor (`<name>-<version>.metadata.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub name: String,
    pub title: String,
    pub author: String,
    pub desc: String,
    pub site: String,
    pub license: String,
}

impl From<Descriptor> for Metadata {
    fn from(d: Descriptor) -> Self {
        Metadata {
            name: Some(d.name).filter(|n| !n.is_empty()),
            version: None,
            title: d.title,
            author: d.author,
            desc: d.desc,
            site: d.site,
            license: d.license,
        }
    }
}

/// Scan the leading comment block of `reader`.
///
/// Each line starting with `marker` is split on its first colon; the key is
/// trimmed and lower-cased, the value trimmed. Lines without a colon are
/// skipped. Scanning stops at the first line that does not start with
/// `marker`, so code past the header is never decoded. Duplicate keys keep
/// the last value.
pub fn parse_header<R: BufRead>(reader: R, marker: &str) -> std::io::Result<HashMap<String, String>> {
    let mut fields = HashMap::new();
    for line in reader.split(b'\n') {
        let line = line?;
        let Some(rest) = line.strip_prefix(marker.as_bytes()) else {
            break;
        };
        let rest = String::from_utf8_lossy(rest);
        let Some((key, value)) = rest.trim_end_matches('\r').split_once(':') else {
            continue;
        };
        fields.insert(key.trim().to_lowercase(), value.trim().to_string());
    }
    Ok(fields)
}

pub fn read_header_fields(path: &Path, marker: &str) -> Result<HashMap<String, String>> {
    let file = File::open(path).map_err(|e| CatalogError::io(path, e))?;
    parse_header(BufReader::new(file), marker).map_err(|e| CatalogError::io(path, e))
}

pub fn read_descriptor(path: &Path) -> Result<Descriptor> {
    let bytes = std::fs::read(path).map_err(|e| CatalogError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Metadata {
        path: path.to_path_buf(),
        source,
    })
}
