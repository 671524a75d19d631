// SPDX-License-Identifier: AGPL-3.0-only
//! Per-platform staging conventions and metadata sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CatalogError, Result};
use crate::layout::PathLayout;
use crate::metadata::{self, LUA_COMMENT, Metadata};

pub const WEB_BUNDLE_SUFFIX: &str = ".html.zip";
pub const DOCS_BUNDLE_SUFFIX: &str = ".docs.zip";
pub const DESCRIPTOR_SUFFIX: &str = ".metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// TIC-80 fantasy console: `.tic` cartridge plus `.lua` source whose
    /// comment header carries the metadata.
    Tic80,
    /// LÖVE: optional `.love` package, JSON descriptor.
    Love,
    /// Ebitengine: browser bundle only, JSON descriptor.
    Ebitengine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataSource {
    Header { marker: &'static str },
    Descriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub ext: &'static str,
}

/// What was found in the staging directory for one `(name, version)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedArtifacts {
    pub cartridge: Option<StagedFile>,
    pub source: Option<StagedFile>,
    pub web_bundle: Option<PathBuf>,
    pub docs_bundle: Option<PathBuf>,
    pub descriptor: Option<PathBuf>,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Tic80, Platform::Love, Platform::Ebitengine];

    pub fn tag(self) -> &'static str {
        match self {
            Platform::Tic80 => "tic80",
            Platform::Love => "love",
            Platform::Ebitengine => "ebitengine",
        }
    }

    pub fn cartridge_ext(self) -> Option<&'static str> {
        match self {
            Platform::Tic80 => Some("tic"),
            Platform::Love => Some("love"),
            Platform::Ebitengine => None,
        }
    }

    pub fn source_ext(self) -> Option<&'static str> {
        match self {
            Platform::Tic80 => Some("lua"),
            Platform::Love | Platform::Ebitengine => None,
        }
    }

    fn metadata_source(self) -> MetadataSource {
        match self {
            Platform::Tic80 => MetadataSource::Header {
                marker: LUA_COMMENT,
            },
            Platform::Love | Platform::Ebitengine => MetadataSource::Descriptor,
        }
    }

    fn cartridge_required(self) -> bool {
        matches!(self, Platform::Tic80)
    }

    /// Find the staged files for `(name, version)`, failing when one the
    /// platform cannot do without is absent.
    pub fn locate_artifacts(
        self,
        layout: &PathLayout,
        name: &str,
        version: &str,
    ) -> Result<StagedArtifacts> {
        let staged = |suffix: &str| layout.staged(name, version, suffix);
        let existing = |path: PathBuf| path.is_file().then_some(path);

        let cartridge = self.cartridge_ext().and_then(|ext| {
            existing(staged(&format!(".{ext}"))).map(|path| StagedFile { path, ext })
        });
        let source = self.source_ext().and_then(|ext| {
            existing(staged(&format!(".{ext}"))).map(|path| StagedFile { path, ext })
        });
        let web_bundle = existing(staged(WEB_BUNDLE_SUFFIX));
        let docs_bundle = existing(staged(DOCS_BUNDLE_SUFFIX));
        let descriptor = existing(staged(DESCRIPTOR_SUFFIX));

        if self.cartridge_required() && cartridge.is_none() {
            let ext = self.cartridge_ext().unwrap_or_default();
            return Err(CatalogError::MissingArtifact(staged(&format!(".{ext}"))));
        }
        match self.metadata_source() {
            MetadataSource::Header { .. } => {
                if source.is_none() {
                    let ext = self.source_ext().unwrap_or_default();
                    return Err(CatalogError::MissingArtifact(staged(&format!(".{ext}"))));
                }
            }
            MetadataSource::Descriptor => {
                if descriptor.is_none() {
                    return Err(CatalogError::MissingArtifact(staged(DESCRIPTOR_SUFFIX)));
                }
                if cartridge.is_none() && web_bundle.is_none() {
                    return Err(CatalogError::MissingArtifact(staged(WEB_BUNDLE_SUFFIX)));
                }
            }
        }

        Ok(StagedArtifacts {
            cartridge,
            source,
            web_bundle,
            docs_bundle,
            descriptor,
        })
    }

    pub fn extract_metadata(self, staged: &StagedArtifacts) -> Result<Metadata> {
        match self.metadata_source() {
            MetadataSource::Header { marker } => {
                let source = required(staged.source.as_ref().map(|s| s.path.as_path()), "source")?;
                let fields = metadata::read_header_fields(source, marker)?;
                Ok(Metadata::from_fields(&fields))
            }
            MetadataSource::Descriptor => {
                let descriptor = required(staged.descriptor.as_deref(), "descriptor")?;
                Ok(metadata::read_descriptor(descriptor)?.into())
            }
        }
    }
}

fn required<'a>(path: Option<&'a Path>, what: &str) -> Result<&'a Path> {
    path.ok_or_else(|| CatalogError::Validation(format!("no staged {what} located")))
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Platform {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Platform::ALL
            .into_iter()
            .find(|p| p.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::UnsupportedPlatform(s.to_string()))
    }
}
