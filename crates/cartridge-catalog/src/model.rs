// SPDX-License-Identifier: AGPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::Metadata;

/// A catalogued program. `name` is the stable identifier; every other
/// descriptive field is refreshed on re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Software {
    pub id: Uuid,
    pub name: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "desc")]
    #[sqlx(rename = "description")]
    pub desc: String,
    pub site: String,
    pub license: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Software {
    pub fn new(name: impl Into<String>, platform: impl Into<String>, meta: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            title: meta.title,
            author: meta.author,
            desc: meta.desc,
            site: meta.site,
            license: meta.license,
            platform: platform.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy the mutable descriptive fields of `other` onto `self`.
    /// Identity (`id`, `name`, `created_at`) is left untouched.
    pub fn apply_descriptive(&mut self, other: &Software) {
        self.title = other.title.clone();
        self.author = other.author.clone();
        self.desc = other.desc.clone();
        self.site = other.site.clone();
        self.license = other.license.clone();
        self.platform = other.platform.clone();
        self.updated_at = Utc::now();
    }
}

/// One immutable build of a [`Software`]. Path fields are relative to the
/// content root; empty strings mean the artifact does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Release {
    pub id: Uuid,
    pub software_id: Uuid,
    pub version: String,
    pub cartridge_path: String,
    pub source_path: String,
    pub html_folder_path: String,
    pub docs_folder_path: Option<String>,
    pub web_playable: bool,
    pub created_at: DateTime<Utc>,
}

impl Release {
    pub fn new(software_id: Uuid, version: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            software_id,
            version: version.into(),
            cartridge_path: String::new(),
            source_path: String::new(),
            html_folder_path: String::new(),
            docs_folder_path: None,
            web_playable: false,
            created_at: Utc::now(),
        }
    }

    /// Rewrite every non-empty path under a public URL prefix.
    pub fn with_public_prefix(&self, prefix: &str) -> Release {
        let prefix = prefix.trim_end_matches('/');
        let rewrite = |p: &str| {
            if p.is_empty() {
                String::new()
            } else {
                format!("{prefix}/{}", p.trim_start_matches('/'))
            }
        };
        Release {
            cartridge_path: rewrite(&self.cartridge_path),
            source_path: rewrite(&self.source_path),
            html_folder_path: rewrite(&self.html_folder_path),
            docs_folder_path: self.docs_folder_path.as_deref().map(rewrite),
            ..self.clone()
        }
    }
}

/// Newest first; ties keep insertion order.
pub fn sort_newest_first(releases: &mut [Release]) {
    releases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[derive(Debug, Clone, Serialize)]
pub struct SoftwareWithReleases {
    #[serde(flatten)]
    pub software: Software,
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoftwareListing {
    #[serde(flatten)]
    pub software: Software,
    pub releases: Vec<Release>,
    pub latest_release: Option<Release>,
    pub web_playable_release: Option<Release>,
}

impl SoftwareListing {
    pub fn from_releases(software: Software, mut releases: Vec<Release>) -> Self {
        sort_newest_first(&mut releases);
        let latest_release = releases.first().cloned();
        let web_playable_release = releases.iter().find(|r| r.web_playable).cloned();
        Self {
            software,
            releases,
            latest_release,
            web_playable_release,
        }
    }

    pub fn with_public_prefix(&self, prefix: &str) -> SoftwareListing {
        SoftwareListing {
            software: self.software.clone(),
            releases: self
                .releases
                .iter()
                .map(|r| r.with_public_prefix(prefix))
                .collect(),
            latest_release: self
                .latest_release
                .as_ref()
                .map(|r| r.with_public_prefix(prefix)),
            web_playable_release: self
                .web_playable_release
                .as_ref()
                .map(|r| r.with_public_prefix(prefix)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn release_at(version: &str, offset_secs: i64, web: bool) -> Release {
        let mut r = Release::new(Uuid::new_v4(), version);
        r.created_at = Utc::now() + Duration::seconds(offset_secs);
        r.web_playable = web;
        r
    }

    #[test]
    fn public_prefix_rewrites_only_present_paths() {
        let mut r = Release::new(Uuid::new_v4(), "1.0");
        r.cartridge_path = "pong/1.0/pong-1.0.tic".into();
        r.html_folder_path = "pong/1.0/html".into();

        let public = r.with_public_prefix("/file/");
        assert_eq!(public.cartridge_path, "/file/pong/1.0/pong-1.0.tic");
        assert_eq!(public.html_folder_path, "/file/pong/1.0/html");
        assert_eq!(public.source_path, "");
        assert_eq!(public.docs_folder_path, None);
        assert_eq!(public.id, r.id);
    }

    #[test]
    fn listing_picks_latest_and_latest_web_playable() {
        let sw = Software::new("pong", "tic80", Metadata::default());
        let releases = vec![
            release_at("1.0", 0, true),
            release_at("1.2", 20, false),
            release_at("1.1", 10, true),
        ];
        let listing = SoftwareListing::from_releases(sw, releases);

        let versions: Vec<_> = listing.releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1.2", "1.1", "1.0"]);
        assert_eq!(listing.latest_release.unwrap().version, "1.2");
        assert_eq!(listing.web_playable_release.unwrap().version, "1.1");
    }

    #[test]
    fn listing_without_releases() {
        let sw = Software::new("pong", "tic80", Metadata::default());
        let listing = SoftwareListing::from_releases(sw, vec![]);
        assert!(listing.latest_release.is_none());
        assert!(listing.web_playable_release.is_none());
    }

    #[test]
    fn apply_descriptive_keeps_identity() {
        let mut existing = Software::new(
            "pong",
            "tic80",
            Metadata {
                title: "Old".into(),
                ..Metadata::default()
            },
        );
        let id = existing.id;
        let incoming = Software::new(
            "pong",
            "tic80",
            Metadata {
                title: "New".into(),
                author: "someone".into(),
                ..Metadata::default()
            },
        );
        existing.apply_descriptive(&incoming);
        assert_eq!(existing.id, id);
        assert_eq!(existing.title, "New");
        assert_eq!(existing.author, "someone");
    }
}
