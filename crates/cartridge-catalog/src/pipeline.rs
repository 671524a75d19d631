// SPDX-License-Identifier: AGPL-3.0-only
//! Release ingestion: staged artifacts in, catalogued release out.
//!
//! The steps run in a fixed order and the first failure aborts the rest.
//! Nothing is rolled back: a failure after the artifacts were moved leaves
//! them in place without a release row, and a failure while recording the
//! release leaves the refreshed software row behind.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveExtractor, ExtractSummary};
use crate::error::{CatalogError, Result};
use crate::fsops;
use crate::layout::{PathLayout, is_safe_segment};
use crate::metadata::Metadata;
use crate::model::{Release, Software};
use crate::platform::Platform;
use crate::store::{ReleaseLedger, SoftwareCatalog};

/// What to do when `(software, version)` was already ingested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep the existing release and report success.
    #[default]
    Skip,
    /// Fail with a conflict.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(DuplicatePolicy::Skip),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(format!("unknown duplicate policy {other:?} (expected skip or reject)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub platform: Platform,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub software: Software,
    pub release: Release,
    /// False when an identical `(software, version)` already existed and the
    /// skip policy absorbed it.
    pub created: bool,
}

pub struct UpdatePipeline {
    layout: PathLayout,
    catalog: Arc<dyn SoftwareCatalog>,
    ledger: Arc<dyn ReleaseLedger>,
    extractor: Arc<dyn ArchiveExtractor>,
    duplicates: DuplicatePolicy,
}

impl UpdatePipeline {
    pub fn new(
        layout: PathLayout,
        catalog: Arc<dyn SoftwareCatalog>,
        ledger: Arc<dyn ReleaseLedger>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            layout,
            catalog,
            ledger,
            extractor,
            duplicates: DuplicatePolicy::default(),
        }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    #[tracing::instrument(skip(self, request), fields(platform = %request.platform, name = %request.name, version = %request.version))]
    pub async fn ingest(&self, request: &UpdateRequest) -> Result<IngestOutcome> {
        let UpdateRequest {
            platform,
            name,
            version,
        } = request;
        let platform = *platform;
        validate_segment("name", name, MAX_NAME_LEN)?;
        validate_segment("version", version, MAX_VERSION_LEN)?;

        let paths = self.layout.paths(name, version);
        let staged = match platform.locate_artifacts(&self.layout, name, version) {
            Ok(staged) => staged,
            Err(e @ CatalogError::MissingArtifact(_)) => {
                // A repeated delivery finds staging already drained.
                if self.duplicates == DuplicatePolicy::Skip {
                    if let Some(outcome) = self.already_recorded(name, version).await? {
                        info!("release already recorded; staging empty");
                        return Ok(outcome);
                    }
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        debug!(?staged, "located staged artifacts");

        let web_playable = match &staged.web_bundle {
            Some(bundle) => {
                let summary = self.unpack(bundle, &paths.html_root).await?;
                info!(files = summary.files, "extracted web bundle");
                true
            }
            None => false,
        };
        let docs = match &staged.docs_bundle {
            Some(bundle) => {
                let summary = self.unpack(bundle, &paths.docs_root).await?;
                info!(files = summary.files, "extracted docs bundle");
                true
            }
            None => false,
        };

        let metadata = platform.extract_metadata(&staged)?;
        check_hints(&metadata, name, version)?;

        let software = self
            .catalog
            .upsert_by_name(&Software::new(name.as_str(), platform.tag(), metadata))
            .await?;

        let mut release = Release::new(software.id, version.as_str());
        if let Some(cartridge) = &staged.cartridge {
            let dest = paths.cartridge(cartridge.ext);
            fsops::move_file(&cartridge.path, &dest).await?;
            release.cartridge_path = self.layout.relative(&dest)?;
        }
        if let Some(source) = &staged.source {
            let dest = paths.source(source.ext);
            fsops::move_file(&source.path, &dest).await?;
            release.source_path = self.layout.relative(&dest)?;
        }
        if web_playable {
            release.html_folder_path = self.layout.relative(&paths.html_root)?;
            release.web_playable = true;
        }
        if docs {
            release.docs_folder_path = Some(self.layout.relative(&paths.docs_root)?);
        }

        let created = match self.duplicates {
            DuplicatePolicy::Skip => self.ledger.create_if_not_exists(&release).await?,
            DuplicatePolicy::Reject => {
                self.ledger.create(&release).await?;
                true
            }
        };
        if created {
            info!(release = %release.id, web_playable, "release recorded");
        } else {
            info!("release already recorded; skipped");
            release = self
                .ledger
                .find_by_software_id_and_version(software.id, version)
                .await?;
        }

        Ok(IngestOutcome {
            software,
            release,
            created,
        })
    }

    async fn already_recorded(&self, name: &str, version: &str) -> Result<Option<IngestOutcome>> {
        let software = match self.catalog.get_by_name(name).await {
            Ok(software) => software,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        match self
            .ledger
            .find_by_software_id_and_version(software.id, version)
            .await
        {
            Ok(release) => Ok(Some(IngestOutcome {
                software,
                release,
                created: false,
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Recreate `dest` and unpack `bundle` into it on the blocking pool.
    async fn unpack(&self, bundle: &Path, dest: &Path) -> Result<ExtractSummary> {
        fsops::reset_dir(dest).await?;
        let extractor = Arc::clone(&self.extractor);
        let (bundle, dest) = (bundle.to_path_buf(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || extractor.extract(&bundle, &dest))
            .await
            .map_err(|e| CatalogError::Worker(e.to_string()))?
    }
}

/// Longest accepted name; matches the `software.name` column.
pub const MAX_NAME_LEN: usize = 128;
/// Longest accepted version; matches the `releases.version` column.
pub const MAX_VERSION_LEN: usize = 64;

fn validate_segment(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CatalogError::Validation(format!("{field} is required")));
    }
    if value.len() > max_len {
        return Err(CatalogError::Validation(format!(
            "{field} is {} bytes long; the limit is {max_len}",
            value.len()
        )));
    }
    if !is_safe_segment(value) {
        return Err(CatalogError::Validation(format!(
            "{field} {value:?} is not a valid path segment"
        )));
    }
    Ok(())
}

/// An embedded name must agree with the trigger; a differing version is only logged.
fn check_hints(metadata: &Metadata, name: &str, version: &str) -> Result<()> {
    if let Some(meta_name) = metadata.name.as_deref() {
        if meta_name != name {
            return Err(CatalogError::Validation(format!(
                "metadata names {meta_name:?} but update was for {name:?}"
            )));
        }
    }
    if let Some(meta_version) = metadata.version.as_deref() {
        if meta_version != version {
            warn!(
                declared = meta_version,
                version, "metadata version differs from update; keeping update version"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZipExtractor;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::{TempDir, tempdir};
    use zip::write::SimpleFileOptions;

    struct Fixture {
        dir: TempDir,
        store: Arc<MemoryStore>,
        pipeline: UpdatePipeline,
    }

    fn fixture(policy: DuplicatePolicy) -> Fixture {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path().join("content"), dir.path().join("staging"));
        fs::create_dir_all(layout.staging_root()).unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = UpdatePipeline::new(
            layout,
            store.clone(),
            store.clone(),
            Arc::new(ZipExtractor),
        )
        .with_duplicate_policy(policy);
        Fixture {
            dir,
            store,
            pipeline,
        }
    }

    impl Fixture {
        fn staging(&self) -> std::path::PathBuf {
            self.dir.path().join("staging")
        }

        fn content(&self) -> std::path::PathBuf {
            self.dir.path().join("content")
        }

        fn stage(&self, file: &str, body: &str) {
            fs::write(self.staging().join(file), body).unwrap();
        }

        fn stage_zip(&self, file: &str, entries: &[(&str, &str)]) {
            let mut zw = zip::ZipWriter::new(File::create(self.staging().join(file)).unwrap());
            for (name, body) in entries {
                zw.start_file(*name, SimpleFileOptions::default()).unwrap();
                zw.write_all(body.as_bytes()).unwrap();
            }
            zw.finish().unwrap();
        }

        fn stage_tic80(&self, name: &str, version: &str, title: &str) {
            self.stage(&format!("{name}-{version}.tic"), "cartridge-bytes");
            self.stage(
                &format!("{name}-{version}.lua"),
                &format!("-- title: {title}\n-- author: Ann\nfunction TIC() end\n"),
            );
        }
    }

    fn request(platform: Platform, name: &str, version: &str) -> UpdateRequest {
        UpdateRequest {
            platform,
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    #[tokio::test]
    async fn tic80_ingest_moves_artifacts_and_records_release() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage_tic80("pong", "1.0", "Pong");

        let outcome = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.software.name, "pong");
        assert_eq!(outcome.software.title, "Pong");
        assert_eq!(outcome.software.platform, "tic80");
        assert_eq!(outcome.release.cartridge_path, "pong/1.0/pong-1.0.tic");
        assert_eq!(outcome.release.source_path, "pong/1.0/pong-1.0.lua");
        assert!(!outcome.release.web_playable);
        assert_eq!(outcome.release.html_folder_path, "");

        assert!(fx.content().join("pong/1.0/pong-1.0.tic").is_file());
        assert!(fx.content().join("pong/1.0/pong-1.0.lua").is_file());
        assert!(!fx.staging().join("pong-1.0.tic").exists());
    }

    #[tokio::test]
    async fn web_bundle_makes_release_playable() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage_tic80("pong", "1.0", "Pong");
        fx.stage_zip("pong-1.0.html.zip", &[("index.html", "<html/>")]);
        fx.stage_zip("pong-1.0.docs.zip", &[("README.md", "# Pong")]);

        let outcome = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        assert!(outcome.release.web_playable);
        assert_eq!(outcome.release.html_folder_path, "pong/1.0/html");
        assert_eq!(outcome.release.docs_folder_path.as_deref(), Some("pong/1.0/docs"));
        assert!(fx.content().join("pong/1.0/html/index.html").is_file());
        assert!(fx.content().join("pong/1.0/docs/README.md").is_file());
    }

    #[tokio::test]
    async fn stale_extraction_directory_is_replaced() {
        let fx = fixture(DuplicatePolicy::Skip);
        let stale = fx.content().join("pong/1.0/html/stale.js");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        fx.stage_tic80("pong", "1.0", "Pong");
        fx.stage_zip("pong-1.0.html.zip", &[("index.html", "<html/>")]);
        fx.pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        assert!(!stale.exists());
        assert!(fx.content().join("pong/1.0/html/index.html").is_file());
    }

    #[tokio::test]
    async fn repeated_ingest_leaves_one_release() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage_tic80("pong", "1.0", "Pong");
        let first = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        fx.stage_tic80("pong", "1.0", "Pong");
        let second = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.release.id, first.release.id);
        assert_eq!(fx.store.release_count().await, 1);
    }

    #[tokio::test]
    async fn reject_policy_turns_duplicate_into_conflict() {
        let fx = fixture(DuplicatePolicy::Reject);
        fx.stage_tic80("pong", "1.0", "Pong");
        fx.pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        fx.stage_tic80("pong", "1.0", "Pong");
        let err = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fx.store.release_count().await, 1);
    }

    #[tokio::test]
    async fn new_version_updates_software_in_place() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage_tic80("pong", "1.0", "Pong");
        let v1 = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        fx.stage_tic80("pong", "1.1", "Pong II");
        let v2 = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.1"))
            .await
            .unwrap();

        assert_eq!(v1.software.id, v2.software.id);
        assert_eq!(v2.software.title, "Pong II");
        assert_eq!(fx.store.release_count().await, 2);
    }

    #[tokio::test]
    async fn descriptor_platform_ingest() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage(
            "runner-2.0.metadata.json",
            r#"{"name":"runner","title":"Runner","author":"Bo","desc":"go","site":"https://x","license":"MIT"}"#,
        );
        fx.stage_zip("runner-2.0.html.zip", &[("index.html", "<html/>"), ("main.wasm", "wasm")]);

        let outcome = fx
            .pipeline
            .ingest(&request(Platform::Ebitengine, "runner", "2.0"))
            .await
            .unwrap();

        assert_eq!(outcome.software.platform, "ebitengine");
        assert_eq!(outcome.software.license, "MIT");
        assert_eq!(outcome.release.cartridge_path, "");
        assert!(outcome.release.web_playable);
        assert!(fx.content().join("runner/2.0/html/main.wasm").is_file());
    }

    #[tokio::test]
    async fn descriptor_name_mismatch_is_validation() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage("runner-2.0.metadata.json", r#"{"name":"walker","title":"Walker"}"#);
        fx.stage_zip("runner-2.0.html.zip", &[("index.html", "<html/>")]);

        let err = fx
            .pipeline
            .ingest(&request(Platform::Love, "runner", "2.0"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(fx.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malicious_bundle_aborts_before_catalog_write() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage_tic80("pong", "1.0", "Pong");
        fx.stage_zip("pong-1.0.html.zip", &[("../../../escape.txt", "x")]);

        let err = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap_err();
        assert!(err.is_path_traversal());
        assert!(fx.store.list().await.unwrap().is_empty());
        assert!(fx.staging().join("pong-1.0.tic").exists());
    }

    #[tokio::test]
    async fn invalid_trigger_fields() {
        let fx = fixture(DuplicatePolicy::Skip);
        for (name, version) in [("pong", ""), ("", "1.0"), ("../etc", "1.0"), ("pong", "1/2")] {
            let err = fx
                .pipeline
                .ingest(&request(Platform::Tic80, name, version))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{name:?} {version:?}");
        }
    }

    #[tokio::test]
    async fn header_version_mismatch_keeps_trigger_version() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage("pong-1.0.tic", "cart");
        fx.stage("pong-1.0.lua", "-- title: Pong\n-- version: 0.1\n");

        let outcome = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();
        assert_eq!(outcome.release.version, "1.0");
        assert_eq!(outcome.release.cartridge_path, "pong/1.0/pong-1.0.tic");
    }

    #[tokio::test]
    async fn redelivery_after_staging_drained_is_a_no_op() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage_tic80("pong", "1.0", "Pong");
        let first = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        let second = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        assert!(!second.created);
        assert_eq!(second.release.id, first.release.id);
        assert_eq!(second.software.id, first.software.id);
        assert_eq!(fx.store.release_count().await, 1);
    }

    #[tokio::test]
    async fn drained_staging_without_release_is_missing_artifact() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage_tic80("pong", "1.0", "Pong");
        fx.pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        let err = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::MissingArtifact(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn reject_policy_redelivery_stays_missing_artifact() {
        let fx = fixture(DuplicatePolicy::Reject);
        fx.stage_tic80("pong", "1.0", "Pong");
        fx.pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap();

        let err = fx
            .pipeline
            .ingest(&request(Platform::Tic80, "pong", "1.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::MissingArtifact(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn love_ingest_moves_package() {
        let fx = fixture(DuplicatePolicy::Skip);
        fx.stage("rogue-0.3.love", "love-package");
        fx.stage(
            "rogue-0.3.metadata.json",
            r#"{"name":"rogue","title":"Rogue","author":"Cy"}"#,
        );

        let outcome = fx
            .pipeline
            .ingest(&request(Platform::Love, "rogue", "0.3"))
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.software.platform, "love");
        assert_eq!(outcome.software.title, "Rogue");
        assert_eq!(outcome.release.cartridge_path, "rogue/0.3/rogue-0.3.love");
        assert_eq!(outcome.release.source_path, "");
        assert!(!outcome.release.web_playable);
        assert_eq!(
            fs::read_to_string(fx.content().join("rogue/0.3/rogue-0.3.love")).unwrap(),
            "love-package"
        );
        assert!(!fx.staging().join("rogue-0.3.love").exists());
    }

    #[tokio::test]
    async fn overlong_name_or_version_is_validation() {
        let fx = fixture(DuplicatePolicy::Skip);
        let long_name = "p".repeat(MAX_NAME_LEN + 1);
        let long_version = "1".repeat(MAX_VERSION_LEN + 1);
        fx.stage_tic80(&long_name, "1.0", "Pong");

        for (name, version) in [(long_name.as_str(), "1.0"), ("pong", long_version.as_str())] {
            let err = fx
                .pipeline
                .ingest(&request(Platform::Tic80, name, version))
                .await
                .unwrap_err();
            assert!(matches!(err, CatalogError::Validation(_)), "got {err:?}");
        }
        assert!(fx.staging().join(format!("{long_name}-1.0.tic")).exists());
        assert!(fx.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn longest_accepted_name_and_version_ingest() {
        let fx = fixture(DuplicatePolicy::Skip);
        let name = "p".repeat(MAX_NAME_LEN);
        let version = "1".repeat(MAX_VERSION_LEN);
        fx.stage_tic80(&name, &version, "Pong");

        let outcome = fx
            .pipeline
            .ingest(&request(Platform::Tic80, &name, &version))
            .await
            .unwrap();
        assert!(outcome.release.cartridge_path.len() > 255);
    }

    #[test]
    fn duplicate_policy_parse() {
        assert_eq!("skip".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Skip);
        assert_eq!("Reject".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert!("maybe".parse::<DuplicatePolicy>().is_err());
    }
}
