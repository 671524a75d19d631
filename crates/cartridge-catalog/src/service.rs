// SPDX-License-Identifier: AGPL-3.0-only
//! Read side of the catalog, shaped for listing and download handlers.

use std::sync::Arc;

use crate::error::{CatalogError, Result};
use crate::model::{Release, SoftwareListing, SoftwareWithReleases, sort_newest_first};
use crate::store::{ReleaseLedger, SoftwareCatalog};

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn SoftwareCatalog>,
    ledger: Arc<dyn ReleaseLedger>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn SoftwareCatalog>, ledger: Arc<dyn ReleaseLedger>) -> Self {
        Self { catalog, ledger }
    }

    /// Every software with its releases, newest first.
    pub async fn list_detailed(&self) -> Result<Vec<SoftwareListing>> {
        let mut listings = Vec::new();
        for software in self.catalog.list().await? {
            let releases = self.ledger.list_by_software_id(software.id).await?;
            listings.push(SoftwareListing::from_releases(software, releases));
        }
        Ok(listings)
    }

    pub async fn software_with_releases(&self, name: &str) -> Result<SoftwareWithReleases> {
        let software = self.catalog.get_by_name(name).await?;
        let mut releases = self.ledger.list_by_software_id(software.id).await?;
        sort_newest_first(&mut releases);
        Ok(SoftwareWithReleases { software, releases })
    }

    pub async fn latest_release(&self, name: &str) -> Result<Release> {
        let software = self.catalog.get_by_name(name).await?;
        self.ledger
            .find_latest_by_software_id(software.id)
            .await
            .map_err(|e| match e {
                CatalogError::NotFound(_) => {
                    CatalogError::NotFound(format!("no releases found for software {name}"))
                }
                other => other,
            })
    }

    pub async fn release(&self, name: &str, version: &str) -> Result<Release> {
        let software = self.catalog.get_by_name(name).await?;
        self.ledger
            .find_by_software_id_and_version(software.id, version)
            .await
            .map_err(|e| match e {
                CatalogError::NotFound(_) => {
                    CatalogError::NotFound(format!("release {version} not found for software {name}"))
                }
                other => other,
            })
    }
}
