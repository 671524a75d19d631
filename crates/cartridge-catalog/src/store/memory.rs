// SPDX-License-Identifier: AGPL-3.0-only
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ReleaseLedger, SoftwareCatalog};
use crate::error::{CatalogError, Result};
use crate::model::{Release, Software};

#[derive(Default)]
struct Tables {
    software: HashMap<String, Software>,
    releases: Vec<Release>,
}

/// In-process store behind a single lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn release_count(&self) -> usize {
        self.tables.read().await.releases.len()
    }
}

#[async_trait]
impl SoftwareCatalog for MemoryStore {
    async fn upsert_by_name(&self, software: &Software) -> Result<Software> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .software
            .entry(software.name.clone())
            .and_modify(|existing| existing.apply_descriptive(software))
            .or_insert_with(|| software.clone());
        Ok(stored.clone())
    }

    async fn get_by_name(&self, name: &str) -> Result<Software> {
        self.tables
            .read()
            .await
            .software
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("software {name}")))
    }

    async fn list(&self) -> Result<Vec<Software>> {
        let tables = self.tables.read().await;
        let mut all: Vec<_> = tables.software.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

fn same_key(a: &Release, software_id: Uuid, version: &str) -> bool {
    a.software_id == software_id && a.version == version
}

#[async_trait]
impl ReleaseLedger for MemoryStore {
    async fn create(&self, release: &Release) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .releases
            .iter()
            .any(|r| same_key(r, release.software_id, &release.version))
        {
            return Err(CatalogError::Conflict(format!(
                "release {} already exists for software {}",
                release.version, release.software_id
            )));
        }
        tables.releases.push(release.clone());
        Ok(())
    }

    async fn create_if_not_exists(&self, release: &Release) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .releases
            .iter()
            .any(|r| same_key(r, release.software_id, &release.version))
        {
            return Ok(false);
        }
        tables.releases.push(release.clone());
        Ok(true)
    }

    async fn find_latest_by_software_id(&self, software_id: Uuid) -> Result<Release> {
        self.tables
            .read()
            .await
            .releases
            .iter()
            .filter(|r| r.software_id == software_id)
            .max_by_key(|r| r.created_at)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("no releases for software {software_id}")))
    }

    async fn find_by_software_id_and_version(
        &self,
        software_id: Uuid,
        version: &str,
    ) -> Result<Release> {
        self.tables
            .read()
            .await
            .releases
            .iter()
            .find(|r| same_key(r, software_id, version))
            .cloned()
            .ok_or_else(|| {
                CatalogError::NotFound(format!("release {version} for software {software_id}"))
            })
    }

    async fn list_by_software_id(&self, software_id: Uuid) -> Result<Vec<Release>> {
        Ok(self
            .tables
            .read()
            .await
            .releases
            .iter()
            .filter(|r| r.software_id == software_id)
            .cloned()
            .collect())
    }
}
