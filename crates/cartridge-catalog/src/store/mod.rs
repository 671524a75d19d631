// SPDX-License-Identifier: AGPL-3.0-only
//! Persistence seams for software and release records.
//!
//! Two backends implement both traits:
//! - [`MemoryStore`] for tests and throwaway local runs
//! - [`PgStore`] for Postgres via sqlx

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Release, Software};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Software records keyed by their unique name.
#[async_trait]
pub trait SoftwareCatalog: Send + Sync {
    /// Insert `software`, or refresh the descriptive fields of the existing
    /// row with the same name. Returns the stored row, whose `id` is the
    /// existing identity when one was found.
    ///
    /// Concurrent upserts of one name are not serialized here.
    async fn upsert_by_name(&self, software: &Software) -> Result<Software>;

    async fn get_by_name(&self, name: &str) -> Result<Software>;

    async fn list(&self) -> Result<Vec<Software>>;
}

/// Append-only release records.
#[async_trait]
pub trait ReleaseLedger: Send + Sync {
    /// Insert `release`. A second release for the same
    /// `(software_id, version)` fails with `Conflict`.
    async fn create(&self, release: &Release) -> Result<()>;

    /// Insert unless `(software_id, version)` already exists. Returns whether
    /// a row was written.
    async fn create_if_not_exists(&self, release: &Release) -> Result<bool>;

    async fn find_latest_by_software_id(&self, software_id: Uuid) -> Result<Release>;

    async fn find_by_software_id_and_version(
        &self,
        software_id: Uuid,
        version: &str,
    ) -> Result<Release>;

    /// Unordered.
    async fn list_by_software_id(&self, software_id: Uuid) -> Result<Vec<Release>>;
}
