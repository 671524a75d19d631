// SPDX-License-Identifier: AGPL-3.0-only
use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use super::{ReleaseLedger, SoftwareCatalog};
use crate::error::{CatalogError, Result};
use crate::model::{Release, Software};

// `name` and `version` widths bound the trigger (see `pipeline::MAX_NAME_LEN`).
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS software (
  id UUID PRIMARY KEY,
  name VARCHAR(128) NOT NULL UNIQUE,
  title TEXT NOT NULL DEFAULT '',
  author TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  site TEXT NOT NULL DEFAULT '',
  license TEXT NOT NULL DEFAULT '',
  platform TEXT NOT NULL DEFAULT '',
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS releases (
  id UUID PRIMARY KEY,
  software_id UUID NOT NULL REFERENCES software (id),
  version VARCHAR(64) NOT NULL,
  cartridge_path TEXT NOT NULL DEFAULT '',
  source_path TEXT NOT NULL DEFAULT '',
  html_folder_path TEXT NOT NULL DEFAULT '',
  docs_folder_path TEXT,
  web_playable BOOLEAN NOT NULL DEFAULT FALSE,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  UNIQUE (software_id, version)
);

CREATE INDEX IF NOT EXISTS releases_software_created_idx
  ON releases (software_id, created_at DESC);
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SoftwareCatalog for PgStore {
    async fn upsert_by_name(&self, software: &Software) -> Result<Software> {
        let stored = sqlx::query_as::<_, Software>(
            r#"
            INSERT INTO software
              (id, name, title, author, description, site, license, platform, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            ON CONFLICT (name)
            DO UPDATE SET title = EXCLUDED.title,
                          author = EXCLUDED.author,
                          description = EXCLUDED.description,
                          site = EXCLUDED.site,
                          license = EXCLUDED.license,
                          platform = EXCLUDED.platform,
                          updated_at = now()
            RETURNING id, name, title, author, description, site, license, platform,
                      created_at, updated_at
            "#,
        )
        .bind(software.id)
        .bind(&software.name)
        .bind(&software.title)
        .bind(&software.author)
        .bind(&software.desc)
        .bind(&software.site)
        .bind(&software.license)
        .bind(&software.platform)
        .bind(software.created_at)
        .bind(software.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn get_by_name(&self, name: &str) -> Result<Software> {
        sqlx::query_as::<_, Software>(
            r#"
            SELECT id, name, title, author, description, site, license, platform,
                   created_at, updated_at
            FROM software WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CatalogError::NotFound(format!("software {name}")))
    }

    async fn list(&self) -> Result<Vec<Software>> {
        let rows = sqlx::query_as::<_, Software>(
            r#"
            SELECT id, name, title, author, description, site, license, platform,
                   created_at, updated_at
            FROM software ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ReleaseLedger for PgStore {
    async fn create(&self, release: &Release) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO releases
              (id, software_id, version, cartridge_path, source_path, html_folder_path,
               docs_folder_path, web_playable, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(release.id)
        .bind(release.software_id)
        .bind(&release.version)
        .bind(&release.cartridge_path)
        .bind(&release.source_path)
        .bind(&release.html_folder_path)
        .bind(&release.docs_folder_path)
        .bind(release.web_playable)
        .bind(release.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(CatalogError::Conflict(format!(
                    "release {} already exists for software {}",
                    release.version, release.software_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_if_not_exists(&self, release: &Release) -> Result<bool> {
        let done = sqlx::query(
            r#"
            INSERT INTO releases
              (id, software_id, version, cartridge_path, source_path, html_folder_path,
               docs_folder_path, web_playable, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            ON CONFLICT (software_id, version) DO NOTHING
            "#,
        )
        .bind(release.id)
        .bind(release.software_id)
        .bind(&release.version)
        .bind(&release.cartridge_path)
        .bind(&release.source_path)
        .bind(&release.html_folder_path)
        .bind(&release.docs_folder_path)
        .bind(release.web_playable)
        .bind(release.created_at)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn find_latest_by_software_id(&self, software_id: Uuid) -> Result<Release> {
        sqlx::query_as::<_, Release>(
            r#"
            SELECT id, software_id, version, cartridge_path, source_path, html_folder_path,
                   docs_folder_path, web_playable, created_at
            FROM releases WHERE software_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(software_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CatalogError::NotFound(format!("no releases for software {software_id}")))
    }

    async fn find_by_software_id_and_version(
        &self,
        software_id: Uuid,
        version: &str,
    ) -> Result<Release> {
        sqlx::query_as::<_, Release>(
            r#"
            SELECT id, software_id, version, cartridge_path, source_path, html_folder_path,
                   docs_folder_path, web_playable, created_at
            FROM releases WHERE software_id = $1 AND version = $2
            "#,
        )
        .bind(software_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            CatalogError::NotFound(format!("release {version} for software {software_id}"))
        })
    }

    async fn list_by_software_id(&self, software_id: Uuid) -> Result<Vec<Release>> {
        let rows = sqlx::query_as::<_, Release>(
            r#"
            SELECT id, software_id, version, cartridge_path, source_path, html_folder_path,
                   docs_folder_path, web_playable, created_at
            FROM releases WHERE software_id = $1
            "#,
        )
        .bind(software_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
