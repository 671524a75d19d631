// SPDX-License-Identifier: AGPL-3.0-only
use cartridge_catalog::{DuplicatePolicy, PathLayout};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// JSON structured logging for log aggregation.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "cartridge-server",
    version,
    about = "Catalog and serve versioned cartridge releases"
)]
pub struct Args {
    /// Listen address for the HTTP API.
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Keep the catalog in process memory instead of Postgres (lost on exit).
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,

    /// Root directory for published releases.
    #[arg(long, env = "GAMES_DIR")]
    pub content_root: PathBuf,

    /// Directory where builds are dropped before an update; defaults to the content root.
    #[arg(long, env = "STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Shared secret the update trigger must present.
    #[arg(long, env = "UPDATE_SECRET", hide_env_values = true)]
    pub update_secret: String,

    /// URL prefix under which the content root is served.
    #[arg(long, env = "PUBLIC_PREFIX", default_value = "/file")]
    pub public_prefix: String,

    /// What an update for an already-recorded version does: skip or reject.
    #[arg(long, env = "DUPLICATE_POLICY", default_value = "skip")]
    pub duplicate_policy: DuplicatePolicy,

    /// Log output format: text or json.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChoice {
    Memory,
    Postgres(String),
}

impl Args {
    pub fn layout(&self) -> PathLayout {
        PathLayout::new(
            self.content_root.clone(),
            self.staging_dir
                .clone()
                .unwrap_or_else(|| self.content_root.clone()),
        )
    }

    pub fn store_choice(&self) -> Result<StoreChoice, String> {
        match (self.in_memory, self.database_url.as_deref()) {
            (true, Some(_)) => Err("--in-memory and --database-url are mutually exclusive".into()),
            (true, None) => Ok(StoreChoice::Memory),
            (false, Some(url)) if !url.trim().is_empty() => Ok(StoreChoice::Postgres(url.to_string())),
            (false, _) => Err("a --database-url is required unless --in-memory is set".into()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.update_secret.trim().is_empty() {
            return Err("update secret cannot be empty".into());
        }
        let prefix = self.public_prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.len() < 2 {
            return Err(format!(
                "public prefix {:?} must be an absolute path below /",
                self.public_prefix
            ));
        }
        self.store_choice().map(|_| ())
    }

    /// Public prefix without a trailing slash.
    pub fn public_prefix(&self) -> String {
        self.public_prefix.trim_end_matches('/').to_string()
    }
}
