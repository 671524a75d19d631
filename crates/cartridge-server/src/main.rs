// SPDX-License-Identifier: AGPL-3.0-only
mod api;
mod config;
mod metrics;

use crate::api::router;
use crate::config::{Args, LogFormat, StoreChoice};
use crate::metrics::Metrics;

use anyhow::Context;
use cartridge_catalog::{
    CatalogService, MemoryStore, PgStore, ReleaseLedger, SoftwareCatalog, UpdatePipeline,
    ZipExtractor,
};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UpdatePipeline>,
    pub service: CatalogService,
    pub metrics: Arc<Metrics>,
    pub update_secret: Arc<str>,
    pub public_prefix: Arc<str>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn open_store(
    choice: StoreChoice,
) -> anyhow::Result<(Arc<dyn SoftwareCatalog>, Arc<dyn ReleaseLedger>)> {
    match choice {
        StoreChoice::Memory => {
            warn!("using in-memory catalog; records are lost on exit");
            let store = Arc::new(MemoryStore::new());
            let catalog: Arc<dyn SoftwareCatalog> = store.clone();
            let ledger: Arc<dyn ReleaseLedger> = store;
            Ok((catalog, ledger))
        }
        StoreChoice::Postgres(url) => {
            let store = PgStore::connect(&url)
                .await
                .context("connect to DATABASE_URL")?;
            store.migrate().await.context("apply catalog schema")?;
            let store = Arc::new(store);
            let catalog: Arc<dyn SoftwareCatalog> = store.clone();
            let ledger: Arc<dyn ReleaseLedger> = store;
            Ok((catalog, ledger))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    args.validate().map_err(anyhow::Error::msg)?;

    let layout = args.layout();
    for dir in [layout.content_root(), layout.staging_root()] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;
    }

    let choice = args.store_choice().map_err(anyhow::Error::msg)?;
    let (catalog, ledger) = open_store(choice).await?;

    let pipeline = UpdatePipeline::new(
        layout.clone(),
        catalog.clone(),
        ledger.clone(),
        Arc::new(ZipExtractor),
    )
    .with_duplicate_policy(args.duplicate_policy);

    let state = AppState {
        pipeline: Arc::new(pipeline),
        service: CatalogService::new(catalog, ledger),
        metrics: Arc::new(Metrics::new().context("register metrics")?),
        update_secret: Arc::from(args.update_secret.as_str()),
        public_prefix: Arc::from(args.public_prefix().as_str()),
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    info!(
        addr = %args.listen,
        content_root = %layout.content_root().display(),
        staging_root = %layout.staging_root().display(),
        policy = ?args.duplicate_policy,
        "cartridge catalog listening"
    );
    axum::serve(listener, app).await.context("axum serve failed")?;

    Ok(())
}
