// SPDX-License-Identifier: AGPL-3.0-only
//! Release ingestion and catalog bookkeeping for versioned cartridge builds.
//!
//! An update trigger names a platform, a software name and a version. The
//! [`UpdatePipeline`] finds the staged artifacts for that triple, unpacks any
//! browser bundle, reads the descriptive metadata, upserts the [`Software`]
//! row, moves the artifacts into their canonical [`PathLayout`] location and
//! records a [`Release`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use cartridge_catalog::{
//!     MemoryStore, PathLayout, Platform, UpdatePipeline, UpdateRequest, ZipExtractor,
//! };
//!
//! # async fn example() -> cartridge_catalog::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let pipeline = UpdatePipeline::new(
//!     PathLayout::single_root("/srv/softwares"),
//!     store.clone(),
//!     store,
//!     Arc::new(ZipExtractor),
//! );
//! let outcome = pipeline
//!     .ingest(&UpdateRequest {
//!         platform: Platform::Tic80,
//!         name: "pong".into(),
//!         version: "1.0".into(),
//!     })
//!     .await?;
//! println!("recorded {}", outcome.release.version);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod error;
pub mod fsops;
pub mod layout;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod platform;
pub mod service;
pub mod store;

pub use archive::{ArchiveExtractor, ExtractSummary, ZipExtractor};
pub use error::{CatalogError, ErrorKind, Result};
pub use layout::{PathLayout, ReleasePaths};
pub use metadata::Metadata;
pub use model::{Release, Software, SoftwareListing, SoftwareWithReleases};
pub use pipeline::{DuplicatePolicy, IngestOutcome, UpdatePipeline, UpdateRequest};
pub use platform::Platform;
pub use service::CatalogService;
pub use store::{MemoryStore, PgStore, ReleaseLedger, SoftwareCatalog};
