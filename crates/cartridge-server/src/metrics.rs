// SPDX-License-Identifier: AGPL-3.0-only
//! Prometheus metrics for release ingestion and downloads.

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Owned by the application state; one registry per process.
pub struct Metrics {
    registry: Registry,

    /// Update triggers by platform and outcome (created, skipped, failed).
    pub ingest_total: CounterVec,
    pub ingest_duration_seconds: HistogramVec,

    /// Artifact downloads by kind (cartridge, source).
    pub downloads_total: CounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let ingest_total = CounterVec::new(
            Opts::new(
                "cartridge_ingest_total",
                "Update triggers by platform and outcome",
            ),
            &["platform", "outcome"],
        )?;

        let ingest_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cartridge_ingest_duration_seconds",
                "Time spent ingesting one release",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["platform"],
        )?;

        let downloads_total = CounterVec::new(
            Opts::new("cartridge_downloads_total", "Artifact downloads by kind"),
            &["artifact"],
        )?;

        registry.register(Box::new(ingest_total.clone()))?;
        registry.register(Box::new(ingest_duration_seconds.clone()))?;
        registry.register(Box::new(downloads_total.clone()))?;

        Ok(Self {
            registry,
            ingest_total,
            ingest_duration_seconds,
            downloads_total,
        })
    }

    pub fn record_ingest(&self, platform: &str, outcome: &str, seconds: f64) {
        self.ingest_total
            .with_label_values(&[platform, outcome])
            .inc();
        self.ingest_duration_seconds
            .with_label_values(&[platform])
            .observe(seconds);
    }

    /// Encode all metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}
