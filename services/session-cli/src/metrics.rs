//! Prometheus exposition for the session client's counters
//!
//! The library emits through the `metrics` facade; this installs the
//! recorder that collects them so `--metrics` can print a snapshot.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
