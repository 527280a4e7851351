//! Prometheus exporter

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;
use tracing::info;

/// Errors installing the Prometheus exporter
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Failed to install Prometheus exporter on port {port}: {reason}")]
    Install { port: u16, reason: String },
}

/// Install the global recorder and serve `/metrics` on all interfaces.
///
/// Must be called from within a tokio runtime; the HTTP listener is
/// spawned onto it.
pub fn install_prometheus(port: u16) -> Result<SocketAddr, ExporterError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ExporterError::Install {
            port,
            reason: e.to_string(),
        })?;

    info!(
        "Prometheus server started on port {}. Metrics available in http://localhost:{}/metrics",
        port, port
    );
    Ok(addr)
}
