//! Prometheus exporter for StecaGrid solar inverters.
//!
//! The exporter polls the inverter's `measurements.xml` page on a fixed
//! interval and exposes the readings via an HTTP `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Inverter     │────>│     Poller      │────>│  SinkRegistry   │
//! │ measurements.xml│     │ (fetch + map)   │     │  (last values)  │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!                                                 ┌────────▼────────┐
//!                                                 │   HTTP Server   │
//!                                                 │   (/metrics)    │
//!                                                 └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! stecagrid-exporter --steca-ip 192.168.50.144 --frequency 5
//! stecagrid-exporter --config stecagrid.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod document;
pub mod error;
pub mod exposition;
pub mod fetcher;
pub mod http;
pub mod mapper;
pub mod poller;
pub mod registry;

pub use config::{ConfigError, ExporterConfig, LogFormat, LoggingConfig};
pub use document::{DeviceIdentity, MeasurementDocument, MeasurementRecord};
pub use error::{ConversionError, FetchError, ParseError, PollError};
pub use fetcher::Fetcher;
pub use http::HttpServer;
pub use poller::Poller;
pub use registry::{ExporterStats, MeasurementKind, SharedRegistry, SinkRegistry};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two
/// output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    }
    .map_err(|e| ConfigError::Logging(e.to_string()))
}
