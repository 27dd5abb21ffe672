//! Prometheus collector for NetBackup primary servers.
//!
//! [`NbuCollector`] scrapes the NetBackup REST API on demand and returns the
//! result as Prometheus metric families. The API version is either configured
//! or negotiated once on the first scrape and cached.
//!
//! ## Example
//! ```rust,no_run
//! use nbu_client::{Context, Transport, TransportConfig};
//! use nbu_prometheus::{CollectorOptions, NbuCollector};
//! use prometheus::{Encoder, TextEncoder};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::new(TransportConfig::new("https://nbu:1556/netbackup", "api-key"))?;
//! let collector = NbuCollector::new(transport, CollectorOptions::default())?;
//!
//! let scrape = collector.collect(&Context::background()).await;
//! let mut buffer = Vec::new();
//! TextEncoder::new().encode(&scrape.families, &mut buffer)?;
//!
//! collector.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `nbu_up` - Gauge
//! - `nbu_last_scrape_timestamp_seconds` - Gauge
//! - `nbu_api_version_info{version}` - Gauge
//! - `nbu_scrape_duration_seconds` - Gauge
//! - `nbu_disk_bytes{name, type, size}` - Gauge
//! - `nbu_jobs_bytes{action, policy_type, status}` - Gauge
//! - `nbu_jobs_count{action, policy_type, status}` - Gauge
//! - `nbu_status_count{action, status}` - Gauge
//!
//! ## HTTP Server
//! This crate does NOT provide an HTTP server; see `nbu-api`.

mod collector;
pub use collector::{CollectorOptions, NbuCollector, Scrape};

mod error;
pub use error::{CloseError, CollectorError, ScrapeError};

mod lifecycle;
pub use lifecycle::CollectorState;

pub mod metrics;
pub use metrics::DESCRIPTOR_COUNT;

pub use prometheus::{Encoder, TextEncoder};
