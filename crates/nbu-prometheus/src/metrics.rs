use std::collections::BTreeMap;

use nbu_client::ProtocolVersion;
use nbu_client::model::{Job, StorageUnit};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts, Registry};

use crate::error::CollectorError;

pub const UP: &str = "nbu_up";
pub const LAST_SCRAPE: &str = "nbu_last_scrape_timestamp_seconds";
pub const API_VERSION: &str = "nbu_api_version_info";
pub const SCRAPE_DURATION: &str = "nbu_scrape_duration_seconds";
pub const DISK_BYTES: &str = "nbu_disk_bytes";
pub const JOBS_BYTES: &str = "nbu_jobs_bytes";
pub const JOBS_COUNT: &str = "nbu_jobs_count";
pub const STATUS_COUNT: &str = "nbu_status_count";

/// Number of descriptors returned by `describe`.
pub const DESCRIPTOR_COUNT: usize = 8;

/// One scrape's worth of metrics, registered in a private registry.
///
/// A fresh set is built for every scrape so label values from earlier scrapes
/// never linger.
pub(crate) struct MetricSet {
    registry: Registry,
    up: Gauge,
    last_scrape: Gauge,
    api_version: GaugeVec,
    scrape_duration: Gauge,
    disk_bytes: GaugeVec,
    jobs_bytes: GaugeVec,
    jobs_count: GaugeVec,
    status_count: GaugeVec,
}

impl MetricSet {
    pub(crate) fn new() -> Result<Self, CollectorError> {
        let registry = Registry::new();
        Ok(Self {
            up: gauge(&registry, UP, "Whether the last scrape of the NetBackup API succeeded")?,
            last_scrape: gauge(
                &registry,
                LAST_SCRAPE,
                "Unix time of the last successful scrape of the NetBackup API",
            )?,
            api_version: gauge_vec(
                &registry,
                API_VERSION,
                "NetBackup REST API version in use",
                &["version"],
            )?,
            scrape_duration: gauge(
                &registry,
                SCRAPE_DURATION,
                "Duration of the last scrape in seconds",
            )?,
            disk_bytes: gauge_vec(
                &registry,
                DISK_BYTES,
                "Storage unit capacity in bytes",
                &["name", "type", "size"],
            )?,
            jobs_bytes: gauge_vec(
                &registry,
                JOBS_BYTES,
                "Bytes transferred by jobs finished within the scrape window",
                &["action", "policy_type", "status"],
            )?,
            jobs_count: gauge_vec(
                &registry,
                JOBS_COUNT,
                "Number of jobs finished within the scrape window",
                &["action", "policy_type", "status"],
            )?,
            status_count: gauge_vec(
                &registry,
                STATUS_COUNT,
                "Number of jobs by action and exit status",
                &["action", "status"],
            )?,
            registry,
        })
    }

    pub(crate) fn descs(&self) -> Vec<Desc> {
        let collectors: [&dyn Collector; DESCRIPTOR_COUNT] = [
            &self.up,
            &self.last_scrape,
            &self.api_version,
            &self.scrape_duration,
            &self.disk_bytes,
            &self.jobs_bytes,
            &self.jobs_count,
            &self.status_count,
        ];
        collectors
            .iter()
            .flat_map(|c| c.desc())
            .cloned()
            .collect()
    }

    pub(crate) fn set_health(&self, up: bool, last_success: Option<f64>, duration_secs: f64) {
        self.up.set(if up { 1.0 } else { 0.0 });
        self.last_scrape.set(last_success.unwrap_or(0.0));
        self.scrape_duration.set(duration_secs);
    }

    /// `version="<v>"` set to 1, or `version=""` set to 0 while none is established.
    pub(crate) fn set_version(&self, version: Option<ProtocolVersion>) {
        match version {
            Some(version) => self
                .api_version
                .with_label_values(&[version.to_string().as_str()])
                .set(1.0),
            None => self.api_version.with_label_values(&[""]).set(0.0),
        }
    }

    pub(crate) fn record_storage(&self, units: &[StorageUnit]) {
        for unit in units {
            let labels = |size: &'static str| [unit.name.as_str(), unit.storage_type.as_str(), size];
            self.disk_bytes
                .with_label_values(&labels("free"))
                .set(unit.free_capacity_bytes as f64);
            self.disk_bytes
                .with_label_values(&labels("used"))
                .set(unit.used_capacity_bytes as f64);
        }
    }

    pub(crate) fn record_jobs(&self, jobs: &[Job]) {
        let mut by_policy: BTreeMap<(&str, &str, String), (u64, u64)> = BTreeMap::new();
        let mut by_status: BTreeMap<(&str, String), u64> = BTreeMap::new();

        for job in jobs {
            let status = job.status.to_string();
            let entry = by_policy
                .entry((job.job_type.as_str(), job.policy_type.as_str(), status.clone()))
                .or_default();
            entry.0 += 1;
            entry.1 += job.kilobytes_transferred.saturating_mul(1024);

            *by_status.entry((job.job_type.as_str(), status)).or_default() += 1;
        }

        for ((action, policy_type, status), (count, bytes)) in &by_policy {
            let labels = [*action, *policy_type, status.as_str()];
            self.jobs_count.with_label_values(&labels).set(*count as f64);
            self.jobs_bytes.with_label_values(&labels).set(*bytes as f64);
        }
        for ((action, status), count) in &by_status {
            self.status_count
                .with_label_values(&[*action, status.as_str()])
                .set(*count as f64);
        }
    }

    pub(crate) fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

fn gauge(registry: &Registry, name: &'static str, help: &str) -> Result<Gauge, CollectorError> {
    let metric = |source| CollectorError::Metric { name, source };
    let gauge = Gauge::with_opts(Opts::new(name, help)).map_err(metric)?;
    registry.register(Box::new(gauge.clone())).map_err(metric)?;
    Ok(gauge)
}

fn gauge_vec(
    registry: &Registry,
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, CollectorError> {
    let metric = |source| CollectorError::Metric { name, source };
    let vec = GaugeVec::new(Opts::new(name, help), labels).map_err(metric)?;
    registry.register(Box::new(vec.clone())).map_err(metric)?;
    Ok(vec)
}
