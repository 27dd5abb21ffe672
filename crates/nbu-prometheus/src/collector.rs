use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use nbu_client::endpoints::{self, JOBS_PATH, STORAGE_UNITS_PATH};
use nbu_client::{Context, NegotiationError, Negotiator, ProtocolVersion, Transport};
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::error::{CloseError, CollectorError, ScrapeError};
use crate::lifecycle::{CollectorState, Lifecycle};
use crate::metrics::MetricSet;

/// Scrape behaviour of [`NbuCollector`].
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Fixed API version; negotiation is skipped when set.
    pub version: Option<ProtocolVersion>,
    /// Negotiation candidates, newest first.
    pub candidates: Vec<ProtocolVersion>,
    /// Jobs that ended within this window are reported.
    pub jobs_window: Duration,
    pub page_limit: u32,
    pub max_pages: u32,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            version: None,
            candidates: ProtocolVersion::candidates(),
            jobs_window: Duration::from_secs(300),
            page_limit: 100,
            max_pages: 50,
        }
    }
}

/// Metrics produced by one [`NbuCollector::collect`] call.
#[derive(Debug, Default)]
pub struct Scrape {
    pub families: Vec<MetricFamily>,
    /// Set when the upstream could not be fully scraped.
    pub error: Option<ScrapeError>,
}

impl Scrape {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// NetBackup metrics collector.
///
/// `collect` may run concurrently from any number of tasks. `close` stops new
/// scrapes, waits for running ones and then drops the HTTP transport.
pub struct NbuCollector {
    lifecycle: Lifecycle,
    transport: RwLock<Option<Transport>>,
    version: OnceCell<ProtocolVersion>,
    options: CollectorOptions,
    descs: Vec<Desc>,
    last_success: Mutex<Option<f64>>,
}

impl NbuCollector {
    pub fn new(transport: Transport, options: CollectorOptions) -> Result<Self, CollectorError> {
        let descs = MetricSet::new()?.descs();

        if let Some(version) = options.version {
            info!(%version, "using configured API version, negotiation disabled");
        }

        Ok(Self {
            lifecycle: Lifecycle::new(),
            transport: RwLock::new(Some(transport)),
            version: OnceCell::new_with(options.version),
            options,
            descs,
            last_success: Mutex::new(None),
        })
    }

    /// Descriptors of every metric this collector can emit.
    pub fn describe(&self) -> Vec<Desc> {
        self.descs.clone()
    }

    pub fn state(&self) -> CollectorState {
        self.lifecycle.state()
    }

    pub fn in_flight(&self) -> usize {
        self.lifecycle.active()
    }

    /// API version in use, once configured or negotiated.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version.get().copied()
    }

    /// Whether the HTTP transport has been dropped by a completed close.
    pub fn transport_released(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Runs one scrape.
    ///
    /// Returns no metrics once the collector is closing. Upstream failures are
    /// reported through [`Scrape::error`]; the health gauges are present either way.
    pub async fn collect(&self, ctx: &Context) -> Scrape {
        let Some(_in_flight) = self.lifecycle.enter() else {
            debug!("collector is not open, skipping scrape");
            return Scrape::default();
        };
        let Some(transport) = self.current_transport() else {
            return Scrape::default();
        };

        let started = Instant::now();
        let metrics = match MetricSet::new() {
            Ok(metrics) => metrics,
            Err(err) => {
                error!(error = %err, "failed to build metric set");
                return Scrape::default();
            }
        };

        let result = self.scrape(ctx, &transport, &metrics).await;
        let last_success = {
            let mut last = self
                .last_success
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if result.is_ok() {
                *last = Some(unix_now());
            }
            *last
        };
        metrics.set_health(result.is_ok(), last_success, started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => debug!(elapsed = ?started.elapsed(), "scrape completed"),
            Err(err) => warn!(error = %err, "scrape failed"),
        }

        Scrape {
            families: metrics.gather(),
            error: result.err(),
        }
    }

    /// Closes the collector, waiting without bound for in-flight scrapes.
    pub async fn close(&self) -> Result<(), CloseError> {
        self.close_with_context(&Context::background()).await
    }

    /// Closes the collector, waiting for in-flight scrapes until `ctx` ends.
    ///
    /// Only the first caller drains; all others get [`CloseError::AlreadyClosing`].
    /// When `ctx` ends first the collector stays `Closing` and keeps its transport.
    pub async fn close_with_context(&self, ctx: &Context) -> Result<(), CloseError> {
        self.lifecycle.begin_close()?;
        info!(in_flight = self.lifecycle.active(), "closing collector");

        if let Err(source) = self.lifecycle.drain(ctx).await {
            let in_flight = self.lifecycle.active();
            warn!(in_flight, error = %source, "collector drain did not complete");
            return Err(CloseError::Timeout { in_flight, source });
        }

        self.transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.lifecycle.finish_close();
        info!("collector closed");
        Ok(())
    }

    fn current_transport(&self) -> Option<Transport> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn scrape(
        &self,
        ctx: &Context,
        transport: &Transport,
        metrics: &MetricSet,
    ) -> Result<(), ScrapeError> {
        let version = match self.ensure_version(ctx, transport).await {
            Ok(version) => version,
            Err(err) => {
                metrics.set_version(None);
                return Err(err.into());
            }
        };
        metrics.set_version(Some(version));

        let opts = &self.options;
        let since = window_start(OffsetDateTime::now_utc(), opts.jobs_window);
        let (storage, jobs) = tokio::join!(
            endpoints::storage_units(transport, ctx, version, opts.page_limit),
            endpoints::jobs_since(
                transport,
                ctx,
                version,
                since,
                opts.page_limit,
                opts.max_pages
            ),
        );

        let mut failure = None;
        match storage {
            Ok(units) => metrics.record_storage(&units),
            Err(source) => {
                failure = Some(ScrapeError::Fetch {
                    endpoint: STORAGE_UNITS_PATH,
                    source,
                })
            }
        }
        match jobs {
            Ok(jobs) => metrics.record_jobs(&jobs),
            Err(source) => {
                debug!(error = %source, "jobs fetch failed");
                failure.get_or_insert(ScrapeError::Fetch {
                    endpoint: JOBS_PATH,
                    source,
                });
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cached version, or a negotiation shared by all concurrent callers.
    ///
    /// A failed negotiation leaves the cache empty so the next scrape retries.
    async fn ensure_version(
        &self,
        ctx: &Context,
        transport: &Transport,
    ) -> Result<ProtocolVersion, NegotiationError> {
        self.version
            .get_or_try_init(|| async {
                Negotiator::new(transport)
                    .negotiate(ctx, &self.options.candidates)
                    .await
                    .map(|negotiated| negotiated.version)
            })
            .await
            .copied()
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Start of the jobs window ending at `now`, never earlier than the Unix epoch.
fn window_start(now: OffsetDateTime, window: Duration) -> OffsetDateTime {
    time::Duration::try_from(window)
        .ok()
        .and_then(|window| now.checked_sub(window))
        .map_or(OffsetDateTime::UNIX_EPOCH, |start| {
            start.max(OffsetDateTime::UNIX_EPOCH)
        })
}
