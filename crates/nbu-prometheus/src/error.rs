use nbu_client::{ClientError, ContextError, NegotiationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to build metric {name}: {source}")]
    Metric {
        name: &'static str,
        #[source]
        source: prometheus::Error,
    },

    #[error("invalid API version override: {0}")]
    Version(#[from] nbu_client::ParseVersionError),
}

/// Why a scrape produced only partial metrics.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("fetching {endpoint} failed: {source}")]
    Fetch {
        endpoint: &'static str,
        #[source]
        source: ClientError,
    },
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("collector is already closed or closing")]
    AlreadyClosing,

    #[error("timed out draining {in_flight} in-flight scrape(s): {source}")]
    Timeout {
        in_flight: usize,
        #[source]
        source: ContextError,
    },
}
