use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use nbu_client::Context;
use nbu_prometheus::NbuCollector;
use prometheus::{Encoder, TextEncoder};
use tracing::{debug, error, warn};

/// HTTP API service builder.
pub struct MetricsApi {
    collector: Arc<NbuCollector>,
    scrape_timeout: Duration,
}

#[derive(Clone)]
struct ApiState {
    collector: Arc<NbuCollector>,
    scrape_timeout: Duration,
    landing: Arc<str>,
}

impl MetricsApi {
    pub fn new(collector: Arc<NbuCollector>, scrape_timeout: Duration) -> Self {
        Self {
            collector,
            scrape_timeout,
        }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - GET `metrics_path` - Prometheus text exposition
    /// - GET / - Landing page
    pub fn router(self, metrics_path: &str) -> Router {
        let state = ApiState {
            collector: self.collector,
            scrape_timeout: self.scrape_timeout,
            landing: landing_page(metrics_path).into(),
        };

        let router = Router::new().route(metrics_path, get(metrics));
        if metrics_path == "/" {
            return router.with_state(state);
        }
        router.route("/", get(landing)).with_state(state)
    }
}

/// GET <metrics_path>
async fn metrics(State(state): State<ApiState>) -> Response {
    let ctx = Context::background().with_timeout(state.scrape_timeout);
    let scrape = state.collector.collect(&ctx).await;
    if let Some(err) = &scrape.error {
        warn!(error = %err, "serving partial metrics");
    }

    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    if let Err(err) = encoder.encode(&scrape.families, &mut body) {
        error!(error = %err, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    debug!(families = scrape.families.len(), bytes = body.len(), "metrics served");
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], body).into_response()
}

/// GET /
async fn landing(State(state): State<ApiState>) -> Html<String> {
    Html(state.landing.to_string())
}

fn landing_page(metrics_path: &str) -> String {
    format!(
        "<html>\n<head><title>NetBackup Exporter</title></head>\n<body>\n\
         <h1>NetBackup Exporter</h1>\n\
         <p><a href=\"{metrics_path}\">Metrics</a></p>\n\
         </body>\n</html>\n"
    )
}
