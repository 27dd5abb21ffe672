use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use nbu_api::MetricsApi;
use nbu_client::testing::{API_KEY, MockServer};
use nbu_client::{ProtocolVersion, Transport, TransportConfig};
use nbu_prometheus::{CollectorOptions, NbuCollector};
use tower::ServiceExt;

fn router(base_url: String, options: CollectorOptions, timeout: Duration) -> (Router, Arc<NbuCollector>) {
    let transport = Transport::new(TransportConfig::new(base_url, API_KEY)).unwrap();
    let collector = Arc::new(NbuCollector::new(transport, options).unwrap());
    let router = MetricsApi::new(Arc::clone(&collector), timeout).router("/metrics");
    (router, collector)
}

async fn get(router: Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn metrics_endpoint_serves_text_format() {
    let server = MockServer::start().await;
    let (router, _) = router(server.base_url(), CollectorOptions::default(), Duration::from_secs(5));

    let (status, content_type, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert!(body.contains("# TYPE nbu_up gauge"));
    assert!(body.contains("nbu_up 1"));
    assert!(body.contains(r#"nbu_api_version_info{version="13.0"} 1"#));
    assert!(body.contains(r#"nbu_disk_bytes{name="stu-disk-01",size="used",type="DISK"} 250000"#));
}

#[tokio::test]
async fn metrics_endpoint_reports_down_upstream_with_200() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (router, _) = router(
        format!("http://{addr}/netbackup"),
        CollectorOptions::default(),
        Duration::from_secs(5),
    );

    let (status, _, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("nbu_up 0"));
    assert!(body.contains("nbu_last_scrape_timestamp_seconds 0"));
    assert!(body.contains(r#"nbu_api_version_info{version=""} 0"#));
    assert!(!body.contains("nbu_jobs_count"));
}

#[tokio::test]
async fn slow_upstream_is_cut_off_by_scrape_timeout() {
    let server = MockServer::start().await;
    server.delay(Duration::from_secs(5));
    let options = CollectorOptions {
        version: Some(ProtocolVersion::new(13, 0)),
        ..CollectorOptions::default()
    };
    let (router, collector) = router(server.base_url(), options, Duration::from_millis(100));

    let started = std::time::Instant::now();
    let (status, _, body) = get(router, "/metrics").await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("nbu_up 0"));
    assert_eq!(collector.in_flight(), 0);
}

#[tokio::test]
async fn closed_collector_serves_empty_body() {
    let server = MockServer::start().await;
    let (router, collector) = router(server.base_url(), CollectorOptions::default(), Duration::from_secs(5));
    collector.close().await.unwrap();

    let (status, _, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn landing_page_links_to_metrics() {
    let server = MockServer::start().await;
    let (router, _) = router(server.base_url(), CollectorOptions::default(), Duration::from_secs(5));

    let (status, content_type, body) = get(router.clone(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    assert!(body.contains(r#"href="/metrics""#));
    assert!(server.requests().is_empty());

    let (status, _, _) = get(router, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
