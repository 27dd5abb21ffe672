mod common;

use std::sync::Arc;
use std::time::Duration;

use nbu_client::testing::MockServer;
use nbu_client::{ClientError, Context, ProtocolVersion};
use nbu_prometheus::{CollectorOptions, DESCRIPTOR_COUNT, ScrapeError};

use common::{collector, render, sample};

#[tokio::test]
async fn healthy_scrape_exposes_business_and_health_metrics() {
    let server = MockServer::start().await;
    let collector = collector(&server, CollectorOptions::default());

    let scrape = collector.collect(&Context::background()).await;
    assert!(scrape.is_ok(), "{:?}", scrape.error);
    let text = render(&scrape);

    assert_eq!(sample(&text, "nbu_up"), Some(1.0));
    assert!(sample(&text, "nbu_last_scrape_timestamp_seconds").is_some_and(|ts| ts > 0.0));
    assert!(sample(&text, "nbu_scrape_duration_seconds").is_some());
    assert!(text.contains(r#"nbu_api_version_info{version="13.0"} 1"#));
    assert!(text.contains(r#"nbu_disk_bytes{name="stu-disk-01",size="free",type="DISK"} 750000"#));
    assert!(text.contains(r#"nbu_jobs_count{action="BACKUP",policy_type="VMWARE",status="0"} 2"#));
    assert!(text.contains(r#"nbu_jobs_bytes{action="BACKUP",policy_type="VMWARE",status="0"} 3145728"#));
    assert!(text.contains(r#"nbu_status_count{action="RESTORE",status="150"} 1"#));
}

#[tokio::test]
async fn negotiates_once_and_reuses_cached_version() {
    let server = MockServer::start().await;
    server.accept_only(&["12.0", "3.0"]);
    let collector = collector(&server, CollectorOptions::default());

    let first = collector.collect(&Context::background()).await;
    assert!(first.is_ok());
    assert_eq!(collector.version(), Some(ProtocolVersion::new(12, 0)));
    assert_eq!(server.probed_versions(), ["13.0", "12.0"]);
    assert!(render(&first).contains(r#"nbu_api_version_info{version="12.0"} 1"#));

    server.clear_requests();
    let second = collector.collect(&Context::background()).await;
    assert!(second.is_ok());
    assert!(server.probes().is_empty());
    assert!(
        server
            .requests()
            .iter()
            .all(|r| r.version().as_deref() == Some("12.0"))
    );
}

#[tokio::test]
async fn configured_version_skips_negotiation() {
    let server = MockServer::start().await;
    let collector = collector(
        &server,
        CollectorOptions {
            version: Some(ProtocolVersion::new(12, 0)),
            ..CollectorOptions::default()
        },
    );
    assert_eq!(collector.version(), Some(ProtocolVersion::new(12, 0)));

    let scrape = collector.collect(&Context::background()).await;
    assert!(scrape.is_ok());

    let requests = server.requests();
    assert!(server.probes().is_empty());
    assert!(!requests.is_empty());
    assert_eq!(
        requests[0].accept.as_deref(),
        Some("application/vnd.netbackup+json;version=12.0")
    );
}

#[tokio::test]
async fn exhausted_negotiation_is_not_cached() {
    let server = MockServer::start().await;
    server.accept_only(&[]);
    let collector = collector(&server, CollectorOptions::default());

    let failed = collector.collect(&Context::background()).await;
    match &failed.error {
        Some(ScrapeError::Negotiation(err)) => {
            assert!(err.is_exhausted());
            assert_eq!(err.attempted, ProtocolVersion::candidates());
        }
        other => panic!("expected negotiation failure, got {other:?}"),
    }
    let text = render(&failed);
    assert_eq!(sample(&text, "nbu_up"), Some(0.0));
    assert_eq!(sample(&text, "nbu_last_scrape_timestamp_seconds"), Some(0.0));
    assert!(text.contains(r#"nbu_api_version_info{version=""} 0"#));
    assert_eq!(collector.version(), None);

    server.accept_only(&["3.0"]);
    let recovered = collector.collect(&Context::background()).await;
    assert!(recovered.is_ok());
    assert_eq!(collector.version(), Some(ProtocolVersion::new(3, 0)));
}

#[tokio::test]
async fn downgraded_server_keeps_health_gauges() {
    let server = MockServer::start().await;
    let collector = collector(&server, CollectorOptions::default());
    assert!(collector.collect(&Context::background()).await.is_ok());

    server.accept_only(&[]);
    let scrape = collector.collect(&Context::background()).await;

    let err = scrape.error.as_ref().expect("scrape error");
    match err {
        ScrapeError::Fetch { source, .. } => assert!(source.is_version_rejected()),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("13.0"), "{msg}");
    assert!(msg.contains("not supported"), "{msg}");

    let text = render(&scrape);
    assert_eq!(sample(&text, "nbu_up"), Some(0.0));
    assert!(sample(&text, "nbu_last_scrape_timestamp_seconds").is_some_and(|ts| ts > 0.0));
    assert!(!text.contains("nbu_disk_bytes"));
}

#[tokio::test]
async fn unreachable_server_still_reports_exporter_health() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = nbu_client::Transport::new(nbu_client::TransportConfig::new(
        format!("http://{addr}/netbackup"),
        "key",
    ))
    .unwrap();
    let collector =
        nbu_prometheus::NbuCollector::new(transport, CollectorOptions::default()).unwrap();

    let scrape = collector.collect(&Context::background()).await;
    match &scrape.error {
        Some(ScrapeError::Negotiation(err)) => {
            assert!(!err.is_exhausted());
            assert_eq!(err.attempted.len(), 1);
        }
        other => panic!("expected negotiation failure, got {other:?}"),
    }
    let text = render(&scrape);
    assert_eq!(sample(&text, "nbu_up"), Some(0.0));
    assert!(text.contains(r#"nbu_api_version_info{version=""} 0"#));
}

#[tokio::test]
async fn partial_fetch_failure_keeps_successful_metrics() {
    let server = MockServer::start().await;
    server.body(
        nbu_client::endpoints::STORAGE_UNITS_PATH,
        r#"{"data": 42}"#,
    );
    let collector = collector(&server, CollectorOptions::default());

    let scrape = collector.collect(&Context::background()).await;
    match &scrape.error {
        Some(ScrapeError::Fetch { endpoint, source }) => {
            assert_eq!(*endpoint, "/storage/storage-units");
            assert!(matches!(source, ClientError::Decode { .. }));
        }
        other => panic!("expected fetch failure, got {other:?}"),
    }
    let text = render(&scrape);
    assert_eq!(sample(&text, "nbu_up"), Some(0.0));
    assert!(text.contains("nbu_jobs_count{"));
    assert!(!text.contains("nbu_disk_bytes{"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_scrapes_share_one_negotiation() {
    let server = MockServer::start().await;
    server.accept_only(&["12.0"]);
    server.delay(Duration::from_millis(100));
    let collector = Arc::new(collector(&server, CollectorOptions::default()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let collector = Arc::clone(&collector);
            tokio::spawn(async move { collector.collect(&Context::background()).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert_eq!(server.probed_versions(), ["13.0", "12.0"]);
    assert_eq!(collector.in_flight(), 0);
}

#[tokio::test]
async fn label_sets_match_across_versions() {
    let business = |text: &str| -> Vec<String> {
        text.lines()
            .filter(|line| {
                ["nbu_disk_bytes", "nbu_jobs_bytes", "nbu_jobs_count", "nbu_status_count"]
                    .iter()
                    .any(|name| line.contains(name))
            })
            .map(str::to_string)
            .collect()
    };

    let mut outputs = Vec::new();
    for version in ["3.0", "12.0", "13.0"] {
        let server = MockServer::start().await;
        server.accept_only(&[version]);
        let collector = collector(&server, CollectorOptions::default());

        let scrape = collector.collect(&Context::background()).await;
        assert!(scrape.is_ok(), "{version}: {:?}", scrape.error);
        assert_eq!(collector.version().map(|v| v.to_string()).as_deref(), Some(version));
        outputs.push(business(&render(&scrape)));
    }

    assert!(!outputs[0].is_empty());
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn describe_is_constant_under_load_and_after_close() {
    let server = MockServer::start().await;
    server.delay(Duration::from_millis(20));
    let collector = Arc::new(collector(&server, CollectorOptions::default()));
    assert_eq!(collector.describe().len(), DESCRIPTOR_COUNT);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let collector = Arc::clone(&collector);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                collector.collect(&Context::background()).await;
            }
            collector.describe().len()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), DESCRIPTOR_COUNT);
    }

    collector.close().await.unwrap();
    assert_eq!(collector.describe().len(), DESCRIPTOR_COUNT);
}

#[tokio::test]
async fn scrape_deadline_is_reported_and_counter_balanced() {
    let server = MockServer::start().await;
    server.delay(Duration::from_millis(500));
    let collector = collector(
        &server,
        CollectorOptions {
            version: Some(ProtocolVersion::new(13, 0)),
            ..CollectorOptions::default()
        },
    );

    let ctx = Context::background().with_timeout(Duration::from_millis(50));
    let scrape = collector.collect(&ctx).await;
    match &scrape.error {
        Some(ScrapeError::Fetch { source, .. }) => assert!(source.is_interrupted()),
        other => panic!("expected interrupted fetch, got {other:?}"),
    }
    assert_eq!(collector.in_flight(), 0);
}

#[tokio::test]
async fn oversized_jobs_window_reaches_back_to_epoch() {
    let server = MockServer::start().await;
    let collector = collector(
        &server,
        CollectorOptions {
            version: Some(ProtocolVersion::new(13, 0)),
            jobs_window: Duration::from_secs(1_000_000 * 365 * 86_400),
            ..CollectorOptions::default()
        },
    );

    let scrape = collector.collect(&Context::background()).await;
    assert!(scrape.is_ok(), "{:?}", scrape.error);
    assert_eq!(sample(&render(&scrape), "nbu_up"), Some(1.0));

    let jobs = server
        .requests()
        .into_iter()
        .find(|r| r.path.ends_with("/admin/jobs"))
        .expect("jobs request");
    assert_eq!(
        jobs.query_value("filter"),
        Some("endTime gt 1970-01-01T00:00:00Z")
    );
}
