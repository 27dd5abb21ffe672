#![allow(dead_code)]

use std::time::Duration;

use nbu_client::testing::{API_KEY, MockServer};
use nbu_client::{Transport, TransportConfig};
use nbu_prometheus::{CollectorOptions, Encoder, NbuCollector, Scrape, TextEncoder};

pub fn collector(server: &MockServer, options: CollectorOptions) -> NbuCollector {
    let transport =
        Transport::new(TransportConfig::new(server.base_url(), API_KEY)).expect("transport");
    NbuCollector::new(transport, options).expect("collector")
}

pub fn render(scrape: &Scrape) -> String {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&scrape.families, &mut buffer)
        .expect("encode");
    String::from_utf8(buffer).expect("utf8")
}

/// Value of an unlabelled sample, e.g. `nbu_up`.
pub fn sample(text: &str, name: &str) -> Option<f64> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (metric, value) = line.split_once(' ')?;
            (metric == name).then(|| value.parse().ok()).flatten()
        })
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
