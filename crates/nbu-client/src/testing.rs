//! In-process NetBackup API double for tests.
//!
//! Serves `/admin/jobs` and `/storage/storage-units` under `/netbackup`,
//! answers 406 for versions that are not accepted and records every request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::endpoints::{JOBS_PATH, STORAGE_UNITS_PATH};
use crate::transport::MEDIA_TYPE;

pub const PREFIX: &str = "/netbackup";
pub const API_KEY: &str = "A1b2C3-test-api-key";

pub const STORAGE_BODY: &str = r#"{
  "data": [
    {"type": "storageUnit", "id": "stu-disk-01", "attributes": {
      "name": "stu-disk-01", "storageType": "DISK", "storageSubType": "PureDisk",
      "freeCapacityBytes": 750000, "usedCapacityBytes": 250000, "totalCapacityBytes": 1000000}},
    {"type": "storageUnit", "id": "stu-tape-01", "attributes": {
      "name": "stu-tape-01", "storageType": "TAPE", "storageSubType": "",
      "freeCapacityBytes": 0, "usedCapacityBytes": 0, "totalCapacityBytes": 0}}
  ],
  "meta": {"pagination": {"offset": 0, "limit": 100, "count": 2, "last": 0}}
}"#;

pub const JOBS_BODY: &str = r#"{
  "data": [
    {"type": "job", "id": "101", "attributes": {
      "jobId": 101, "jobType": "BACKUP", "policyType": "VMWARE", "policyName": "vm-daily",
      "status": 0, "state": "DONE", "kilobytesTransferred": 2048, "endTime": "2024-05-01T10:00:00.000Z"}},
    {"type": "job", "id": "102", "attributes": {
      "jobId": 102, "jobType": "BACKUP", "policyType": "VMWARE", "policyName": "vm-daily",
      "status": 0, "state": "DONE", "kilobytesTransferred": 1024, "endTime": "2024-05-01T10:01:00.000Z"}},
    {"type": "job", "id": "103", "attributes": {
      "jobId": 103, "jobType": "RESTORE", "policyType": "STANDARD", "policyName": "fs",
      "status": 150, "state": "DONE", "kilobytesTransferred": 0, "endTime": "2024-05-01T10:02:00.000Z"}}
  ],
  "meta": {"pagination": {"offset": 0, "limit": 100, "count": 3, "last": 0}}
}"#;

/// Request as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub accept: Option<String>,
    pub authorization: Option<String>,
}

impl RecordedRequest {
    /// `version` parameter of the `Accept` header.
    pub fn version(&self) -> Option<String> {
        self.accept.as_deref().and_then(version_param)
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Negotiation probe: single-record jobs query without filter.
    pub fn is_probe(&self) -> bool {
        self.path.ends_with(JOBS_PATH)
            && self.query_value("page[limit]") == Some("1")
            && self.query_value("filter").is_none()
    }
}

struct MockState {
    accepted: Vec<String>,
    forced_status: Option<u16>,
    content_type: Option<String>,
    delay: Duration,
    bodies: HashMap<&'static str, String>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MockServer {
    addr: SocketAddr,
    state: Shared,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Starts a server accepting every supported version.
    pub async fn start() -> Self {
        let mut bodies = HashMap::new();
        bodies.insert(JOBS_PATH, JOBS_BODY.to_string());
        bodies.insert(STORAGE_UNITS_PATH, STORAGE_BODY.to_string());

        let state: Shared = Arc::new(Mutex::new(MockState {
            accepted: vec!["13.0".into(), "12.0".into(), "3.0".into()],
            forced_status: None,
            content_type: None,
            delay: Duration::ZERO,
            bodies,
            requests: Vec::new(),
        }));

        let router = Router::new().fallback(handle).with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state, task }
    }

    /// Base URL including the API prefix.
    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.addr, PREFIX)
    }

    pub fn accept_only(&self, versions: &[&str]) {
        lock(&self.state).accepted = versions.iter().map(|v| v.to_string()).collect();
    }

    /// Answers every request with `status` when set.
    pub fn force_status(&self, status: Option<u16>) {
        lock(&self.state).forced_status = status;
    }

    pub fn content_type(&self, content_type: Option<&str>) {
        lock(&self.state).content_type = content_type.map(str::to_string);
    }

    /// Delay applied to accepted requests before answering.
    pub fn delay(&self, delay: Duration) {
        lock(&self.state).delay = delay;
    }

    /// Replaces the body served for `JOBS_PATH` or `STORAGE_UNITS_PATH`.
    pub fn body(&self, path: &'static str, body: impl Into<String>) {
        lock(&self.state).bodies.insert(path, body.into());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn probes(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.is_probe()).collect()
    }

    /// Versions carried by the probes, in arrival order.
    pub fn probed_versions(&self) -> Vec<String> {
        self.probes().iter().filter_map(|r| r.version()).collect()
    }

    pub fn clear_requests(&self) {
        lock(&self.state).requests.clear();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(State(state): State<Shared>, uri: Uri, headers: HeaderMap) -> Response {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    };
    let recorded = RecordedRequest {
        path: uri.path().to_string(),
        query: decode_query(uri.query().unwrap_or("")),
        accept: text(header::ACCEPT),
        authorization: text(header::AUTHORIZATION),
    };
    let version = recorded.version().unwrap_or_default();

    let (forced, accepted, delay, content_type, body) = {
        let mut st = lock(&state);
        st.requests.push(recorded.clone());
        let body = st
            .bodies
            .iter()
            .find(|(path, _)| recorded.path.ends_with(*path))
            .map(|(_, body)| body.clone());
        (
            st.forced_status,
            st.accepted.contains(&version),
            st.delay,
            st.content_type.clone(),
            body,
        )
    };

    if let Some(code) = forced {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "forced failure").into_response();
    }
    if !accepted {
        return (
            StatusCode::NOT_ACCEPTABLE,
            r#"{"errorCode": 9, "errorMessage": "unsupported API version"}"#,
        )
            .into_response();
    }
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let Some(body) = body else {
        return (StatusCode::NOT_FOUND, "no such endpoint").into_response();
    };
    let content_type = content_type.unwrap_or_else(|| format!("{MEDIA_TYPE};version={version}"));
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn version_param(accept: &str) -> Option<String> {
    accept
        .split(';')
        .filter_map(|p| p.trim().strip_prefix("version="))
        .map(str::to_string)
        .next()
}

fn decode_query(raw: &str) -> Vec<(String, String)> {
    match reqwest::Url::parse(&format!("http://mock/?{raw}")) {
        Ok(url) => url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        Err(_) => Vec::new(),
    }
}
