use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::context::{Context, ContextError};
use crate::error::ClientError;
use crate::trace::{NoopTracer, Span, Tracer};
use crate::version::ProtocolVersion;

/// Vendor media type carried in `Accept` together with the version parameter.
pub const MEDIA_TYPE: &str = "application/vnd.netbackup+json";

/// Response media types treated as JSON.
const ACCEPTED_CONTENT_TYPES: [&str; 2] = [MEDIA_TYPE, "application/json"];

/// Upper bound on the body excerpt kept in errors.
pub const PREVIEW_CHARS: usize = 200;

/// Connection settings for [`Transport`].
#[derive(Clone)]
pub struct TransportConfig {
    /// `<scheme>://<host>:<port><uri-prefix>`, e.g. `https://nbu:1556/netbackup`.
    pub base_url: String,
    /// Sent verbatim in the `Authorization` header.
    pub credential: String,
    pub insecure_skip_verify: bool,
    pub tracer: Arc<dyn Tracer>,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credential: credential.into(),
            insecure_skip_verify: false,
            tracer: Arc::new(NoopTracer),
        }
    }

    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("base_url", &self.base_url)
            .field("credential", &"<redacted>")
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("tracer", &self.tracer)
            .finish()
    }
}

/// GET request relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    path: String,
    query: Vec<(String, String)>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Why an exchange did not produce a usable HTTP response.
#[derive(Debug)]
pub enum Failure {
    InvalidRequest(String),
    Network(reqwest::Error),
    Status { code: u16, reason: String },
    Interrupted(ContextError),
}

/// Outcome of a single HTTP exchange.
#[derive(Debug)]
pub enum Classified<T> {
    Success(T),
    VersionRejected,
    ContentTypeMismatch {
        content_type: String,
        preview: String,
    },
    DecodeFailure {
        preview: String,
        cause: serde_json::Error,
    },
    TransportFailure(Failure),
}

impl<T> Classified<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Classified::Success(_))
    }

    /// Short label used for logging and span status.
    pub fn label(&self) -> &'static str {
        match self {
            Classified::Success(_) => "success",
            Classified::VersionRejected => "version_rejected",
            Classified::ContentTypeMismatch { .. } => "content_type_mismatch",
            Classified::DecodeFailure { .. } => "decode_failure",
            Classified::TransportFailure(_) => "transport_failure",
        }
    }

    /// Converts into a user-facing result, attaching `url` and `version` to errors.
    pub fn into_result(self, url: String, version: ProtocolVersion) -> Result<T, ClientError> {
        match self {
            Classified::Success(value) => Ok(value),
            Classified::VersionRejected => Err(ClientError::VersionRejected { version, url }),
            Classified::ContentTypeMismatch {
                content_type,
                preview,
            } => Err(ClientError::ContentTypeMismatch {
                url,
                content_type,
                preview,
            }),
            Classified::DecodeFailure { preview, cause } => Err(ClientError::Decode {
                url,
                preview,
                source: cause,
            }),
            Classified::TransportFailure(failure) => Err(failure.into_error(url, version)),
        }
    }
}

impl Failure {
    pub fn into_error(self, url: String, version: ProtocolVersion) -> ClientError {
        match self {
            Failure::InvalidRequest(msg) => ClientError::InvalidRequest(msg),
            Failure::Network(source) => ClientError::Network { url, source },
            Failure::Status { code, reason } => ClientError::Status {
                status: code,
                reason,
                url,
                version,
            },
            Failure::Interrupted(source) => ClientError::Interrupted { url, source },
        }
    }
}

/// Version-aware HTTP GET client for the NetBackup REST API.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    credential: String,
    tracer: Arc<dyn Tracer>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("base url {:?}: {e}", config.base_url)))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("nbu-exporter/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential: config.credential,
            tracer: config.tracer,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `request`; the raw concatenation if it does not parse.
    pub fn url_string(&self, request: &Request) -> String {
        match self.url_for(request) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.base_url, request.path),
        }
    }

    fn url_for(&self, request: &Request) -> Result<Url, String> {
        let raw = format!("{}{}", self.base_url, request.path);
        let mut url = Url::parse(&raw).map_err(|e| format!("url {raw:?}: {e}"))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    /// Performs one GET and classifies the response. Never retries.
    pub async fn execute<T>(
        &self,
        ctx: &Context,
        request: &Request,
        version: ProtocolVersion,
    ) -> Classified<T>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let mut span = self.tracer.start_span(&format!("GET {}", request.path));
        span.set_attribute("http.method", "GET".into());
        span.set_attribute("nbu.api_version", version.to_string().into());
        span.set_attribute("http.request_content_length", 0_i64.into());

        let outcome = match self.url_for(request) {
            Ok(url) => {
                span.set_attribute("http.url", url.to_string().into());
                self.exchange(ctx, url, version, span.as_mut()).await
            }
            Err(msg) => Classified::TransportFailure(Failure::InvalidRequest(msg)),
        };

        span.set_attribute(
            "http.duration_ms",
            (started.elapsed().as_secs_f64() * 1000.0).into(),
        );
        if !outcome.is_success() {
            span.record_error(outcome.label());
        }
        span.end();
        outcome
    }

    /// [`Transport::execute`] folded into a `Result`.
    pub async fn fetch<T>(
        &self,
        ctx: &Context,
        request: &Request,
        version: ProtocolVersion,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        self.execute(ctx, request, version)
            .await
            .into_result(self.url_string(request), version)
    }

    async fn exchange<T>(
        &self,
        ctx: &Context,
        url: Url,
        version: ProtocolVersion,
        span: &mut dyn Span,
    ) -> Classified<T>
    where
        T: DeserializeOwned,
    {
        let send = self
            .client
            .get(url)
            .header(ACCEPT, accept_header(version))
            .header(AUTHORIZATION, self.credential.as_str())
            .send();

        let response = match ctx.run(send).await {
            Err(err) => return Classified::TransportFailure(Failure::Interrupted(err)),
            Ok(Err(err)) => return Classified::TransportFailure(Failure::Network(err)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        span.set_attribute("http.status_code", i64::from(status.as_u16()).into());

        if status == StatusCode::NOT_ACCEPTABLE {
            return Classified::VersionRejected;
        }
        if !status.is_success() {
            return Classified::TransportFailure(Failure::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        let body = match ctx.run(response.bytes()).await {
            Err(err) => return Classified::TransportFailure(Failure::Interrupted(err)),
            Ok(Err(err)) => return Classified::TransportFailure(Failure::Network(err)),
            Ok(Ok(body)) => body,
        };
        span.set_attribute("http.response_content_length", (body.len() as i64).into());

        if let Some(content_type) = content_type
            && !is_json_content_type(&content_type)
        {
            return Classified::ContentTypeMismatch {
                content_type,
                preview: preview(&body),
            };
        }

        match serde_json::from_slice(&body) {
            Ok(value) => Classified::Success(value),
            Err(cause) => Classified::DecodeFailure {
                preview: preview(&body),
                cause,
            },
        }
    }
}

/// `Accept` header value for `version`.
pub fn accept_header(version: ProtocolVersion) -> String {
    format!("{MEDIA_TYPE};version={version}")
}

fn is_json_content_type(value: &str) -> bool {
    let media_type = value.split(';').next().unwrap_or("").trim();
    ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|accepted| media_type.eq_ignore_ascii_case(accepted))
}

/// First [`PREVIEW_CHARS`] characters of `body`, lossily decoded.
pub fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_header_carries_version() {
        assert_eq!(
            accept_header(ProtocolVersion::new(12, 0)),
            "application/vnd.netbackup+json;version=12.0"
        );
    }

    #[test]
    fn json_content_types_ignore_parameters_and_case() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("application/vnd.netbackup+json;version=13.0"));
        assert!(is_json_content_type("Application/VND.NetBackup+JSON"));
        assert!(!is_json_content_type("text/html"));
        assert!(!is_json_content_type("application/xml"));
        assert!(!is_json_content_type(""));
    }

    #[test]
    fn preview_is_bounded_by_chars() {
        let long = "x".repeat(1000);
        assert_eq!(preview(long.as_bytes()).chars().count(), PREVIEW_CHARS);

        let short = "<html>oops</html>";
        assert_eq!(preview(short.as_bytes()), short);

        let multibyte = "é".repeat(300);
        let cut = preview(multibyte.as_bytes());
        assert_eq!(cut.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn url_joins_prefix_path_and_query() {
        let transport = Transport::new(TransportConfig::new("http://nbu:1556/netbackup/", "key"))
            .expect("transport");
        let req = Request::get("/admin/jobs").query("page[limit]", "1");
        assert_eq!(
            transport.url_string(&req),
            "http://nbu:1556/netbackup/admin/jobs?page%5Blimit%5D=1"
        );

        let bare = Request::get("/storage/storage-units");
        assert_eq!(
            transport.url_string(&bare),
            "http://nbu:1556/netbackup/storage/storage-units"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = Transport::new(TransportConfig::new("not a url", "key")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn debug_redacts_credential() {
        let cfg = TransportConfig::new("http://nbu", "super-secret");
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
