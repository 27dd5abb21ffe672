use thiserror::Error;

use crate::context::ContextError;
use crate::version::ProtocolVersion;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} {reason} from {url} (API version {version})")]
    Status {
        status: u16,
        reason: String,
        url: String,
        version: ProtocolVersion,
    },

    #[error("API version {version} is not supported by the server (HTTP 406 Not Acceptable from {url})")]
    VersionRejected { version: ProtocolVersion, url: String },

    #[error("unexpected content type {content_type:?} from {url}, body: {preview:?}")]
    ContentTypeMismatch {
        url: String,
        content_type: String,
        preview: String,
    },

    #[error("failed to decode response from {url}: {source}, body: {preview:?}")]
    Decode {
        url: String,
        preview: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request to {url} interrupted: {source}")]
    Interrupted {
        url: String,
        #[source]
        source: ContextError,
    },
}

impl ClientError {
    pub fn is_version_rejected(&self) -> bool {
        matches!(self, ClientError::VersionRejected { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ClientError::Interrupted { .. })
    }
}
