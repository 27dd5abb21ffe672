//! NetBackup REST API client used by the exporter.
//!
//! - [`Transport`] performs one version-tagged GET and classifies the response.
//! - [`Negotiator`] finds the newest API version the server accepts.
//! - [`endpoints`] wraps the list queries the exporter scrapes.
//!
//! Every blocking call takes a [`Context`] that carries cancellation and a deadline.

mod context;
pub use context::{Context, ContextError};

mod error;
pub use error::ClientError;

mod version;
pub use version::{ParseVersionError, ProtocolVersion, SUPPORTED_VERSIONS};

pub mod trace;
pub use trace::{LogTracer, NoopTracer, Tracer};

mod transport;
pub use transport::{
    Classified, Failure, MEDIA_TYPE, PREVIEW_CHARS, Request, Transport, TransportConfig,
    accept_header, preview,
};

mod negotiate;
pub use negotiate::{Negotiated, NegotiationError, NegotiationFailure, Negotiator};

pub mod endpoints;
pub mod model;

#[cfg(feature = "test-utils")]
pub mod testing;
