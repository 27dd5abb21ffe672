use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{Context, ContextError};
use crate::endpoints;
use crate::error::ClientError;
use crate::transport::{Classified, Failure, Transport};
use crate::version::ProtocolVersion;

/// Version accepted by the server and the versions probed to find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub version: ProtocolVersion,
    pub attempted: Vec<ProtocolVersion>,
}

#[derive(Debug, Error)]
pub enum NegotiationFailure {
    #[error("no candidate version was accepted by the server")]
    Exhausted,
    #[error("{0}")]
    Aborted(#[source] ClientError),
    #[error("negotiation interrupted: {0}")]
    Interrupted(#[source] ContextError),
}

#[derive(Debug, Error)]
#[error("API version negotiation failed after trying [{}]: {kind}", Attempted(.attempted))]
pub struct NegotiationError {
    pub attempted: Vec<ProtocolVersion>,
    #[source]
    pub kind: NegotiationFailure,
}

impl NegotiationError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, NegotiationFailure::Exhausted)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.kind, NegotiationFailure::Interrupted(_))
    }
}

struct Attempted<'a>(&'a [ProtocolVersion]);

impl fmt::Display for Attempted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Probes candidate versions in order until the server accepts one.
#[derive(Debug, Clone, Copy)]
pub struct Negotiator<'a> {
    transport: &'a Transport,
}

impl<'a> Negotiator<'a> {
    pub fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Only HTTP 406 moves on to the next candidate; any other failure ends the
    /// probe sequence.
    pub async fn negotiate(
        &self,
        ctx: &Context,
        candidates: &[ProtocolVersion],
    ) -> Result<Negotiated, NegotiationError> {
        let mut attempted = Vec::with_capacity(candidates.len());

        for &version in candidates {
            if let Some(err) = ctx.err() {
                return Err(NegotiationError {
                    attempted,
                    kind: NegotiationFailure::Interrupted(err),
                });
            }

            attempted.push(version);
            debug!(%version, "probing API version");

            let url = || self.transport.url_string(&endpoints::probe_request());
            let err = match endpoints::probe(self.transport, ctx, version).await {
                Classified::Success(_) => {
                    info!(%version, attempts = attempted.len(), "API version negotiated");
                    return Ok(Negotiated { version, attempted });
                }
                Classified::VersionRejected => {
                    debug!(%version, "API version rejected by server");
                    continue;
                }
                Classified::TransportFailure(Failure::Interrupted(err)) => {
                    return Err(NegotiationError {
                        attempted,
                        kind: NegotiationFailure::Interrupted(err),
                    });
                }
                Classified::TransportFailure(failure) => failure.into_error(url(), version),
                Classified::ContentTypeMismatch {
                    content_type,
                    preview,
                } => ClientError::ContentTypeMismatch {
                    url: url(),
                    content_type,
                    preview,
                },
                Classified::DecodeFailure { preview, cause } => ClientError::Decode {
                    url: url(),
                    preview,
                    source: cause,
                },
            };

            warn!(%version, error = %err, "API version negotiation aborted");
            return Err(NegotiationError {
                attempted,
                kind: NegotiationFailure::Aborted(err),
            });
        }

        warn!(attempted = %Attempted(&attempted), "no API version accepted by server");
        Err(NegotiationError {
            attempted,
            kind: NegotiationFailure::Exhausted,
        })
    }
}
