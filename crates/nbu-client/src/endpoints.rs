use serde::de::IgnoredAny;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::context::Context;
use crate::error::ClientError;
use crate::model::{Document, Job, StorageUnit};
use crate::transport::{Classified, Request, Transport};
use crate::version::ProtocolVersion;

pub const JOBS_PATH: &str = "/admin/jobs";
pub const STORAGE_UNITS_PATH: &str = "/storage/storage-units";

/// Minimal list query used to test whether a version is accepted.
pub fn probe_request() -> Request {
    Request::get(JOBS_PATH).query("page[limit]", "1")
}

/// Issues the negotiation probe with `version`.
pub async fn probe(
    transport: &Transport,
    ctx: &Context,
    version: ProtocolVersion,
) -> Classified<Document<IgnoredAny>> {
    transport.execute(ctx, &probe_request(), version).await
}

/// Storage units, first page only.
pub async fn storage_units(
    transport: &Transport,
    ctx: &Context,
    version: ProtocolVersion,
    page_limit: u32,
) -> Result<Vec<StorageUnit>, ClientError> {
    let request = Request::get(STORAGE_UNITS_PATH).query("page[limit]", page_limit.to_string());
    let doc: Document<StorageUnit> = transport.fetch(ctx, &request, version).await?;
    Ok(doc.data.into_iter().map(|r| r.attributes).collect())
}

/// Jobs that ended after `since`, following pagination up to `max_pages`.
pub async fn jobs_since(
    transport: &Transport,
    ctx: &Context,
    version: ProtocolVersion,
    since: OffsetDateTime,
    page_limit: u32,
    max_pages: u32,
) -> Result<Vec<Job>, ClientError> {
    let filter = format!("endTime gt {}", format_timestamp(since)?);
    let mut jobs = Vec::new();
    let mut offset = 0_u64;

    for page in 0..max_pages {
        let request = Request::get(JOBS_PATH)
            .query("page[limit]", page_limit.to_string())
            .query("page[offset]", offset.to_string())
            .query("filter", filter.as_str());
        let doc: Document<Job> = transport.fetch(ctx, &request, version).await?;

        let next = doc.next_offset();
        let received = doc.data.len();
        jobs.extend(doc.data.into_iter().map(|r| r.attributes));

        match next {
            Some(next) if received > 0 => offset = next,
            _ => break,
        }
        if page + 1 == max_pages {
            debug!(max_pages, offset, "jobs pagination stopped at page limit");
        }
    }
    Ok(jobs)
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String, ClientError> {
    ts.replace_nanosecond(0)
        .map_err(|e| ClientError::InvalidRequest(format!("timestamp: {e}")))?
        .format(&Rfc3339)
        .map_err(|e| ClientError::InvalidRequest(format!("timestamp: {e}")))
}
