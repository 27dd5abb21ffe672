//! JSON:API payloads returned by the NetBackup REST API.
//!
//! All three supported API revisions share the document envelope. Attribute
//! fields that a revision omits fall back to their defaults, so the same types
//! decode every revision.

use serde::Deserialize;

/// Top-level JSON:API document.
#[derive(Debug, Clone, Deserialize)]
pub struct Document<A> {
    pub data: Vec<Resource<A>>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

impl<A> Document<A> {
    /// Offset of the next page, if the server announced one past `current`.
    pub fn next_offset(&self) -> Option<u64> {
        let pagination = self.meta.as_ref()?.pagination.as_ref()?;
        match (pagination.next, pagination.offset) {
            (Some(next), Some(offset)) if next > offset => Some(next),
            (Some(next), None) if next > 0 => Some(next),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource<A> {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    pub attributes: A,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<u64>,
    #[serde(default)]
    pub last: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageUnit {
    pub name: String,
    pub storage_type: String,
    pub storage_sub_type: String,
    pub free_capacity_bytes: u64,
    pub used_capacity_bytes: u64,
    pub total_capacity_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Job {
    pub job_id: u64,
    pub job_type: String,
    pub policy_type: String,
    pub policy_name: String,
    pub status: i64,
    pub state: String,
    pub kilobytes_transferred: u64,
    pub end_time: Option<String>,
}
