//! HTTP surface of the NetBackup exporter.
//!
//! [`MetricsApi`] mounts the scrape endpoint and a landing page on an axum
//! [`Router`](axum::Router). Serving and shutdown are left to the caller.

mod http;
pub use http::MetricsApi;

pub use axum;
