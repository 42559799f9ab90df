//! HTTP adapters for the CI server, blob store and source-control host.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

mod gcs;
mod github;
mod http;
mod jenkins;

pub use gcs::GcsClient;
pub use github::{make_query, GitHubClient};
pub use http::FLAKEFINDER_USER_AGENT;
pub use jenkins::JenkinsClient;
