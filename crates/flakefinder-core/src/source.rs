//! Collaborators the pipeline reads from.
//!
//! Every implementation performs a single attempt per call and reports
//! failures through [`FinderError`](crate::error::FinderError); retry and
//! circuit breaking live in [`crate::retry`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FinderResult;

/// Final status of a CI build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    Aborted,
    NotBuilt,
    #[serde(other)]
    Unknown,
}

/// One file published by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub file_name: String,
    pub relative_path: String,
}

/// Build metadata as reported by the CI server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub number: u64,
    /// `None` while the build is still running.
    #[serde(default)]
    pub result: Option<BuildResult>,
    /// Start time in milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
}

impl BuildInfo {
    pub fn started_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Still running, or finished without a result yet.
    pub fn is_running(&self) -> bool {
        self.building || self.result.is_none()
    }

    /// Completed with test results worth counting.
    pub fn is_countable(&self) -> bool {
        matches!(
            self.result,
            Some(BuildResult::Success) | Some(BuildResult::Unstable)
        ) && !self.building
    }
}

/// Metadata of one blob store object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttrs {
    pub name: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
}

/// The fields of a pull request the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub head: PullRequestHead,
}

impl PullRequest {
    pub fn new(number: u64, head_sha: impl Into<String>) -> Self {
        Self {
            number,
            head: PullRequestHead {
                sha: head_sha.into(),
            },
        }
    }
}

/// CI server holding lanes (jobs) and their numbered builds.
#[async_trait]
pub trait BuildSource: Send + Sync {
    async fn list_lanes(&self) -> FinderResult<Vec<String>>;

    async fn last_build_number(&self, lane: &str) -> FinderResult<u64>;

    async fn get_build(&self, lane: &str, number: u64) -> FinderResult<BuildInfo>;

    async fn get_artifact(
        &self,
        lane: &str,
        number: u64,
        relative_path: &str,
    ) -> FinderResult<Vec<u8>>;
}

/// Object store with `/`-delimited prefixes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Direct child prefixes of `prefix`, each ending in `/`.
    async fn list_prefixes(&self, prefix: &str) -> FinderResult<Vec<String>>;

    async fn read_object(&self, path: &str) -> FinderResult<Vec<u8>>;

    async fn object_attrs(&self, path: &str) -> FinderResult<ObjectAttrs>;
}

/// Source-control host.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    async fn get_pull_request(&self, org: &str, repo: &str, number: u64)
        -> FinderResult<PullRequest>;

    /// Numbers of the pull requests merged on or after the day of `since`.
    async fn search_merged_pull_requests(
        &self,
        org: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> FinderResult<Vec<u64>>;
}
