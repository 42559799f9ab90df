//! Flaky test detection and ranking from CI build history.
//!
//! The pipeline, leaves first:
//!
//! - locate builds of a lane or pull request
//! - fetch build metadata and JUnit artifacts with bounded concurrency,
//!   retry with jittered backoff and a shared circuit breaker
//! - drop pull request builds that did not test the current head commit
//! - fold every build's test outcomes into a test × lane matrix
//! - classify each cell and rank the tests, most suspicious first
//! - write an HTML report and a JSON snapshot
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use flakefinder_core::{
//!     pipeline, report, FinderConfig, JenkinsClient, ReportData,
//! };
//!
//! # async fn example() -> Result<(), flakefinder_core::FinderError> {
//! let config = FinderConfig::from_env().with_lookback_hours(72);
//! let source = Arc::new(JenkinsClient::new(&config)?);
//! let window = config.report_window(None)?;
//!
//! let output = pipeline::run_jenkins(source, &config, window).await?;
//! let data = ReportData::new(&output.matrix, output.window).with_ci_url(&config.ci_url);
//! report::write_report(&data, std::path::Path::new("reports"))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `FLAKEFINDER_CI_URL` | CI server base URL (default: `http://localhost:8080`) |
//! | `FLAKEFINDER_STORAGE_URL` | Blob store base URL |
//! | `FLAKEFINDER_BUCKET` | Bucket holding PR build logs (default: `kubevirt-prow`) |
//! | `FLAKEFINDER_GITHUB_URL` | Source-control API base URL |
//! | `FLAKEFINDER_TOKEN` | Source-control API token |
//! | `FLAKEFINDER_LANE_PATTERN` | Lane name regex (default: `.*`) |
//! | `FLAKEFINDER_LOOKBACK_HOURS` | Report window in hours (default: 336) |
//! | `FLAKEFINDER_MAX_CONCURRENT_FETCHES` | In-flight request limit (default: 5) |
//! | `FLAKEFINDER_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `FLAKEFINDER_MAX_RETRIES` | Max retries for transient failures (default: 5) |

pub mod aggregator;
pub mod breaker;
pub mod client;
pub mod config;
pub mod consistency;
pub mod dequarantine;
pub mod error;
pub mod fetcher;
pub mod junit;
pub mod locator;
pub mod model;
pub mod namer;
pub mod pipeline;
pub mod ranker;
pub mod report;
pub mod retry;
pub mod severity;
pub mod source;

// Re-export main types
pub use aggregator::{aggregate, spawn_aggregator, ResultAggregator};
pub use breaker::{BreakerState, CircuitBreaker};
pub use client::{GcsClient, GitHubClient, JenkinsClient};
pub use config::FinderConfig;
pub use consistency::is_latest_commit;
pub use error::{FinderError, FinderResult};
pub use fetcher::BuildFetcher;
pub use locator::{sort_builds, ArtifactLocator};
pub use model::{
    BuildObservation, CellDetails, Occurrence, ReportMatrix, ReportWindow, TestCase, TestOutcome,
    TestSuite,
};
pub use namer::{report_file_name, snapshot_file_name};
pub use pipeline::{PipelineOutput, PullRequestRun};
pub use ranker::{rank, rank_with};
pub use report::{write_report, ReportData, ReportPaths};
pub use retry::{Retrier, RetryPolicy};
pub use severity::{classify, SeverityTier};
pub use source::{
    BlobStore, BuildArtifact, BuildInfo, BuildResult, BuildSource, ObjectAttrs, PullRequest,
    PullRequestSource,
};
