use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "flakefinder",
    version,
    about = "Find and rank flaky tests from CI build history"
)]
pub struct Cli {
    /// Log line format on stderr (filter with RUST_LOG)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Report over the CI server's lanes
    Jenkins(JenkinsArgs),
    /// Report over the latest-commit builds of pull requests
    PullRequests(PullRequestArgs),
    /// Release quarantined tests that have become stable
    Dequarantine(DequarantineArgs),
    /// Print the file name a report would be written to
    ReportName(ReportNameArgs),
}

/// Flags shared by the report-producing commands. Unset flags fall back to
/// the `FLAKEFINDER_*` environment and then to built-in defaults.
#[derive(Args, Clone, Debug, Default)]
pub struct WindowArgs {
    /// How far back the report looks, e.g. `14d` or `72h`
    #[arg(long, value_parser = parse_lookback)]
    pub lookback: Option<humantime::Duration>,

    /// End of the report window (RFC 3339), defaults to now
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct FetchArgs {
    /// Maximum requests in flight against the upstream services
    #[arg(long)]
    pub max_concurrent_fetches: Option<usize>,

    /// Per-request timeout, e.g. `30s`
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Retries for transient upstream failures
    #[arg(long)]
    pub max_retries: Option<u32>,
}

#[derive(Args, Clone, Debug)]
pub struct JenkinsArgs {
    /// CI server base URL
    #[arg(long)]
    pub ci_url: Option<String>,

    /// Only lanes whose name matches this regex
    #[arg(long)]
    pub lane_pattern: Option<String>,

    /// Directory receiving the HTML report and JSON snapshot
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Clone, Debug)]
pub struct PullRequestArgs {
    /// Repository as `org/repo`
    #[arg(long, default_value = "kubevirt/kubevirt")]
    pub repo: String,

    /// Pull request number (repeatable). Without it, the pull requests
    /// merged during the report window are searched for.
    #[arg(long = "pr")]
    pub prs: Vec<u64>,

    /// Blob store base URL
    #[arg(long)]
    pub storage_url: Option<String>,

    /// Bucket holding the PR build logs
    #[arg(long)]
    pub bucket: Option<String>,

    /// Source-control API base URL
    #[arg(long)]
    pub github_url: Option<String>,

    /// Also count builds that finished before the report window
    #[arg(long)]
    pub include_older: bool,

    /// Directory receiving the HTML report and JSON snapshot
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Clone, Debug)]
pub struct DequarantineArgs {
    /// JSON snapshot written by a previous report run
    #[arg(long)]
    pub report: PathBuf,

    /// JSON list of quarantine records
    #[arg(long)]
    pub quarantine: PathBuf,

    /// Write the records that stay quarantined here
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Passed runs a test needs before it may leave quarantine
    #[arg(long)]
    pub minimum_passed_runs: Option<u32>,
}

#[derive(Args, Clone, Debug)]
pub struct ReportNameArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    /// Print the JSON snapshot name instead of the HTML report name
    #[arg(long)]
    pub snapshot: bool,
}

fn parse_lookback(value: &str) -> Result<humantime::Duration, String> {
    let duration: humantime::Duration = value.parse().map_err(|e| format!("{e}"))?;
    if duration.as_secs() % 3600 != 0 || duration.as_secs() == 0 {
        return Err(format!(
            "lookback must be a positive number of whole hours, got {value}"
        ));
    }
    Ok(duration)
}
