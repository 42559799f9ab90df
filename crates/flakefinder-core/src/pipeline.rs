//! End-to-end drivers: from upstream sources to a finished report matrix.
//!
//! Both drivers fan out one task per lane (or pull request) into a
//! `JoinSet`, push observations into the single aggregator task, and abort
//! everything on the first fatal error.

use std::sync::Arc;

use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::aggregator::{spawn_aggregator, ObservationSender};
use crate::config::FinderConfig;
use crate::consistency::is_latest_commit;
use crate::error::{FinderError, FinderResult};
use crate::fetcher::{bounded, BuildFetcher};
use crate::junit;
use crate::locator::{pr_directory, ArtifactLocator};
use crate::model::{BuildObservation, ReportMatrix, ReportWindow, TestSuite};
use crate::retry::Retrier;
use crate::source::{BlobStore, BuildInfo, BuildSource, PullRequest, PullRequestSource};

pub const FINISHED_JSON: &str = "finished.json";
pub const STARTED_JSON: &str = "started.json";
pub const PR_JUNIT_ARTIFACT: &str = "artifacts/junit.functest.xml";

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub matrix: ReportMatrix,
    pub window: ReportWindow,
    /// Builds folded into the matrix.
    pub builds: usize,
    /// Pull requests the run covered, empty for lane runs.
    pub pull_requests: Vec<u64>,
}

/// Report over every CI lane matching `lane_pattern`.
pub async fn run_jenkins(
    source: Arc<dyn BuildSource>,
    config: &FinderConfig,
    window: ReportWindow,
) -> FinderResult<PipelineOutput> {
    config.validate()?;
    let lane_pattern = config.lane_regex()?;
    let artifact_pattern = config.artifact_regex()?;
    let fetcher = BuildFetcher::from_config(source, config);

    let lanes: Vec<String> = fetcher
        .list_lanes()
        .await?
        .into_iter()
        .filter(|lane| lane_pattern.is_match(lane))
        .collect();
    info!(lanes = lanes.len(), pattern = %lane_pattern, "lanes matched");

    let (tx, aggregator) = spawn_aggregator();
    let mut tasks = JoinSet::new();
    for lane in lanes {
        let fetcher = fetcher.clone();
        let artifact_pattern = artifact_pattern.clone();
        let tx = tx.clone();
        tasks.spawn(async move { collect_lane(&fetcher, &lane, &artifact_pattern, window, tx).await });
    }
    drop(tx);

    let builds = match join_all(&mut tasks).await {
        Ok(builds) => builds,
        Err(e) => {
            aggregator.abort();
            return Err(e);
        }
    };
    let matrix = aggregator.await.map_err(FinderError::task)?;

    info!(builds, tests = matrix.len(), "jenkins run complete");
    Ok(PipelineOutput {
        matrix,
        window,
        builds,
        pull_requests: Vec::new(),
    })
}

async fn collect_lane(
    fetcher: &BuildFetcher,
    lane: &str,
    artifact_pattern: &Regex,
    window: ReportWindow,
    tx: ObservationSender,
) -> FinderResult<usize> {
    let Some(last) = fetcher.last_build_number(lane).await? else {
        info!(lane, "lane has no builds");
        return Ok(0);
    };

    let builds = fetcher.fetch_builds(lane, last, window.start).await?;
    let mut folded = 0;
    for build in builds {
        let number = build.number;
        let reports = download_reports(fetcher, lane, &build, artifact_pattern)
            .await
            .map_err(|e| e.in_build(lane, number))?;
        if reports.is_empty() {
            info!(lane, build = number, "no junit artifacts, skipping build");
            continue;
        }
        let observation =
            BuildObservation::from_reports(lane, number, 0, &reports, build.started_at());
        tx.send(observation).await.map_err(FinderError::task)?;
        folded += 1;
    }
    Ok(folded)
}

async fn download_reports(
    fetcher: &BuildFetcher,
    lane: &str,
    build: &BuildInfo,
    artifact_pattern: &Regex,
) -> FinderResult<Vec<Vec<TestSuite>>> {
    let mut reports = Vec::new();
    for artifact in build
        .artifacts
        .iter()
        .filter(|a| artifact_pattern.is_match(&a.file_name))
    {
        match fetcher
            .fetch_artifact(lane, build.number, &artifact.relative_path)
            .await?
        {
            Some(bytes) => reports.push(junit::ingest(&bytes)?),
            None => info!(
                lane,
                build = build.number,
                artifact = %artifact.relative_path,
                "artifact vanished, skipping"
            ),
        }
    }
    Ok(reports)
}

/// Pull request scoped run.
#[derive(Clone)]
pub struct PullRequestRun {
    pub store: Arc<dyn BlobStore>,
    pub pulls: Arc<dyn PullRequestSource>,
    /// `org/repo`.
    pub repo: String,
    /// Pull requests to cover. When empty, the pull requests merged since
    /// the window start are searched for.
    pub numbers: Vec<u64>,
    /// Skip builds that finished before the window start.
    pub skip_before_window: bool,
}

/// Report over the latest-commit builds of the given pull requests.
pub async fn run_pull_requests(
    run: PullRequestRun,
    config: &FinderConfig,
    window: ReportWindow,
) -> FinderResult<PipelineOutput> {
    config.validate()?;
    let (org, name) = run
        .repo
        .split_once('/')
        .filter(|(org, name)| !org.is_empty() && !name.is_empty())
        .ok_or_else(|| FinderError::Config {
            message: format!("repository {:?} is not of the form org/repo", run.repo),
        })?;
    let (org, name) = (org.to_string(), name.to_string());

    let retrier = Retrier::from_config(config);
    let permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));
    let locator = ArtifactLocator::new(run.store.clone(), retrier.clone(), permits.clone());
    let scanner = PrScanner {
        store: run.store.clone(),
        locator,
        retrier,
        permits,
        skip_before_window: run.skip_before_window,
        window,
    };

    let numbers = if run.numbers.is_empty() {
        discover_pull_requests(&scanner, run.pulls.as_ref(), &org, &name, window).await?
    } else {
        run.numbers.clone()
    };

    let (tx, aggregator) = spawn_aggregator();
    let mut tasks = JoinSet::new();
    for number in numbers.iter().copied() {
        let scanner = scanner.clone();
        let pulls = run.pulls.clone();
        let (org, name, repo) = (org.clone(), name.clone(), run.repo.clone());
        let tx = tx.clone();
        tasks.spawn(async move {
            let resource = format!("{repo}#{number}");
            let pr = bounded(&scanner.permits, &scanner.retrier, &resource, || {
                pulls.get_pull_request(&org, &name, number)
            })
            .await?;
            let Some(pr) = pr else {
                warn!(pr = number, repo = %repo, "pull request not found, skipping");
                return Ok(0);
            };
            scanner.scan(&repo, &pr, tx).await
        });
    }
    drop(tx);

    let builds = match join_all(&mut tasks).await {
        Ok(builds) => builds,
        Err(e) => {
            aggregator.abort();
            return Err(e);
        }
    };
    let matrix = aggregator.await.map_err(FinderError::task)?;

    info!(builds, tests = matrix.len(), "pull request run complete");
    Ok(PipelineOutput {
        matrix,
        window,
        builds,
        pull_requests: numbers,
    })
}

async fn discover_pull_requests(
    scanner: &PrScanner,
    pulls: &dyn PullRequestSource,
    org: &str,
    name: &str,
    window: ReportWindow,
) -> FinderResult<Vec<u64>> {
    let resource = format!("{org}/{name} merged pull requests");
    let mut numbers = bounded(&scanner.permits, &scanner.retrier, &resource, || {
        pulls.search_merged_pull_requests(org, name, window.start)
    })
    .await?
    .unwrap_or_default();
    numbers.sort_unstable();
    numbers.dedup();
    info!(org, repo = name, since = %window.start, found = numbers.len(), "merged pull requests found");
    Ok(numbers)
}

#[derive(Clone)]
struct PrScanner {
    store: Arc<dyn BlobStore>,
    locator: ArtifactLocator,
    retrier: Retrier,
    permits: Arc<Semaphore>,
    skip_before_window: bool,
    window: ReportWindow,
}

impl PrScanner {
    async fn scan(
        &self,
        repo: &str,
        pr: &PullRequest,
        tx: ObservationSender,
    ) -> FinderResult<usize> {
        let pr_dir = pr_directory(repo, pr.number);
        let mut folded = 0;

        for lane in self.locator.list_children(&pr_dir).await? {
            let lane_dir = format!("{pr_dir}/{lane}");
            for build in self.locator.locate_builds(&lane_dir).await? {
                let build_dir = format!("{lane_dir}/{build}");
                let observation = self
                    .scan_build(&build_dir, &lane, build, pr)
                    .await
                    .map_err(|e| e.in_build(&lane, build))?;
                if let Some(observation) = observation {
                    tx.send(observation).await.map_err(FinderError::task)?;
                    folded += 1;
                }
            }
        }

        info!(pr = pr.number, builds = folded, "pull request scanned");
        Ok(folded)
    }

    async fn scan_build(
        &self,
        build_dir: &str,
        lane: &str,
        build: u64,
        pr: &PullRequest,
    ) -> FinderResult<Option<BuildObservation>> {
        let finished_path = format!("{build_dir}/{FINISHED_JSON}");
        let Some(finished) = self
            .bounded(&finished_path, || self.store.object_attrs(&finished_path))
            .await?
        else {
            info!(lane, build, "no finished.json, build still running?");
            return Ok(None);
        };
        if self.skip_before_window && !self.window.includes(finished.created) {
            info!(lane, build, finished = %finished.created, "finished before report window, skipping");
            return Ok(None);
        }

        let started_path = format!("{build_dir}/{STARTED_JSON}");
        let Some(started) = self
            .bounded(&started_path, || self.store.read_object(&started_path))
            .await?
        else {
            info!(lane, build, "no started.json, skipping");
            return Ok(None);
        };
        if !is_latest_commit(&started, pr) {
            info!(lane, build, pr = pr.number, head = %pr.head.sha, "build did not test the latest commit, skipping");
            return Ok(None);
        }

        let junit_path = format!("{build_dir}/{PR_JUNIT_ARTIFACT}");
        let Some(bytes) = self
            .bounded(&junit_path, || self.store.read_object(&junit_path))
            .await?
        else {
            info!(lane, build, path = %junit_path, "no junit report, skipping");
            return Ok(None);
        };
        let suites = junit::ingest(&bytes)?;

        Ok(Some(BuildObservation::from_reports(
            lane,
            build,
            pr.number,
            &[suites],
            finished.created,
        )))
    }

    async fn bounded<T, F, Fut>(&self, resource: &str, op: F) -> FinderResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = FinderResult<T>>,
    {
        bounded(&self.permits, &self.retrier, resource, op).await
    }
}

/// Sum task results; on the first error abort the rest and return it.
async fn join_all(tasks: &mut JoinSet<FinderResult<usize>>) -> FinderResult<usize> {
    let mut total = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(count)) => total += count,
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(FinderError::task(e));
            }
        }
    }
    Ok(total)
}
