//! Paged, bounded and retried build fetching.
//!
//! A lane's history is walked newest first, one page of build numbers at a
//! time. Every build of a page is fetched concurrently, but each fetch holds
//! a permit of a semaphore shared across lanes, so the CI server never sees
//! more than `max_concurrent_fetches` requests from one run.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::FinderConfig;
use crate::error::{FinderError, FinderResult};
use crate::retry::Retrier;
use crate::source::{BuildInfo, BuildSource};

/// Run `op` under a semaphore permit and the retry executor.
///
/// Not-found is a permanent gap and comes back as `Ok(None)`.
pub(crate) async fn bounded<T, F, Fut>(
    permits: &Semaphore,
    retrier: &Retrier,
    resource: &str,
    op: F,
) -> FinderResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FinderResult<T>>,
{
    let _permit = permits.acquire().await.map_err(FinderError::task)?;
    match retrier.run(resource, op).await {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            debug!(resource, "not found");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[derive(Clone)]
pub struct BuildFetcher {
    source: Arc<dyn BuildSource>,
    retrier: Retrier,
    permits: Arc<Semaphore>,
    page_size: u64,
}

impl BuildFetcher {
    pub fn new(
        source: Arc<dyn BuildSource>,
        retrier: Retrier,
        permits: Arc<Semaphore>,
        page_size: u64,
    ) -> Self {
        Self {
            source,
            retrier,
            permits,
            page_size: page_size.max(1),
        }
    }

    pub fn from_config(source: Arc<dyn BuildSource>, config: &FinderConfig) -> Self {
        Self::new(
            source,
            Retrier::from_config(config),
            Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            config.page_size,
        )
    }

    pub fn retrier(&self) -> &Retrier {
        &self.retrier
    }

    pub fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    pub async fn list_lanes(&self) -> FinderResult<Vec<String>> {
        let lanes = bounded(&self.permits, &self.retrier, "lanes", || {
            self.source.list_lanes()
        })
        .await?;
        Ok(lanes.unwrap_or_default())
    }

    /// Newest build number of a lane, `None` when the lane never built.
    pub async fn last_build_number(&self, lane: &str) -> FinderResult<Option<u64>> {
        let resource = format!("{lane}/lastBuild");
        bounded(&self.permits, &self.retrier, &resource, || {
            self.source.last_build_number(lane)
        })
        .await
    }

    /// One build, `None` when it does not exist.
    pub async fn fetch_build(&self, lane: &str, number: u64) -> FinderResult<Option<BuildInfo>> {
        let resource = format!("{lane}/{number}");
        bounded(&self.permits, &self.retrier, &resource, || {
            self.source.get_build(lane, number)
        })
        .await
    }

    /// One artifact, `None` when it does not exist.
    pub async fn fetch_artifact(
        &self,
        lane: &str,
        number: u64,
        relative_path: &str,
    ) -> FinderResult<Option<Vec<u8>>> {
        let resource = format!("{lane}/{number}/artifact/{relative_path}");
        bounded(&self.permits, &self.retrier, &resource, || {
            self.source.get_artifact(lane, number, relative_path)
        })
        .await
    }

    /// Completed `SUCCESS`/`UNSTABLE` builds of `lane` that started at or
    /// after `window_start`, newest first.
    ///
    /// Paging stops after the first page holding a build older than the
    /// window; the rest of that page is still drained. A fatal error aborts
    /// the page and is returned with lane and build attached.
    pub async fn fetch_builds(
        &self,
        lane: &str,
        last_build: u64,
        window_start: DateTime<Utc>,
    ) -> FinderResult<Vec<BuildInfo>> {
        let mut builds = Vec::new();
        let mut next = last_build;
        let mut reached_window_start = false;

        while next > 0 && !reached_window_start {
            let low = next.saturating_sub(self.page_size - 1).max(1);
            debug!(lane, from = next, to = low, "fetching page");

            let mut page = JoinSet::new();
            for number in (low..=next).rev() {
                let fetcher = self.clone();
                let lane = lane.to_string();
                page.spawn(async move { (number, fetcher.fetch_build(&lane, number).await) });
            }
            next = low - 1;

            while let Some(joined) = page.join_next().await {
                let (number, result) = joined.map_err(FinderError::task)?;
                match result {
                    Ok(Some(build)) => {
                        if build.started_at() < window_start {
                            debug!(lane, build = number, "build predates report window");
                            reached_window_start = true;
                        } else if build.is_running() {
                            info!(lane, build = number, "skipping running build");
                        } else if build.is_countable() {
                            builds.push(build);
                        } else {
                            info!(
                                lane,
                                build = number,
                                result = ?build.result,
                                "skipping build without usable results"
                            );
                        }
                    }
                    Ok(None) => info!(lane, build = number, "build not found, skipping"),
                    Err(e) => {
                        page.abort_all();
                        return Err(e.in_build(lane, number));
                    }
                }
            }
        }

        builds.sort_by(|a, b| b.number.cmp(&a.number));
        info!(lane, builds = builds.len(), "lane builds fetched");
        Ok(builds)
    }
}
