//! Build discovery in the blob store.
//!
//! PR build logs are laid out as
//! `pr-logs/pull/<org>_<repo>/<pr>/<lane>/<build>/`.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use crate::error::FinderResult;
use crate::fetcher::bounded;
use crate::retry::Retrier;
use crate::source::BlobStore;

/// Last non-empty segment of a `/`-delimited path.
pub fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Build numbers from directory names, newest first.
///
/// Entries whose last segment is not a number are logged and dropped.
pub fn sort_builds<S: AsRef<str>>(names: &[S]) -> Vec<u64> {
    let mut builds: Vec<u64> = names
        .iter()
        .filter_map(|name| {
            let segment = last_segment(name.as_ref());
            match segment.parse::<u64>() {
                Ok(number) => Some(number),
                Err(_) => {
                    info!(entry = name.as_ref(), "non-numeric build entry");
                    None
                }
            }
        })
        .collect();
    builds.sort_unstable_by(|a, b| b.cmp(a));
    builds
}

/// Directory holding every lane of one pull request.
pub fn pr_directory(repo: &str, pr: u64) -> String {
    format!("pr-logs/pull/{}/{}", repo.replace('/', "_"), pr)
}

#[derive(Clone)]
pub struct ArtifactLocator {
    store: Arc<dyn BlobStore>,
    retrier: Retrier,
    permits: Arc<Semaphore>,
}

impl ArtifactLocator {
    pub fn new(store: Arc<dyn BlobStore>, retrier: Retrier, permits: Arc<Semaphore>) -> Self {
        Self {
            store,
            retrier,
            permits,
        }
    }

    /// Names of the direct children of `dir`. A missing directory is empty.
    pub async fn list_children(&self, dir: &str) -> FinderResult<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let prefixes = bounded(&self.permits, &self.retrier, &prefix, || {
            self.store.list_prefixes(&prefix)
        })
        .await?
        .unwrap_or_default();

        Ok(prefixes
            .iter()
            .map(|p| last_segment(p).to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Build numbers under a lane directory, newest first.
    pub async fn locate_builds(&self, lane_dir: &str) -> FinderResult<Vec<u64>> {
        let children = self.list_children(lane_dir).await?;
        Ok(sort_builds(&children))
    }
}
