//! Source-control adapter (GitHub REST API).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use tracing::debug;

use super::http::{trim_base, HttpBackend};
use crate::config::FinderConfig;
use crate::error::FinderResult;
use crate::source::{PullRequest, PullRequestSource};

/// Results per search page, the API maximum.
pub const SEARCH_PAGE_SIZE: usize = 100;
/// The search API serves at most this many results for one query.
pub const SEARCH_RESULT_LIMIT: u64 = 1000;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: HttpBackend,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
}

impl GitHubClient {
    pub fn new(config: &FinderConfig) -> FinderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        Ok(Self {
            http: HttpBackend::with_headers(
                config.request_timeout(),
                config.token.clone(),
                headers,
            )?,
            base_url: trim_base(&config.github_url),
        })
    }
}

/// Issue search query for pull requests of `org/repo` merged since the
/// start of the UTC day of `since`.
pub fn make_query(org: &str, repo: &str, since: DateTime<Utc>) -> String {
    format!(
        "repo:{org}/{repo} is:merged is:pr merged:>={}T00:00:00Z",
        since.format("%Y-%m-%d")
    )
}

#[async_trait]
impl PullRequestSource for GitHubClient {
    async fn get_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> FinderResult<PullRequest> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.base_url,
            urlencoding::encode(org),
            urlencoding::encode(repo),
            number
        );
        self.http.get_json(&url).await
    }

    async fn search_merged_pull_requests(
        &self,
        org: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> FinderResult<Vec<u64>> {
        let query = make_query(org, repo, since);
        let mut numbers = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/search/issues?q={}&per_page={}&page={}",
                self.base_url,
                urlencoding::encode(&query),
                SEARCH_PAGE_SIZE,
                page
            );
            let result: SearchPage = self.http.get_json(&url).await?;
            let received = result.items.len();
            numbers.extend(result.items.into_iter().map(|item| item.number));
            debug!(page, received, total = result.total_count, "search page");

            let wanted = result.total_count.min(SEARCH_RESULT_LIMIT);
            if received < SEARCH_PAGE_SIZE || numbers.len() as u64 >= wanted {
                break;
            }
            page += 1;
        }
        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn query_starts_at_the_beginning_of_the_day() {
        let since = Utc.with_ymd_and_hms(2019, 8, 20, 17, 45, 3).unwrap();
        assert_eq!(
            make_query("kubevirt", "kubevirt", since),
            "repo:kubevirt/kubevirt is:merged is:pr merged:>=2019-08-20T00:00:00Z"
        );
    }

    #[test]
    fn search_page_tolerates_missing_items() {
        let page: SearchPage = serde_json::from_str(r#"{"total_count": 0}"#).unwrap();
        assert_eq!(page.total_count, 0);
        assert!(page.items.is_empty());
    }
}
