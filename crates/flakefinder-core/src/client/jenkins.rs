//! CI server adapter (Jenkins JSON API).

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{encode_path, trim_base, HttpBackend};
use crate::config::FinderConfig;
use crate::error::FinderResult;
use crate::source::{BuildInfo, BuildSource};

#[derive(Debug, Clone)]
pub struct JenkinsClient {
    http: HttpBackend,
    base_url: String,
}

#[derive(Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobName>,
}

#[derive(Deserialize)]
struct JobName {
    name: String,
}

#[derive(Deserialize)]
struct BuildNumber {
    number: u64,
}

impl JenkinsClient {
    pub fn new(config: &FinderConfig) -> FinderResult<Self> {
        Ok(Self {
            http: HttpBackend::new(config.request_timeout(), None)?,
            base_url: trim_base(&config.ci_url),
        })
    }

    /// Browser URL of a build, used for report links.
    pub fn build_url(base_url: &str, lane: &str, number: u64) -> String {
        format!(
            "{}/job/{}/{}/",
            trim_base(base_url),
            urlencoding::encode(lane),
            number
        )
    }

    fn job_url(&self, lane: &str) -> String {
        format!("{}/job/{}", self.base_url, urlencoding::encode(lane))
    }
}

#[async_trait]
impl BuildSource for JenkinsClient {
    async fn list_lanes(&self) -> FinderResult<Vec<String>> {
        let url = format!("{}/api/json?tree=jobs[name]", self.base_url);
        let list: JobList = self.http.get_json(&url).await?;
        Ok(list.jobs.into_iter().map(|job| job.name).collect())
    }

    async fn last_build_number(&self, lane: &str) -> FinderResult<u64> {
        let url = format!("{}/lastBuild/api/json?tree=number", self.job_url(lane));
        let last: BuildNumber = self.http.get_json(&url).await?;
        Ok(last.number)
    }

    async fn get_build(&self, lane: &str, number: u64) -> FinderResult<BuildInfo> {
        let url = format!(
            "{}/{}/api/json?tree=number,result,timestamp,building,artifacts[fileName,relativePath]",
            self.job_url(lane),
            number
        );
        self.http.get_json(&url).await
    }

    async fn get_artifact(
        &self,
        lane: &str,
        number: u64,
        relative_path: &str,
    ) -> FinderResult<Vec<u8>> {
        let url = format!(
            "{}/{}/artifact/{}",
            self.job_url(lane),
            number,
            encode_path(relative_path)
        );
        self.http.get_bytes(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_encodes_lane() {
        assert_eq!(
            JenkinsClient::build_url("https://ci.example/", "test kubevirt", 12),
            "https://ci.example/job/test%20kubevirt/12/"
        );
    }
}
