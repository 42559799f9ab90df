//! End-to-end pipeline runs against in-memory sources.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use flakefinder_core::pipeline::{self, PR_JUNIT_ARTIFACT};
use flakefinder_core::{
    rank, report, BlobStore, BuildArtifact, BuildInfo, BuildResult, BuildSource, FinderConfig,
    FinderError, FinderResult, ObjectAttrs, PullRequest, PullRequestRun, PullRequestSource,
    ReportData, ReportWindow, SeverityTier,
};

const ARTIFACT: &str = "exported-artifacts/junit.functest.xml";

fn junit(cases: &[(&str, bool)]) -> Vec<u8> {
    let mut xml = String::from(r#"<?xml version="1.0"?><testsuite name="functests">"#);
    for (name, ok) in cases {
        if *ok {
            xml.push_str(&format!(r#"<testcase name="{name}"/>"#));
        } else {
            xml.push_str(&format!(
                r#"<testcase name="{name}"><failure message="boom">trace</failure></testcase>"#
            ));
        }
    }
    xml.push_str("</testsuite>");
    xml.into_bytes()
}

#[derive(Default)]
struct MemoryCi {
    builds: HashMap<(String, u64), (BuildInfo, Vec<u8>)>,
    forbidden: Option<(String, u64)>,
}

impl MemoryCi {
    fn add(&mut self, lane: &str, number: u64, started: DateTime<Utc>, report: Vec<u8>) {
        let info = BuildInfo {
            number,
            result: Some(BuildResult::Unstable),
            timestamp: started.timestamp_millis(),
            building: false,
            artifacts: vec![BuildArtifact {
                file_name: "junit.functest.xml".into(),
                relative_path: ARTIFACT.into(),
            }],
        };
        self.builds.insert((lane.to_string(), number), (info, report));
    }
}

#[async_trait]
impl BuildSource for MemoryCi {
    async fn list_lanes(&self) -> FinderResult<Vec<String>> {
        let mut lanes: Vec<String> = self.builds.keys().map(|(lane, _)| lane.clone()).collect();
        lanes.sort();
        lanes.dedup();
        lanes.push("unrelated-lane".into());
        Ok(lanes)
    }

    async fn last_build_number(&self, lane: &str) -> FinderResult<u64> {
        self.builds
            .keys()
            .filter(|(l, _)| l == lane)
            .map(|(_, n)| *n)
            .max()
            .ok_or_else(|| FinderError::NotFound {
                resource: format!("{lane}/lastBuild"),
            })
    }

    async fn get_build(&self, lane: &str, number: u64) -> FinderResult<BuildInfo> {
        if self.forbidden.as_ref() == Some(&(lane.to_string(), number)) {
            return Err(FinderError::UnexpectedStatus {
                status: 403,
                resource: format!("{lane}/{number}"),
                message: "forbidden".into(),
            });
        }
        self.builds
            .get(&(lane.to_string(), number))
            .map(|(info, _)| info.clone())
            .ok_or_else(|| FinderError::NotFound {
                resource: format!("{lane}/{number}"),
            })
    }

    async fn get_artifact(
        &self,
        lane: &str,
        number: u64,
        relative_path: &str,
    ) -> FinderResult<Vec<u8>> {
        match self.builds.get(&(lane.to_string(), number)) {
            Some((_, report)) if relative_path == ARTIFACT => Ok(report.clone()),
            _ => Err(FinderError::NotFound {
                resource: format!("{lane}/{number}/{relative_path}"),
            }),
        }
    }
}

/// Test `T` always fails in lane-a and fails once in ten builds of lane-b.
fn flaky_ci(now: DateTime<Utc>) -> MemoryCi {
    let mut ci = MemoryCi::default();
    for number in 1..=3 {
        let started = now - Duration::hours(number as i64);
        ci.add("lane-a", number, started, junit(&[("T", false), ("stable", true)]));
    }
    for number in 2..=11 {
        let started = now - Duration::hours(number as i64);
        let t_passed = number != 4;
        ci.add("lane-b", number, started, junit(&[("T", t_passed), ("stable", true)]));
    }
    // Outside the window
    ci.add("lane-b", 1, now - Duration::days(30), junit(&[("stable", false)]));
    ci
}

fn config() -> FinderConfig {
    FinderConfig::default()
        .with_lane_pattern("^lane-")
        .with_lookback_hours(72)
}

#[tokio::test(start_paused = true)]
async fn test_jenkins_run_ranks_flaky_test_first() {
    let now = Utc::now();
    let window = ReportWindow::ending_at(now, Duration::hours(72)).unwrap();
    let source: Arc<dyn BuildSource> = Arc::new(flaky_ci(now));

    let output = pipeline::run_jenkins(source, &config(), window)
        .await
        .expect("pipeline run failed");

    assert_eq!(output.builds, 13);
    assert_eq!(output.matrix.lanes(), vec!["lane-a", "lane-b"]);

    let lane_a = output.matrix.get("T", "lane-a").expect("T in lane-a");
    assert_eq!((lane_a.failed(), lane_a.succeeded()), (3, 0));
    assert_eq!(lane_a.severity(), SeverityTier::HeavilyFlaky);

    let lane_b = output.matrix.get("T", "lane-b").expect("T in lane-b");
    assert_eq!((lane_b.failed(), lane_b.succeeded()), (1, 9));
    assert_eq!(lane_b.severity(), SeverityTier::MildlyFlaky);

    let stable = output.matrix.get("stable", "lane-b").expect("stable in lane-b");
    assert_eq!(
        stable.failed(),
        0,
        "the build before the window must not count"
    );
    assert_eq!(stable.succeeded(), 10);

    assert_eq!(rank(&output.matrix), vec!["T", "stable"]);
    assert_eq!(output.matrix.failing_tests(), vec!["T"]);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_build_error_aborts_the_run() {
    let now = Utc::now();
    let window = ReportWindow::ending_at(now, Duration::hours(72)).unwrap();
    let mut ci = flaky_ci(now);
    ci.forbidden = Some(("lane-b".into(), 6));

    let err = pipeline::run_jenkins(Arc::new(ci), &config(), window)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    match err {
        FinderError::Build { lane, build, .. } => {
            assert_eq!(lane, "lane-b");
            assert_eq!(build, 6);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_report_files_are_written() {
    let now = Utc::now();
    let window = ReportWindow::ending_at(now, Duration::hours(72)).unwrap();
    let output = pipeline::run_jenkins(Arc::new(flaky_ci(now)), &config(), window)
        .await
        .expect("pipeline run failed");

    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let data = ReportData::new(&output.matrix, output.window).with_ci_url("https://ci.example");
    let paths = report::write_report(&data, dir.path()).expect("failed to write report");

    let html = std::fs::read_to_string(&paths.html).expect("html report missing");
    assert!(html.contains("<td>T</td>"));
    assert!(!html.contains("<td>stable</td>"));
    assert!(html.contains("https://ci.example/job/lane-b/4/"));

    let snapshot = report::json::read_json(&paths.json).expect("snapshot unreadable");
    assert_eq!(snapshot, output.matrix);
}

#[derive(Default)]
struct MemoryBucket {
    objects: BTreeMap<String, Vec<u8>>,
    created: HashMap<String, DateTime<Utc>>,
}

impl MemoryBucket {
    fn add_build(
        &mut self,
        dir: &str,
        finished: Option<DateTime<Utc>>,
        revisions: &str,
        report: Vec<u8>,
    ) {
        if let Some(created) = finished {
            let path = format!("{dir}/finished.json");
            self.objects.insert(path.clone(), br#"{"passed": false}"#.to_vec());
            self.created.insert(path, created);
        }
        self.objects.insert(
            format!("{dir}/started.json"),
            format!(r#"{{"timestamp": 0, "repos": {{"kubevirt/kubevirt": "{revisions}"}}}}"#)
                .into_bytes(),
        );
        self.objects
            .insert(format!("{dir}/{PR_JUNIT_ARTIFACT}"), report);
    }
}

#[async_trait]
impl BlobStore for MemoryBucket {
    async fn list_prefixes(&self, prefix: &str) -> FinderResult<Vec<String>> {
        let mut children: Vec<String> = self
            .objects
            .keys()
            .filter_map(|key| key.strip_prefix(prefix))
            .filter_map(|rest| rest.split_once('/'))
            .map(|(child, _)| format!("{prefix}{child}/"))
            .collect();
        children.dedup();
        Ok(children)
    }

    async fn read_object(&self, path: &str) -> FinderResult<Vec<u8>> {
        self.objects
            .get(path)
            .cloned()
            .ok_or_else(|| FinderError::NotFound {
                resource: path.to_string(),
            })
    }

    async fn object_attrs(&self, path: &str) -> FinderResult<ObjectAttrs> {
        self.created
            .get(path)
            .map(|created| ObjectAttrs {
                name: path.to_string(),
                created: *created,
            })
            .ok_or_else(|| FinderError::NotFound {
                resource: path.to_string(),
            })
    }
}

struct Heads;

#[async_trait]
impl PullRequestSource for Heads {
    async fn get_pull_request(&self, _org: &str, _repo: &str, number: u64) -> FinderResult<PullRequest> {
        match number {
            17 => Ok(PullRequest::new(17, "head17")),
            _ => Err(FinderError::NotFound {
                resource: format!("pull/{number}"),
            }),
        }
    }

    async fn search_merged_pull_requests(
        &self,
        org: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> FinderResult<Vec<u64>> {
        assert_eq!((org, repo), ("kubevirt", "kubevirt"));
        assert!(since < Utc::now());
        Ok(vec![18, 17, 17])
    }
}

fn pr_bucket(now: DateTime<Utc>) -> MemoryBucket {
    let lane = "pr-logs/pull/kubevirt_kubevirt/17/pull-kubevirt-e2e";
    let recent = Some(now - Duration::hours(2));

    let mut bucket = MemoryBucket::default();
    bucket.add_build(&format!("{lane}/101"), recent, "main:base,17:head17", junit(&[("T", false)]));
    bucket.add_build(&format!("{lane}/102"), recent, "main:base,17:head17", junit(&[("T", true)]));
    // Tested an older head of the PR
    bucket.add_build(&format!("{lane}/100"), recent, "main:base,17:old", junit(&[("T", false)]));
    // Still running
    bucket.add_build(&format!("{lane}/103"), None, "main:base,17:head17", junit(&[("T", false)]));
    // Finished before the window
    bucket.add_build(
        &format!("{lane}/99"),
        Some(now - Duration::days(10)),
        "main:base,17:head17",
        junit(&[("T", false)]),
    );
    bucket
}

#[tokio::test(start_paused = true)]
async fn test_pull_request_run_keeps_latest_commit_builds() {
    let now = Utc::now();
    let window = ReportWindow::ending_at(now, Duration::hours(72)).unwrap();
    let bucket = pr_bucket(now);

    let run = PullRequestRun {
        store: Arc::new(bucket),
        pulls: Arc::new(Heads),
        repo: "kubevirt/kubevirt".into(),
        numbers: vec![17, 18],
        skip_before_window: true,
    };

    let output = pipeline::run_pull_requests(run, &FinderConfig::default(), window)
        .await
        .expect("pull request run failed");

    assert_eq!(output.builds, 2);
    assert_eq!(output.pull_requests, vec![17, 18]);

    let cell = output
        .matrix
        .get("T", "pull-kubevirt-e2e")
        .expect("T in the PR lane");
    assert_eq!((cell.failed(), cell.succeeded()), (1, 1));

    let builds: Vec<(u64, u64)> = cell
        .occurrences()
        .iter()
        .map(|o| (o.build_number, o.pr_number))
        .collect();
    assert!(builds.contains(&(101, 17)));
    assert!(builds.contains(&(102, 17)));
}

#[tokio::test(start_paused = true)]
async fn test_pull_request_run_searches_merged_pull_requests() {
    let now = Utc::now();
    let window = ReportWindow::ending_at(now, Duration::hours(72)).unwrap();
    let run = PullRequestRun {
        store: Arc::new(pr_bucket(now)),
        pulls: Arc::new(Heads),
        repo: "kubevirt/kubevirt".into(),
        numbers: Vec::new(),
        skip_before_window: true,
    };

    let output = pipeline::run_pull_requests(run, &FinderConfig::default(), window)
        .await
        .expect("pull request run failed");

    assert_eq!(output.pull_requests, vec![17, 18]);
    assert_eq!(output.builds, 2);
    assert!(output.matrix.get("T", "pull-kubevirt-e2e").is_some());
}

#[tokio::test]
async fn test_pull_request_run_rejects_bad_repository() {
    let run = PullRequestRun {
        store: Arc::new(MemoryBucket::default()),
        pulls: Arc::new(Heads),
        repo: "kubevirt".into(),
        numbers: vec![17],
        skip_before_window: false,
    };
    let window = ReportWindow::until_now(Duration::hours(24)).unwrap();

    let err = pipeline::run_pull_requests(run, &FinderConfig::default(), window)
        .await
        .unwrap_err();
    assert!(matches!(err, FinderError::Config { .. }));
}
