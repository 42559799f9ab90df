use std::sync::Arc;

use flakefinder_core::{pipeline, report, GcsClient, GitHubClient, PullRequestRun, ReportData};
use tracing::info;

use super::super::args::PullRequestArgs;
use crate::exit_codes::EXIT_SUCCESS;

pub(crate) async fn run(args: PullRequestArgs) -> anyhow::Result<i32> {
    let mut config = super::finder_config(&args.window, &args.fetch);
    if let Some(url) = args.storage_url {
        config = config.with_storage_url(url);
    }
    if let Some(bucket) = args.bucket {
        config = config.with_bucket(bucket);
    }
    if let Some(url) = args.github_url {
        config = config.with_github_url(url);
    }
    config.validate()?;

    let window = super::report_window(&config, &args.window)?;
    let run = PullRequestRun {
        store: Arc::new(GcsClient::new(&config)?),
        pulls: Arc::new(GitHubClient::new(&config)?),
        repo: args.repo,
        numbers: args.prs,
        skip_before_window: !args.include_older,
    };
    let output = pipeline::run_pull_requests(run, &config, window).await?;

    let data = ReportData::new(&output.matrix, output.window)
        .with_pull_requests(output.pull_requests.clone());
    let paths = report::write_report(&data, &args.out_dir)?;
    info!(
        builds = output.builds,
        failing = output.matrix.failing_tests().len(),
        "pull request report ready"
    );
    super::print_paths(&paths);
    Ok(EXIT_SUCCESS)
}
