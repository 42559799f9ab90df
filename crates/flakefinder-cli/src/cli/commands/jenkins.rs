use std::sync::Arc;

use flakefinder_core::{pipeline, report, JenkinsClient, ReportData};
use tracing::info;

use super::super::args::JenkinsArgs;
use crate::exit_codes::EXIT_SUCCESS;

pub(crate) async fn run(args: JenkinsArgs) -> anyhow::Result<i32> {
    let mut config = super::finder_config(&args.window, &args.fetch);
    if let Some(url) = args.ci_url {
        config = config.with_ci_url(url);
    }
    if let Some(pattern) = args.lane_pattern {
        config = config.with_lane_pattern(pattern);
    }
    config.validate()?;

    let window = super::report_window(&config, &args.window)?;
    let source = Arc::new(JenkinsClient::new(&config)?);
    let output = pipeline::run_jenkins(source, &config, window).await?;

    let data = ReportData::new(&output.matrix, output.window).with_ci_url(config.ci_url.clone());
    let paths = report::write_report(&data, &args.out_dir)?;
    info!(
        builds = output.builds,
        failing = output.matrix.failing_tests().len(),
        "lane report ready"
    );
    super::print_paths(&paths);
    Ok(EXIT_SUCCESS)
}
