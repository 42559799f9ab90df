use flakefinder_core::{FinderConfig, ReportPaths, ReportWindow};

use super::args::{Cli, Command, FetchArgs, WindowArgs};

pub(crate) mod dequarantine;
pub(crate) mod jenkins;
pub(crate) mod pull_requests;
pub(crate) mod report_name;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Jenkins(args) => jenkins::run(args).await,
        Command::PullRequests(args) => pull_requests::run(args).await,
        Command::Dequarantine(args) => dequarantine::run(args),
        Command::ReportName(args) => report_name::run(args),
    }
}

/// Environment config with command-line overrides applied.
pub(crate) fn finder_config(window: &WindowArgs, fetch: &FetchArgs) -> FinderConfig {
    let mut config = FinderConfig::from_env();
    if let Some(lookback) = window.lookback {
        config = config.with_lookback_hours(lookback.as_secs() / 3600);
    }
    if let Some(max) = fetch.max_concurrent_fetches {
        config = config.with_max_concurrent_fetches(max);
    }
    if let Some(timeout) = fetch.timeout {
        config.timeout_secs = timeout.as_secs().max(1);
    }
    if let Some(retries) = fetch.max_retries {
        config.max_retries = retries;
    }
    config
}

pub(crate) fn report_window(
    config: &FinderConfig,
    window: &WindowArgs,
) -> anyhow::Result<ReportWindow> {
    Ok(config.report_window(window.end)?)
}

pub(crate) fn print_paths(paths: &ReportPaths) {
    println!("{}", paths.html.display());
    println!("{}", paths.json.display());
}
