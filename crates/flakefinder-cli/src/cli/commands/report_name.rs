use flakefinder_core::{report_file_name, snapshot_file_name, FinderConfig};

use super::super::args::ReportNameArgs;
use crate::exit_codes::EXIT_SUCCESS;

pub(crate) fn run(args: ReportNameArgs) -> anyhow::Result<i32> {
    let mut config = FinderConfig::from_env();
    if let Some(lookback) = args.window.lookback {
        config = config.with_lookback_hours(lookback.as_secs() / 3600);
    }
    let window = super::report_window(&config, &args.window)?;

    let name = if args.snapshot {
        snapshot_file_name(window.end, window.lookback())?
    } else {
        report_file_name(window.end, window.lookback())?
    };
    println!("{name}");
    Ok(EXIT_SUCCESS)
}
