//! Stable report file names.

use chrono::{DateTime, Utc};

use crate::error::{FinderError, FinderResult};

pub const REPORT_FILE_PREFIX: &str = "flakefinder-";

/// `flakefinder-<YYYY-MM-DD>-<hhh>h`, shared by the HTML and JSON outputs.
pub fn report_stem(end: DateTime<Utc>, lookback: chrono::Duration) -> FinderResult<String> {
    let hours = lookback.num_hours();
    if hours <= 0 {
        return Err(FinderError::Config {
            message: format!("report lookback must be at least one hour, got {lookback}"),
        });
    }
    Ok(format!(
        "{}{}-{:03}h",
        REPORT_FILE_PREFIX,
        end.format("%Y-%m-%d"),
        hours
    ))
}

pub fn report_file_name(end: DateTime<Utc>, lookback: chrono::Duration) -> FinderResult<String> {
    Ok(format!("{}.html", report_stem(end, lookback)?))
}

pub fn snapshot_file_name(end: DateTime<Utc>, lookback: chrono::Duration) -> FinderResult<String> {
    Ok(format!("{}.json", report_stem(end, lookback)?))
}
