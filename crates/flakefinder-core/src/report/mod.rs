//! Report outputs: a JSON snapshot of the matrix and a human-readable HTML
//! page, written side by side under the same file stem.

pub mod html;
pub mod json;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{FinderError, FinderResult};
use crate::model::{ReportMatrix, ReportWindow};
use crate::namer;
use crate::ranker;

/// Everything a report page shows.
#[derive(Debug, Clone)]
pub struct ReportData<'a> {
    pub matrix: &'a ReportMatrix,
    pub window: ReportWindow,
    /// CI base URL for build links; `None` renders plain build numbers.
    pub ci_url: Option<String>,
    /// Pull requests the run was scoped to, empty for lane reports.
    pub pull_requests: Vec<u64>,
}

impl<'a> ReportData<'a> {
    pub fn new(matrix: &'a ReportMatrix, window: ReportWindow) -> Self {
        Self {
            matrix,
            window,
            ci_url: None,
            pull_requests: Vec::new(),
        }
    }

    pub fn with_ci_url(mut self, url: impl Into<String>) -> Self {
        self.ci_url = Some(url.into());
        self
    }

    pub fn with_pull_requests(mut self, prs: Vec<u64>) -> Self {
        self.pull_requests = prs;
        self
    }

    /// Lane columns, sorted.
    pub fn headers(&self) -> Vec<String> {
        self.matrix.lanes()
    }

    /// Rows: tests with at least one failure, most suspicious first.
    pub fn tests(&self) -> Vec<String> {
        let failing = self.matrix.failing_tests();
        ranker::rank(self.matrix)
            .into_iter()
            .filter(|name| failing.binary_search(name).is_ok())
            .collect()
    }
}

/// Paths of one written report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

/// Write both outputs into `out_dir`, creating it if needed.
pub fn write_report(data: &ReportData<'_>, out_dir: &Path) -> FinderResult<ReportPaths> {
    std::fs::create_dir_all(out_dir).map_err(|e| FinderError::io(out_dir, e))?;

    let end = data.window.end;
    let lookback = data.window.lookback();
    let paths = ReportPaths {
        html: out_dir.join(namer::report_file_name(end, lookback)?),
        json: out_dir.join(namer::snapshot_file_name(end, lookback)?),
    };

    json::write_json(data.matrix, &paths.json)?;
    html::write_html(data, &paths.html)?;

    info!(
        html = %paths.html.display(),
        json = %paths.json.display(),
        tests = data.matrix.len(),
        "report written"
    );
    Ok(paths)
}
