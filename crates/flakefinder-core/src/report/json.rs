use std::path::Path;

use crate::error::{FinderError, FinderResult};
use crate::model::ReportMatrix;

pub fn write_json(matrix: &ReportMatrix, out: &Path) -> FinderResult<()> {
    let body = to_json(matrix)?;
    std::fs::write(out, body).map_err(|e| FinderError::io(out, e))
}

pub fn to_json(matrix: &ReportMatrix) -> FinderResult<String> {
    serde_json::to_string_pretty(matrix).map_err(|e| FinderError::InvalidResponse {
        message: format!("failed to serialize report matrix: {e}"),
    })
}

pub fn read_json(path: &Path) -> FinderResult<ReportMatrix> {
    let body = std::fs::read(path).map_err(|e| FinderError::io(path, e))?;
    serde_json::from_slice(&body).map_err(|e| FinderError::InvalidResponse {
        message: format!("{}: {e}", path.display()),
    })
}
