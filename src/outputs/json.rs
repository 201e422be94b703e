//! JSON report output.
//!
//! Reports are grouped by the UTC date of the run, one file per run.

use crate::models::ContextReport;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Report path for a run started at `generated_at`:
/// `{output_dir}/{YYYY-MM-DD}/context_{HHMMSS}.json`.
pub fn report_path(output_dir: &str, generated_at: DateTime<Utc>) -> PathBuf {
    Path::new(output_dir)
        .join(generated_at.format("%Y-%m-%d").to_string())
        .join(format!("context_{}.json", generated_at.format("%H%M%S")))
}

/// Serialize `report` and write it under `output_dir`, creating the date
/// directory as needed. Returns the written path.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir))]
pub async fn write_report(report: &ContextReport, output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(output_dir, report.generated_at);

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring report directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create report dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), articles = report.articles.len(), "Wrote context report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_path_layout() {
        let at = Utc.with_ymd_and_hms(2025, 5, 6, 7, 15, 2).unwrap();
        assert_eq!(
            report_path("out", at),
            Path::new("out").join("2025-05-06").join("context_071502.json")
        );
    }

    #[tokio::test]
    async fn test_write_report_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();
        let report = ContextReport::new(Utc::now(), Vec::new());

        let path = write_report(&report, out).await.unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["kept"], 0);
        assert!(written["relationships"].as_array().unwrap().is_empty());
    }
}
