//! # Coverage Collector
//!
//! Runs the language's native coverage tooling and parses its profile
//! into the shared report shape. Uncovered line extraction is lossless:
//! every line the native tool flags appears in the report.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use qforge_core::{CoverageReport, FileCoverage, QForgeError, QResult, UncoveredItem};

use crate::process::ProcessExecutor;

const GO_PROFILE_NAME: &str = "qforge-coverage.out";
const PYTEST_REPORT_NAME: &str = "qforge-coverage.json";

pub struct CoverageCollector {
    executor: Arc<dyn ProcessExecutor>,
    timeout: Duration,
}

impl CoverageCollector {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            executor,
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run tests under coverage for `language` and parse the profile
    pub async fn collect(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        language: &str,
    ) -> QResult<CoverageReport> {
        info!(language, "collecting coverage");
        match language {
            "python" => self.collect_python(cancel, workdir).await,
            "javascript" | "typescript" | "jsx" | "tsx" => {
                self.collect_jest(cancel, workdir).await
            }
            _ => self.collect_go(cancel, workdir).await,
        }
    }

    async fn collect_go(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
    ) -> QResult<CoverageReport> {
        let args = vec![
            "test".to_string(),
            format!("-coverprofile={GO_PROFILE_NAME}"),
            "-covermode=count".to_string(),
            "./...".to_string(),
        ];
        self.executor.run(cancel, workdir, "go", &args, self.timeout).await?;

        let profile_path = workdir.join(GO_PROFILE_NAME);
        let profile = tokio::fs::read_to_string(&profile_path).await.map_err(|e| {
            QForgeError::Subprocess {
                program: "go".to_string(),
                reason: format!("coverage profile missing: {e}"),
            }
        })?;
        let _ = tokio::fs::remove_file(&profile_path).await;

        Ok(parse_go_profile(&profile))
    }

    async fn collect_python(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
    ) -> QResult<CoverageReport> {
        let args = vec![
            "--cov=.".to_string(),
            format!("--cov-report=json:{PYTEST_REPORT_NAME}"),
        ];
        self.executor.run(cancel, workdir, "pytest", &args, self.timeout).await?;

        let report_path = workdir.join(PYTEST_REPORT_NAME);
        let report = tokio::fs::read_to_string(&report_path).await.map_err(|e| {
            QForgeError::Subprocess {
                program: "pytest".to_string(),
                reason: format!("coverage report missing: {e}"),
            }
        })?;
        let _ = tokio::fs::remove_file(&report_path).await;

        parse_pytest_json(&report)
    }

    async fn collect_jest(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
    ) -> QResult<CoverageReport> {
        let args = vec![
            "jest".to_string(),
            "--coverage".to_string(),
            "--coverageReporters=json-summary".to_string(),
        ];
        self.executor.run(cancel, workdir, "npx", &args, self.timeout).await?;

        let summary_path = workdir.join("coverage/coverage-summary.json");
        let summary = tokio::fs::read_to_string(&summary_path).await.map_err(|e| {
            QForgeError::Subprocess {
                program: "jest".to_string(),
                reason: format!("coverage summary missing: {e}"),
            }
        })?;

        parse_jest_summary(&summary)
    }
}

/// Parse `file.go:startLine.col,endLine.col numStmt count` block lines.
/// A line is covered when any block containing it has a non-zero count.
pub fn parse_go_profile(profile: &str) -> CoverageReport {
    let block_re =
        Regex::new(r"^(.+?):(\d+)\.\d+,(\d+)\.\d+\s+(\d+)\s+(\d+)$").unwrap();

    let mut covered: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
    let mut uncovered: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
    let mut uncovered_blocks: Vec<UncoveredItem> = Vec::new();

    for line in profile.lines() {
        let Some(caps) = block_re.captures(line) else {
            continue; // mode: header and anything unrecognized
        };
        let file = caps[1].to_string();
        let start: u32 = caps[2].parse().unwrap_or(0);
        let end: u32 = caps[3].parse().unwrap_or(start);
        let count: u64 = caps[5].parse().unwrap_or(0);

        let bucket = if count > 0 {
            covered.entry(file.clone()).or_default()
        } else {
            uncovered.entry(file.clone()).or_default()
        };
        for line_no in start..=end {
            bucket.insert(line_no);
        }

        if count == 0 {
            uncovered_blocks.push(UncoveredItem {
                file,
                start_line: start,
                end_line: end,
                kind: "block".to_string(),
            });
        }
    }

    let mut files = Vec::new();
    let mut total_lines = 0u64;
    let mut covered_lines = 0u64;

    let all_files: BTreeSet<String> = covered.keys().chain(uncovered.keys()).cloned().collect();
    for file in all_files {
        let covered_set = covered.get(&file).cloned().unwrap_or_default();
        let uncovered_set: BTreeSet<u32> = uncovered
            .get(&file)
            .map(|set| set.difference(&covered_set).copied().collect())
            .unwrap_or_default();

        let file_total = (covered_set.len() + uncovered_set.len()) as u64;
        let file_covered = covered_set.len() as u64;
        total_lines += file_total;
        covered_lines += file_covered;

        files.push(FileCoverage {
            path: file,
            total_lines: file_total,
            covered_lines: file_covered,
            percentage: percentage(file_covered, file_total),
            uncovered_lines: uncovered_set.into_iter().collect(),
        });
    }

    debug!(files = files.len(), total_lines, covered_lines, "parsed go coverage profile");

    CoverageReport {
        total_lines,
        covered_lines,
        percentage: percentage(covered_lines, total_lines),
        files,
        uncovered: uncovered_blocks,
        generated_at: chrono::Utc::now(),
    }
}

/// pytest-cov JSON: totals.{covered_lines,num_statements,percent_covered}
/// plus per-file summary and missing_lines.
pub fn parse_pytest_json(report: &str) -> QResult<CoverageReport> {
    let value: Value = serde_json::from_str(report)?;

    let totals = &value["totals"];
    let covered_lines = totals["covered_lines"].as_u64().unwrap_or(0);
    let total_lines = totals["num_statements"].as_u64().unwrap_or(0);
    let pct = totals["percent_covered"]
        .as_f64()
        .unwrap_or_else(|| percentage(covered_lines, total_lines));

    let mut files = Vec::new();
    let mut uncovered = Vec::new();

    if let Some(file_map) = value["files"].as_object() {
        for (path, entry) in file_map {
            let summary = &entry["summary"];
            let file_covered = summary["covered_lines"].as_u64().unwrap_or(0);
            let file_total = summary["num_statements"].as_u64().unwrap_or(0);

            let missing: Vec<u32> = entry["missing_lines"]
                .as_array()
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(|l| l.as_u64().map(|n| n as u32))
                        .collect()
                })
                .unwrap_or_default();

            for line in &missing {
                uncovered.push(UncoveredItem {
                    file: path.clone(),
                    start_line: *line,
                    end_line: *line,
                    kind: "line".to_string(),
                });
            }

            files.push(FileCoverage {
                path: path.clone(),
                total_lines: file_total,
                covered_lines: file_covered,
                percentage: summary["percent_covered"]
                    .as_f64()
                    .unwrap_or_else(|| percentage(file_covered, file_total)),
                uncovered_lines: missing,
            });
        }
    }

    Ok(CoverageReport {
        total_lines,
        covered_lines,
        percentage: pct,
        files,
        uncovered,
        generated_at: chrono::Utc::now(),
    })
}

/// jest json-summary: `total.lines.{total,covered,pct}` plus per-file
/// entries keyed by path. The summary format carries no line numbers.
pub fn parse_jest_summary(summary: &str) -> QResult<CoverageReport> {
    let value: Value = serde_json::from_str(summary)?;

    let total = &value["total"]["lines"];
    let total_lines = total["total"].as_u64().unwrap_or(0);
    let covered_lines = total["covered"].as_u64().unwrap_or(0);
    let pct = total["pct"]
        .as_f64()
        .unwrap_or_else(|| percentage(covered_lines, total_lines));

    let mut files = Vec::new();
    if let Some(map) = value.as_object() {
        for (path, entry) in map {
            if path == "total" {
                continue;
            }
            let lines = &entry["lines"];
            let file_total = lines["total"].as_u64().unwrap_or(0);
            let file_covered = lines["covered"].as_u64().unwrap_or(0);
            files.push(FileCoverage {
                path: path.clone(),
                total_lines: file_total,
                covered_lines: file_covered,
                percentage: lines["pct"]
                    .as_f64()
                    .unwrap_or_else(|| percentage(file_covered, file_total)),
                uncovered_lines: Vec::new(),
            });
        }
    }

    Ok(CoverageReport {
        total_lines,
        covered_lines,
        percentage: pct,
        files,
        uncovered: Vec::new(),
        generated_at: chrono::Utc::now(),
    })
}

fn percentage(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (covered as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_go_profile() {
        let profile = "mode: count
example.com/m/math.go:3.24,5.2 1 4
example.com/m/math.go:8.30,10.2 1 0
example.com/m/other.go:2.10,4.2 2 1
";
        let report = parse_go_profile(profile);

        assert_eq!(report.files.len(), 2);
        let math = report.file("example.com/m/math.go").unwrap();
        // covered lines 3-5, uncovered 8-10
        assert_eq!(math.covered_lines, 3);
        assert_eq!(math.total_lines, 6);
        assert_eq!(math.uncovered_lines, vec![8, 9, 10]);

        assert_eq!(report.uncovered.len(), 1);
        assert_eq!(report.uncovered[0].start_line, 8);
        assert_eq!(report.uncovered[0].end_line, 10);

        assert_eq!(report.total_lines, 9);
        assert_eq!(report.covered_lines, 6);
    }

    #[test]
    fn test_go_profile_line_covered_by_any_block_wins() {
        // the same line appears in a zero-count and a hot block
        let profile = "mode: count
m/f.go:5.1,7.2 1 0
m/f.go:5.1,6.2 1 9
";
        let report = parse_go_profile(profile);
        let file = report.file("m/f.go").unwrap();
        assert_eq!(file.uncovered_lines, vec![7]);
        assert_eq!(file.covered_lines, 2);
    }

    #[test]
    fn test_parse_pytest_json() {
        let report = r#"{
            "totals": {"covered_lines": 80, "num_statements": 100, "percent_covered": 80.0},
            "files": {
                "svc/users.py": {
                    "summary": {"covered_lines": 30, "num_statements": 40, "percent_covered": 75.0},
                    "missing_lines": [12, 19, 20]
                }
            }
        }"#;
        let parsed = parse_pytest_json(report).unwrap();

        assert_eq!(parsed.total_lines, 100);
        assert_eq!(parsed.covered_lines, 80);
        assert_eq!(parsed.percentage, 80.0);

        let file = parsed.file("svc/users.py").unwrap();
        assert_eq!(file.uncovered_lines, vec![12, 19, 20]);
        assert_eq!(parsed.uncovered.len(), 3);
        assert_eq!(parsed.uncovered[0].kind, "line");
    }

    #[test]
    fn test_parse_jest_summary() {
        let summary = r#"{
            "total": {"lines": {"total": 50, "covered": 45, "skipped": 0, "pct": 90.0}},
            "/repo/src/math.js": {"lines": {"total": 50, "covered": 45, "skipped": 0, "pct": 90.0}}
        }"#;
        let parsed = parse_jest_summary(summary).unwrap();

        assert_eq!(parsed.total_lines, 50);
        assert_eq!(parsed.covered_lines, 45);
        assert_eq!(parsed.percentage, 90.0);
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].path, "/repo/src/math.js");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(parse_pytest_json("not json").is_err());
        assert!(parse_jest_summary("{broken").is_err());
    }

    #[test]
    fn test_empty_profile() {
        let report = parse_go_profile("mode: count\n");
        assert_eq!(report.total_lines, 0);
        assert_eq!(report.percentage, 0.0);
        assert!(report.files.is_empty());
    }
}
