//! Evaluation reports: coverage, mutation and quality scoring results.

use serde::{Deserialize, Serialize};

/// Per-file coverage breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub path: String,
    pub total_lines: u64,
    pub covered_lines: u64,
    pub percentage: f64,
    /// Every line the native tool flagged uncovered, verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uncovered_lines: Vec<u32>,
}

/// Uncovered region worth surfacing to the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncoveredItem {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: String,
}

/// Aggregated coverage result for one test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_lines: u64,
    pub covered_lines: u64,
    pub percentage: f64,
    pub files: Vec<FileCoverage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uncovered: Vec<UncoveredItem>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl CoverageReport {
    pub fn empty() -> Self {
        Self {
            total_lines: 0,
            covered_lines: 0,
            percentage: 0.0,
            files: Vec::new(),
            uncovered: Vec::new(),
            generated_at: chrono::Utc::now(),
        }
    }

    pub fn file(&self, path: &str) -> Option<&FileCoverage> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Outcome of one mutant against the test suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutantStatus {
    Killed,
    Survived,
    Timeout,
    Error,
}

/// Syntactic category of a mutation, inferred from its description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationCategory {
    Arithmetic,
    Comparison,
    Boolean,
    Return,
    Statement,
    Branch,
    Unknown,
}

/// One mutant and its fate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutantRecord {
    pub id: String,
    pub category: MutationCategory,
    pub line: u32,
    pub status: MutantStatus,
    pub description: String,
}

/// Mutation testing grade bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationQuality {
    Good,
    Acceptable,
    Poor,
}

/// Aggregated mutation testing result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationResult {
    pub source_file: String,
    pub test_file: String,
    pub total: u64,
    pub killed: u64,
    pub survived: u64,
    pub timed_out: u64,
    /// killed / total, or 0 when no mutants ran
    pub score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutants: Vec<MutantRecord>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationResult {
    pub fn quality(&self) -> MutationQuality {
        if self.total == 0 {
            return MutationQuality::Poor;
        }
        if self.score >= 0.70 {
            MutationQuality::Good
        } else if self.score >= 0.50 {
            MutationQuality::Acceptable
        } else {
            MutationQuality::Poor
        }
    }
}

/// Severity of a quality issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// A single quality finding with a suggested remediation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: IssueSeverity,
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Counters backing the score axes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub test_count: u64,
    pub assertion_count: u64,
    pub trivial_assertions: u64,
    pub assertion_kinds: u64,
    pub target_called: bool,
}

/// Composite quality grade for one generated test artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    /// 0-100 weighted composite
    pub overall: f64,
    pub grade: char,
    pub passed: bool,
    pub assertion_score: f64,
    pub coverage_score: f64,
    pub mutation_score: f64,
    pub static_score: f64,
    pub breakdown: QualityBreakdown,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<QualityIssue>,
    pub recommendation: String,
}

impl QualityScore {
    pub fn grade_for(overall: f64) -> char {
        if overall >= 90.0 {
            'A'
        } else if overall >= 80.0 {
            'B'
        } else if overall >= 70.0 {
            'C'
        } else if overall >= 60.0 {
            'D'
        } else {
            'F'
        }
    }

    /// A failed grade requests another generation round; the reason is the
    /// concatenation of all critical findings.
    pub fn should_regenerate(&self) -> Option<String> {
        if self.passed {
            return None;
        }
        let reasons: Vec<&str> = self
            .issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Critical)
            .map(|i| i.message.as_str())
            .collect();
        if reasons.is_empty() {
            Some(format!("overall score {:.1} below threshold", self.overall))
        } else {
            Some(reasons.join("; "))
        }
    }
}

/// A rendered test file ready to be written into the workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedTest {
    pub path: String,
    pub language: String,
    pub framework: String,
    pub source: String,
    pub assertion_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_quality_bands() {
        let mut result = MutationResult {
            source_file: "f.go".to_string(),
            test_file: "f_test.go".to_string(),
            total: 10,
            killed: 7,
            survived: 3,
            timed_out: 0,
            score: 0.7,
            mutants: vec![],
            duration_ms: 100,
            error: None,
        };
        assert_eq!(result.quality(), MutationQuality::Good);

        result.score = 0.5;
        assert_eq!(result.quality(), MutationQuality::Acceptable);

        result.score = 0.49;
        assert_eq!(result.quality(), MutationQuality::Poor);

        // zero mutants is always poor regardless of score
        result.total = 0;
        result.score = 0.0;
        assert_eq!(result.quality(), MutationQuality::Poor);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(QualityScore::grade_for(90.0), 'A');
        assert_eq!(QualityScore::grade_for(89.9), 'B');
        assert_eq!(QualityScore::grade_for(80.0), 'B');
        assert_eq!(QualityScore::grade_for(70.0), 'C');
        assert_eq!(QualityScore::grade_for(60.0), 'D');
        assert_eq!(QualityScore::grade_for(59.9), 'F');
    }

    #[test]
    fn test_regenerate_reason_concatenates_criticals() {
        let score = QualityScore {
            overall: 40.0,
            grade: 'F',
            passed: false,
            assertion_score: 40.0,
            coverage_score: 40.0,
            mutation_score: 40.0,
            static_score: 40.0,
            breakdown: QualityBreakdown::default(),
            issues: vec![
                QualityIssue {
                    severity: IssueSeverity::Critical,
                    category: "assertion".to_string(),
                    message: "target never called".to_string(),
                    suggestion: None,
                },
                QualityIssue {
                    severity: IssueSeverity::Low,
                    category: "style".to_string(),
                    message: "minor".to_string(),
                    suggestion: None,
                },
                QualityIssue {
                    severity: IssueSeverity::Critical,
                    category: "coverage".to_string(),
                    message: "target uncovered".to_string(),
                    suggestion: None,
                },
            ],
            recommendation: String::new(),
        };

        let reason = score.should_regenerate().unwrap();
        assert_eq!(reason, "target never called; target uncovered");
    }

    #[test]
    fn test_coverage_report_round_trip() {
        let report = CoverageReport {
            total_lines: 100,
            covered_lines: 80,
            percentage: 80.0,
            files: vec![FileCoverage {
                path: "src/a.go".to_string(),
                total_lines: 100,
                covered_lines: 80,
                percentage: 80.0,
                uncovered_lines: vec![5, 9, 22],
            }],
            uncovered: vec![UncoveredItem {
                file: "src/a.go".to_string(),
                start_line: 5,
                end_line: 9,
                kind: "block".to_string(),
            }],
            generated_at: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&report).unwrap();
        let back: CoverageReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.files, report.files);
        assert_eq!(back.uncovered, report.uncovered);
    }
}
