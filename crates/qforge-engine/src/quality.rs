//! # Quality Scorer
//!
//! Static assertion analysis plus a weighted four-axis composite grade
//! (assertion, coverage, mutation, static). The grade is the feedback
//! signal for the regeneration loop.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use qforge_core::{
    CoverageReport, IssueSeverity, MutationResult, QualityBreakdown, QualityIssue, QualityScore,
};

use crate::settings::QualitySettings;

/// Static analysis of an emitted test file
#[derive(Debug, Clone)]
pub struct AssertionAnalysis {
    pub test_count: u64,
    pub assertion_count: u64,
    pub trivial_count: u64,
    pub kinds: HashMap<String, u64>,
    pub target_called: bool,
    pub issues: Vec<QualityIssue>,
}

/// Pattern-scan `code` for test functions, assertions, trivial
/// assertions, and whether `target_symbol` is ever invoked.
pub fn analyze_assertions(code: &str, language: &str, target_symbol: &str) -> AssertionAnalysis {
    let test_re = match language {
        "python" => Regex::new(r"(?m)^\s*def test_\w+").unwrap(),
        "javascript" | "typescript" | "jsx" | "tsx" => {
            Regex::new(r#"(?m)\b(?:test|it)\s*\(\s*['"`]"#).unwrap()
        }
        "java" => Regex::new(r"(?m)@Test").unwrap(),
        _ => Regex::new(r"(?m)^func Test\w+").unwrap(),
    };

    let assertion_patterns: Vec<(&str, Regex)> = vec![
        ("equals", Regex::new(r"assertEquals|assert_eq!|\.toBe\(|\.toEqual\(|assert\s+\S+\s*==|if\s+\S+\s*!=\s*\S+\s*\{").unwrap()),
        ("not_equals", Regex::new(r"assertNotEquals|\.not\.toBe\(|assert\s+\S+\s*!=|if\s+\S+\s*==\s*\S+\s*\{").unwrap()),
        ("contains", Regex::new(r"\.toContain\(|strings\.Contains|assert\s+\S+\s+in\s+|\.contains\(").unwrap()),
        ("comparison", Regex::new(r"toBeGreaterThan|toBeLessThan|assert\s+\S+\s*[<>]").unwrap()),
        ("truthiness", Regex::new(r"toBeTruthy|toBeFalsy|assertTrue|assertFalse|assert\s+not\s+").unwrap()),
        ("nil", Regex::new(r"toBeNull|assertNull|assertNotNull|is\s+None|is\s+not\s+None|!=\s*nil|==\s*nil").unwrap()),
        ("throws", Regex::new(r"toThrow|assertThrows|pytest\.raises|recover\(\)").unwrap()),
    ];

    let test_count = test_re.find_iter(code).count() as u64;

    let mut kinds = HashMap::new();
    let mut assertion_count = 0u64;
    for (kind, re) in &assertion_patterns {
        let hits = re.find_iter(code).count() as u64;
        if hits > 0 {
            kinds.insert(kind.to_string(), hits);
            assertion_count += hits;
        }
    }

    let trivial_count = count_trivial_assertions(code);

    // api targets are exercised through their route path, whose parameter
    // segments get substituted at emission; match the static prefix
    let bare_target = match target_symbol.split_once(' ') {
        Some((_, path)) => path
            .split([':', '{'])
            .next()
            .unwrap_or(path)
            .trim_end_matches('/')
            .to_string(),
        None => target_symbol.to_string(),
    };
    let target_called = !bare_target.is_empty()
        && (Regex::new(&format!(r"\b{}\s*\(", regex::escape(&bare_target)))
            .map(|re| re.is_match(code))
            .unwrap_or(false)
            || code.contains(&bare_target));

    let mut issues = Vec::new();
    if test_count == 0 {
        issues.push(QualityIssue {
            severity: IssueSeverity::Critical,
            category: "assertion".to_string(),
            message: "test file contains no test functions".to_string(),
            suggestion: Some("generate at least one test case".to_string()),
        });
    } else if assertion_count == 0 {
        issues.push(QualityIssue {
            severity: IssueSeverity::Critical,
            category: "assertion".to_string(),
            message: "tests contain no assertions".to_string(),
            suggestion: Some("assert on the observable behavior of the target".to_string()),
        });
    }
    if !target_called {
        issues.push(QualityIssue {
            severity: IssueSeverity::Critical,
            category: "assertion".to_string(),
            message: format!("target symbol {bare_target} is never called"),
            suggestion: Some("invoke the symbol under test".to_string()),
        });
    }
    if trivial_count > 0 {
        issues.push(QualityIssue {
            severity: IssueSeverity::Medium,
            category: "assertion".to_string(),
            message: format!("{trivial_count} trivial assertion(s) detected"),
            suggestion: Some("compare against computed expectations".to_string()),
        });
    }

    AssertionAnalysis {
        test_count,
        assertion_count,
        trivial_count,
        kinds,
        target_called,
        issues,
    }
}

/// Identical literal/identifier on both sides of an equality matcher,
/// plus `True(true)` / `False(false)` shapes.
fn count_trivial_assertions(code: &str) -> u64 {
    let mut trivial = 0u64;

    let pair_patterns = [
        Regex::new(r"assertEquals\((\w+),\s*(\w+)\)").unwrap(),
        Regex::new(r"expect\((\w+)\)\.toBe\((\w+)\)").unwrap(),
        Regex::new(r"assert\s+(\w+)\s*==\s*(\w+)").unwrap(),
    ];
    for re in &pair_patterns {
        for caps in re.captures_iter(code) {
            if caps[1] == caps[2] {
                trivial += 1;
            }
        }
    }

    let tautologies = [
        Regex::new(r"assertTrue\(\s*true\s*\)").unwrap(),
        Regex::new(r"assertFalse\(\s*false\s*\)").unwrap(),
        Regex::new(r"expect\(true\)\.toBeTruthy\(\)").unwrap(),
        Regex::new(r"assert\s+True\b").unwrap(),
    ];
    for re in &tautologies {
        trivial += re.find_iter(code).count() as u64;
    }

    trivial
}

pub struct QualityScorer {
    config: QualitySettings,
}

impl QualityScorer {
    pub fn new(config: QualitySettings) -> Self {
        Self { config }
    }

    /// Combine the four axes into the composite grade
    pub fn score(
        &self,
        analysis: &AssertionAnalysis,
        coverage: Option<&CoverageReport>,
        mutation: Option<&MutationResult>,
        target_covered: Option<bool>,
    ) -> QualityScore {
        let mut issues = analysis.issues.clone();

        let assertion_score = self.assertion_axis(analysis);
        let coverage_score = self.coverage_axis(coverage, target_covered, &mut issues);
        let mutation_score = self.mutation_axis(mutation, &mut issues);
        let static_score = self.static_axis(analysis);

        let [w_assert, w_cov, w_mut, w_static] = self.config.weights;
        let overall = (assertion_score * w_assert
            + coverage_score * w_cov
            + mutation_score * w_mut
            + static_score * w_static)
            .clamp(0.0, 100.0);

        let grade = QualityScore::grade_for(overall);
        let passed = overall >= self.config.min_score;

        debug!(
            overall,
            assertion_score, coverage_score, mutation_score, static_score, "quality scored"
        );

        QualityScore {
            overall,
            grade,
            passed,
            assertion_score,
            coverage_score,
            mutation_score,
            static_score,
            breakdown: QualityBreakdown {
                test_count: analysis.test_count,
                assertion_count: analysis.assertion_count,
                trivial_assertions: analysis.trivial_count,
                assertion_kinds: analysis.kinds.len() as u64,
                target_called: analysis.target_called,
            },
            recommendation: recommendation_for(overall, &issues),
            issues,
        }
    }

    fn assertion_axis(&self, analysis: &AssertionAnalysis) -> f64 {
        let mut score: f64 = 100.0;

        if analysis.test_count == 0 {
            return 0.0;
        }

        let avg = analysis.assertion_count as f64 / analysis.test_count as f64;
        if avg < self.config.min_avg_assertions {
            score -= 25.0;
        }

        if analysis.assertion_count > 0 {
            let trivial_ratio = analysis.trivial_count as f64 / analysis.assertion_count as f64;
            if trivial_ratio > self.config.max_trivial_ratio {
                score -= 25.0;
            }
        } else {
            score -= 40.0;
        }

        if !analysis.target_called {
            score -= 30.0;
        }

        score.clamp(0.0, 100.0)
    }

    fn coverage_axis(
        &self,
        coverage: Option<&CoverageReport>,
        target_covered: Option<bool>,
        issues: &mut Vec<QualityIssue>,
    ) -> f64 {
        let Some(report) = coverage else {
            // no signal: neutral midpoint rather than reward or penalty
            return 50.0;
        };

        let mut score = if report.percentage >= 80.0 {
            100.0
        } else {
            let shortfall = (self.config.min_coverage - report.percentage).max(0.0);
            (100.0 - shortfall * 2.0).max(0.0)
        };

        if report.percentage < self.config.min_coverage {
            issues.push(QualityIssue {
                severity: IssueSeverity::High,
                category: "coverage".to_string(),
                message: format!(
                    "coverage {:.1}% below minimum {:.1}%",
                    report.percentage, self.config.min_coverage
                ),
                suggestion: Some("add cases for uncovered branches".to_string()),
            });
        }

        if target_covered == Some(false) {
            score -= 40.0;
            issues.push(QualityIssue {
                severity: IssueSeverity::Critical,
                category: "coverage".to_string(),
                message: "target function is not covered by the generated tests".to_string(),
                suggestion: Some("exercise the target directly".to_string()),
            });
        }

        score.clamp(0.0, 100.0)
    }

    fn mutation_axis(
        &self,
        mutation: Option<&MutationResult>,
        issues: &mut Vec<QualityIssue>,
    ) -> f64 {
        let Some(result) = mutation else {
            return 50.0;
        };

        let score = result.score * 100.0;

        if result.total > 0 && result.score < 0.3 {
            issues.push(QualityIssue {
                severity: IssueSeverity::High,
                category: "mutation".to_string(),
                message: format!("mutation score {:.2} is very low", result.score),
                suggestion: Some("strengthen assertions to kill surviving mutants".to_string()),
            });
        } else if result.total > 0 && result.score < self.config.min_mutation {
            issues.push(QualityIssue {
                severity: IssueSeverity::Medium,
                category: "mutation".to_string(),
                message: format!(
                    "mutation score {:.2} below minimum {:.2}",
                    result.score, self.config.min_mutation
                ),
                suggestion: None,
            });
        }

        score.clamp(0.0, 100.0)
    }

    fn static_axis(&self, analysis: &AssertionAnalysis) -> f64 {
        let mut score: f64 = 100.0;

        for issue in &analysis.issues {
            score -= match issue.severity {
                IssueSeverity::Critical => 25.0,
                IssueSeverity::High => 15.0,
                IssueSeverity::Medium => 10.0,
                IssueSeverity::Low => 5.0,
                IssueSeverity::Info => 0.0,
            };
        }

        // assertion variety: several kinds is a strength, a single kind
        // spread over many assertions is a weakness
        if analysis.kinds.len() >= 3 {
            score += 10.0;
        } else if analysis.kinds.len() == 1 && analysis.assertion_count > 3 {
            score -= 10.0;
        }

        score.clamp(0.0, 100.0)
    }
}

fn recommendation_for(overall: f64, issues: &[QualityIssue]) -> String {
    if overall >= 90.0 {
        return "excellent test quality, ship as-is".to_string();
    }
    let critical: Vec<&str> = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Critical)
        .map(|i| i.message.as_str())
        .collect();
    if !critical.is_empty() {
        return format!("address critical issues first: {}", critical.join("; "));
    }
    if overall >= 60.0 {
        "acceptable quality, consider strengthening weak axes".to_string()
    } else {
        "regenerate with more specific assertions and broader coverage".to_string()
    }
}
