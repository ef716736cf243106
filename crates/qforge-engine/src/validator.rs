//! # Test Validator
//!
//! Runs the language-appropriate test runner and parses failures into
//! structured records. Parsers are permissive: output in an unknown
//! format yields zero failure records, but a non-zero exit still reports
//! the run as failed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use qforge_core::QResult;

use crate::process::ProcessExecutor;

/// One parsed test failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFailureRecord {
    pub test_name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Outcome of one validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub exit_code: i32,
    pub failures: Vec<TestFailureRecord>,
    pub raw_output: String,
    pub duration_ms: u64,
}

pub struct TestValidator {
    executor: Arc<dyn ProcessExecutor>,
    timeout: Duration,
}

impl TestValidator {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            executor,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the test suite for `language` inside `workdir`
    pub async fn validate(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        language: &str,
    ) -> QResult<ValidationReport> {
        let (program, args) = runner_command(language);
        info!(language, program, "running test suite");

        let output = self
            .executor
            .run(cancel, workdir, program, &args, self.timeout)
            .await?;

        let combined = output.combined();
        let failures = parse_failures(language, &combined);
        let passed = output.success();
        debug!(passed, failures = failures.len(), "validation finished");

        Ok(ValidationReport {
            passed,
            exit_code: output.exit_code,
            failures,
            raw_output: combined,
            duration_ms: output.duration.as_millis() as u64,
        })
    }
}

fn runner_command(language: &str) -> (&'static str, Vec<String>) {
    match language {
        "python" => (
            "pytest",
            vec!["-v".to_string(), "--tb=short".to_string()],
        ),
        "javascript" | "typescript" | "jsx" | "tsx" => (
            "npx",
            vec!["jest".to_string(), "--colors=false".to_string()],
        ),
        // go is also the fallback per the detection markers
        _ => ("go", vec!["test".to_string(), "./...".to_string()]),
    }
}

/// Dispatch to the language's failure parser; unknown formats produce no
/// records.
pub fn parse_failures(language: &str, output: &str) -> Vec<TestFailureRecord> {
    match language {
        "python" => parse_pytest(output),
        "javascript" | "typescript" | "jsx" | "tsx" => parse_jest(output),
        _ => parse_go_test(output),
    }
}

/// `--- FAIL: TestName (0.00s)` followed by `    file_test.go:12: message`
fn parse_go_test(output: &str) -> Vec<TestFailureRecord> {
    let header = Regex::new(r"^--- FAIL: (\S+)").unwrap();
    let detail = Regex::new(r"^\s+\S+\.go:(\d+): (.+)$").unwrap();

    let mut failures = Vec::new();
    let lines: Vec<&str> = output.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = header.captures(line) else {
            continue;
        };
        let test_name = caps[1].to_string();
        let mut message = String::new();
        let mut line_no = None;

        for follow in lines.iter().skip(i + 1).take(10) {
            if follow.starts_with("--- ") || follow.starts_with("FAIL") || follow.starts_with("ok ")
            {
                break;
            }
            if let Some(d) = detail.captures(follow) {
                if message.is_empty() {
                    line_no = d[1].parse().ok();
                    message = d[2].to_string();
                } else {
                    message.push('\n');
                    message.push_str(&d[2]);
                }
            }
        }

        if message.is_empty() {
            message = "test failed".to_string();
        }

        let (expected, actual) = extract_expected_actual(&message);
        failures.push(TestFailureRecord {
            test_name,
            message,
            expected,
            actual,
            stack_trace: None,
            line: line_no,
        });
    }

    failures
}

/// `FAILED test_x.py::test_name - AssertionError: assert 3 == 5`
fn parse_pytest(output: &str) -> Vec<TestFailureRecord> {
    let summary = Regex::new(r"(?m)^FAILED\s+(\S+?)::(\S+?)(?:\s+-\s+(.*))?$").unwrap();

    let mut failures = Vec::new();
    for caps in summary.captures_iter(output) {
        let message = caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "test failed".to_string());
        let (expected, actual) = extract_expected_actual(&message);
        failures.push(TestFailureRecord {
            test_name: caps[2].to_string(),
            message,
            expected,
            actual,
            stack_trace: None,
            line: None,
        });
    }
    failures
}

/// Jest `● suite › name` blocks with Expected/Received lines
fn parse_jest(output: &str) -> Vec<TestFailureRecord> {
    let header = Regex::new(r"(?m)^\s*● (.+)$").unwrap();
    let expected_re = Regex::new(r"Expected:\s*(.+)").unwrap();
    let received_re = Regex::new(r"Received:\s*(.+)").unwrap();

    let mut failures = Vec::new();
    let matches: Vec<(usize, String)> = header
        .captures_iter(output)
        .map(|c| {
            let m = c.get(0).unwrap();
            (m.end(), c[1].trim().to_string())
        })
        .filter(|(_, name)| !name.starts_with("Test suite failed"))
        .collect();

    for (offset, test_name) in matches {
        let window_end = (offset + 600).min(output.len());
        let window = &output[offset..window_end];

        let expected = expected_re
            .captures(window)
            .map(|c| c[1].trim().to_string());
        let actual = received_re
            .captures(window)
            .map(|c| c[1].trim().to_string());

        let message = window
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("test failed")
            .to_string();

        failures.push(TestFailureRecord {
            test_name,
            message,
            expected,
            actual,
            stack_trace: None,
            line: None,
        });
    }
    failures
}

fn extract_expected_actual(message: &str) -> (Option<String>, Option<String>) {
    // go-style "expected X, got Y" and pytest-style "assert X == Y"
    if let Some(caps) = Regex::new(r"expected (.+?), got (.+)")
        .unwrap()
        .captures(message)
    {
        return (Some(caps[1].to_string()), Some(caps[2].to_string()));
    }
    if let Some(caps) = Regex::new(r"assert (.+?) == (.+)")
        .unwrap()
        .captures(message)
    {
        return (Some(caps[2].to_string()), Some(caps[1].to_string()));
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_OUTPUT: &str = r#"--- FAIL: TestAdd_Basic (0.00s)
    math_test.go:12: expected 5, got 4
--- FAIL: TestIsEven_Zero (0.00s)
    math_test.go:25: expected true, got false
FAIL
FAIL	example.com/mathutil	0.004s
"#;

    #[test]
    fn test_parse_go_failures() {
        let failures = parse_go_test(GO_OUTPUT);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].test_name, "TestAdd_Basic");
        assert_eq!(failures[0].line, Some(12));
        assert_eq!(failures[0].expected.as_deref(), Some("5"));
        assert_eq!(failures[0].actual.as_deref(), Some("4"));
    }

    #[test]
    fn test_parse_pytest_failures() {
        let output = r#"
test_math.py::test_add FAILED
=========================== short test summary info ============================
FAILED test_math.py::test_add - AssertionError: assert 4 == 5
FAILED test_math.py::test_even - AssertionError
"#;
        let failures = parse_pytest(output);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].test_name, "test_add");
        assert!(failures[0].message.contains("assert 4 == 5"));
        assert_eq!(failures[0].expected.as_deref(), Some("5"));
        assert_eq!(failures[1].message, "test failed");
    }

    #[test]
    fn test_parse_jest_failures() {
        let output = r#"
 FAIL  ./add.test.js
  ● add › adds two numbers

    expect(received).toBe(expected) // Object.is equality

    Expected: 5
    Received: 4

      3 |   test('adds two numbers', () => {
"#;
        let failures = parse_jest(output);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].test_name, "add › adds two numbers");
        assert_eq!(failures[0].expected.as_deref(), Some("5"));
        assert_eq!(failures[0].actual.as_deref(), Some("4"));
    }

    #[test]
    fn test_unknown_format_produces_no_records() {
        assert!(parse_go_test("some completely different output").is_empty());
        assert!(parse_pytest("garbage").is_empty());
        assert!(parse_jest("garbage").is_empty());
    }

    mod validate {
        use super::*;
        use crate::process::ExecOutput;
        use async_trait::async_trait;
        use std::time::Duration;

        struct FixedExecutor {
            output: ExecOutput,
        }

        #[async_trait]
        impl ProcessExecutor for FixedExecutor {
            async fn run(
                &self,
                _cancel: &CancellationToken,
                _workdir: &Path,
                _program: &str,
                _args: &[String],
                _timeout: Duration,
            ) -> QResult<ExecOutput> {
                Ok(self.output.clone())
            }
        }

        #[tokio::test]
        async fn test_nonzero_exit_with_unknown_output_fails_without_records() {
            let validator = TestValidator::new(Arc::new(FixedExecutor {
                output: ExecOutput {
                    stdout: "mystery harness output".to_string(),
                    stderr: String::new(),
                    exit_code: 2,
                    duration: Duration::from_millis(5),
                },
            }));

            let report = validator
                .validate(&CancellationToken::new(), Path::new("."), "go")
                .await
                .unwrap();

            assert!(!report.passed);
            assert!(report.failures.is_empty());
            assert_eq!(report.exit_code, 2);
        }

        #[tokio::test]
        async fn test_passing_run() {
            let validator = TestValidator::new(Arc::new(FixedExecutor {
                output: ExecOutput {
                    stdout: "ok  \texample.com/mathutil\t0.002s".to_string(),
                    stderr: String::new(),
                    exit_code: 0,
                    duration: Duration::from_millis(5),
                },
            }));

            let report = validator
                .validate(&CancellationToken::new(), Path::new("."), "go")
                .await
                .unwrap();

            assert!(report.passed);
            assert!(report.failures.is_empty());
        }
    }
}
