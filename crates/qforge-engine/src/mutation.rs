//! # Mutation Engine Driver
//!
//! Orchestrates an external mutation tool, parses per-mutant result
//! lines, and falls back to summary counts only when no per-mutant lines
//! were produced. A trivial baseline backend stands in when no real tool
//! is installed.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use qforge_core::{
    MutantRecord, MutantStatus, MutationCategory, MutationResult, QForgeError, QResult,
};

use crate::process::{ExecOutput, ProcessExecutor};

/// One mutation tool the driver can select
#[async_trait]
pub trait MutationBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn is_available(&self, cancel: &CancellationToken) -> bool;
    async fn run(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        source_file: &str,
        timeout: Duration,
    ) -> QResult<ExecOutput>;
}

/// go-mutesting subprocess backend
pub struct GoMutestingBackend {
    executor: Arc<dyn ProcessExecutor>,
}

impl GoMutestingBackend {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl MutationBackend for GoMutestingBackend {
    fn name(&self) -> &'static str {
        "go-mutesting"
    }

    async fn is_available(&self, cancel: &CancellationToken) -> bool {
        self.executor
            .run(
                cancel,
                Path::new("."),
                "go-mutesting",
                &["--help".to_string()],
                Duration::from_secs(10),
            )
            .await
            .is_ok()
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        source_file: &str,
        timeout: Duration,
    ) -> QResult<ExecOutput> {
        self.executor
            .run(
                cancel,
                workdir,
                "go-mutesting",
                &[source_file.to_string()],
                timeout,
            )
            .await
    }
}

/// Fallback when no mutation tool is installed: runs the baseline suite
/// so the caller still learns whether tests pass, and reports the tool
/// gap explicitly.
pub struct BaselineBackend {
    executor: Arc<dyn ProcessExecutor>,
}

impl BaselineBackend {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl MutationBackend for BaselineBackend {
    fn name(&self) -> &'static str {
        "baseline"
    }

    async fn is_available(&self, _cancel: &CancellationToken) -> bool {
        true
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        _source_file: &str,
        timeout: Duration,
    ) -> QResult<ExecOutput> {
        self.executor
            .run(
                cancel,
                workdir,
                "go",
                &["test".to_string(), "./...".to_string()],
                timeout,
            )
            .await
    }
}

pub struct MutationDriver {
    backends: Vec<Box<dyn MutationBackend>>,
    total_timeout: Duration,
}

impl MutationDriver {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            backends: vec![
                Box::new(GoMutestingBackend::new(Arc::clone(&executor))),
                Box::new(BaselineBackend::new(executor)),
            ],
            total_timeout: Duration::from_secs(900),
        }
    }

    pub fn with_backends(mut self, backends: Vec<Box<dyn MutationBackend>>) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    /// Run mutation testing with the first available backend
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        source_file: &str,
        test_file: &str,
    ) -> QResult<MutationResult> {
        let started = Instant::now();

        let mut selected = None;
        for backend in &self.backends {
            if backend.is_available(cancel).await {
                selected = Some(backend);
                break;
            }
        }
        let Some(backend) = selected else {
            return Err(QForgeError::Input {
                reason: "no mutation backend available".to_string(),
            });
        };

        info!(backend = backend.name(), source_file, "running mutation testing");

        let output = match backend
            .run(cancel, workdir, source_file, self.total_timeout)
            .await
        {
            Ok(output) => output,
            Err(QForgeError::Cancelled) | Err(QForgeError::Subprocess { .. }) => {
                // interrupted runs surface whatever partial signal we have
                warn!(backend = backend.name(), "mutation run interrupted");
                return Ok(MutationResult {
                    source_file: source_file.to_string(),
                    test_file: test_file.to_string(),
                    total: 0,
                    killed: 0,
                    survived: 0,
                    timed_out: 0,
                    score: 0.0,
                    mutants: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some("timed out".to_string()),
                });
            }
            Err(other) => return Err(other),
        };

        let mut result = assemble_result(source_file, test_file, &output.combined());
        result.duration_ms = started.elapsed().as_millis() as u64;
        if backend.name() == "baseline" {
            result.error = Some("tool unavailable".to_string());
        }
        Ok(result)
    }
}

/// Build the result from tool output: per-mutant lines first, summary
/// counts only when no per-mutant lines were recognized.
pub fn assemble_result(source_file: &str, test_file: &str, output: &str) -> MutationResult {
    let mutants = parse_mutant_lines(output);

    let (total, killed, survived, timed_out) = if mutants.is_empty() {
        match parse_summary(output) {
            Some((killed, survived)) => (killed + survived, killed, survived, 0),
            None => (0, 0, 0, 0),
        }
    } else {
        let killed = mutants.iter().filter(|m| m.status == MutantStatus::Killed).count() as u64;
        let survived = mutants.iter().filter(|m| m.status == MutantStatus::Survived).count() as u64;
        let timed_out = mutants.iter().filter(|m| m.status == MutantStatus::Timeout).count() as u64;
        (mutants.len() as u64, killed, survived, timed_out)
    };

    let score = if total > 0 {
        killed as f64 / total as f64
    } else {
        0.0
    };

    MutationResult {
        source_file: source_file.to_string(),
        test_file: test_file.to_string(),
        total,
        killed,
        survived,
        timed_out,
        score,
        mutants,
        duration_ms: 0,
        error: None,
    }
}

/// `PASS|FAIL|SKIP: file:line: description` lines. PASS means the suite
/// caught (killed) the mutant, FAIL means it survived, SKIP maps to a
/// timeout.
pub fn parse_mutant_lines(output: &str) -> Vec<MutantRecord> {
    let line_re = Regex::new(r"(?m)^(PASS|FAIL|SKIP):\s+(?:.+?):(\d+)(?::\d+)?:?\s*(.*)$").unwrap();

    let mut mutants = Vec::new();
    for (index, caps) in line_re.captures_iter(output).enumerate() {
        let status = match &caps[1] {
            "PASS" => MutantStatus::Killed,
            "FAIL" => MutantStatus::Survived,
            _ => MutantStatus::Timeout,
        };
        let line: u32 = caps[2].parse().unwrap_or(0);
        let description = caps[3].trim().to_string();

        mutants.push(MutantRecord {
            id: format!("mutant-{index}"),
            category: infer_category(&description),
            line,
            status,
            description,
        });
    }
    mutants
}

/// Infer the mutation category from its free-text description
pub fn infer_category(description: &str) -> MutationCategory {
    let lower = description.to_lowercase();

    if lower.contains("&&") || lower.contains("||") {
        return MutationCategory::Boolean;
    }
    if lower.contains("==")
        || lower.contains("!=")
        || lower.contains("<=")
        || lower.contains(">=")
        || lower.contains('<')
        || lower.contains('>')
    {
        return MutationCategory::Comparison;
    }
    if lower.contains('!') {
        return MutationCategory::Boolean;
    }
    if lower.contains('+')
        || lower.contains('-')
        || lower.contains('*')
        || lower.contains('/')
        || lower.contains('%')
        || lower.contains("arith")
    {
        return MutationCategory::Arithmetic;
    }
    if lower.contains("return") {
        return MutationCategory::Return;
    }
    if lower.contains("if ") || lower.contains("else") || lower.contains("branch") || lower.contains("case") {
        return MutationCategory::Branch;
    }
    if lower.contains("statement") || lower.contains("removed") {
        return MutationCategory::Statement;
    }
    MutationCategory::Unknown
}

/// Summary fallback: "N mutants passed / M mutants did not pass"
pub fn parse_summary(output: &str) -> Option<(u64, u64)> {
    let passed_re = Regex::new(r"(\d+)\s+mutants? passed").unwrap();
    let failed_re = Regex::new(r"(\d+)\s+mutants? did not pass").unwrap();

    let passed = passed_re.captures(output)?.get(1)?.as_str().parse().ok()?;
    let failed = failed_re
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some((passed, failed))
}
