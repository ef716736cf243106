//! # Test Fixer
//!
//! Feeds validation failures back to the LLM and applies repaired code
//! until the suite passes or the retry budget runs out. Original file
//! bytes are restored when every attempt fails; an already-passing file
//! is never rewritten.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use qforge_core::{QForgeError, QResult};
use qforge_llm::{CompletionRequest, LlmRouter, ModelTier};

use crate::validator::{TestFailureRecord, TestValidator};

/// Raw runner output included in repair prompts is capped at 1.5 KiB
const RAW_OUTPUT_CAP: usize = 1536;

const FIX_SYSTEM_PROMPT: &str = "You repair failing automated tests. Answer with \
an EXPLANATION: line followed by exactly one fenced code block containing the \
complete corrected test file.";

/// Result of a repair session
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub fixed: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

pub struct TestFixer {
    router: Arc<LlmRouter>,
    validator: Arc<TestValidator>,
    tier: ModelTier,
    max_retries: u32,
}

impl TestFixer {
    pub fn new(router: Arc<LlmRouter>, validator: Arc<TestValidator>, tier: ModelTier) -> Self {
        Self {
            router,
            validator,
            tier,
            max_retries: 3,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate, and while failing, repair `test_file` in place.
    pub async fn fix(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        test_file: &Path,
        language: &str,
    ) -> QResult<FixOutcome> {
        let original = tokio::fs::read(test_file).await?;

        let mut report = self.validator.validate(cancel, workdir, language).await?;
        if report.passed {
            return Ok(FixOutcome {
                fixed: true,
                attempts: 0,
                new_code: None,
                explanation: None,
            });
        }

        let mut explanation = None;
        for attempt in 1..=self.max_retries {
            info!(attempt, max = self.max_retries, "attempting test repair");

            let current_code = tokio::fs::read_to_string(test_file).await?;
            let prompt = build_fix_prompt(&current_code, &report.failures, &report.raw_output);

            let mut request =
                CompletionRequest::new(self.tier, prompt).with_system(FIX_SYSTEM_PROMPT);
            request.temperature = 0.2;

            let response = match self.router.complete(&request, cancel).await {
                Ok(r) => r,
                Err(QForgeError::Cancelled) => {
                    tokio::fs::write(test_file, &original).await?;
                    return Err(QForgeError::Cancelled);
                }
                Err(e) => {
                    warn!(error = %e, "repair completion failed");
                    continue;
                }
            };

            let Some(code) = extract_code_block(&response.content) else {
                warn!(attempt, "repair response carried no code block");
                continue;
            };
            explanation = extract_explanation(&response.content);

            tokio::fs::write(test_file, &code).await?;

            report = self.validator.validate(cancel, workdir, language).await?;
            if report.passed {
                return Ok(FixOutcome {
                    fixed: true,
                    attempts: attempt,
                    new_code: Some(code),
                    explanation,
                });
            }
        }

        // nothing worked; put the original bytes back
        tokio::fs::write(test_file, &original).await?;
        Ok(FixOutcome {
            fixed: false,
            attempts: self.max_retries,
            new_code: None,
            explanation,
        })
    }
}

fn build_fix_prompt(code: &str, failures: &[TestFailureRecord], raw_output: &str) -> String {
    let mut prompt = String::from("The following test file fails.\n\nCurrent code:\n```\n");
    prompt.push_str(code);
    prompt.push_str("\n```\n\nFailures:\n");
    for failure in failures {
        prompt.push_str(&format!("- {}: {}", failure.test_name, failure.message));
        if let (Some(expected), Some(actual)) = (&failure.expected, &failure.actual) {
            prompt.push_str(&format!(" (expected {expected}, actual {actual})"));
        }
        prompt.push('\n');
    }

    let raw = truncate_utf8(raw_output, RAW_OUTPUT_CAP);
    prompt.push_str("\nRunner output (truncated):\n");
    prompt.push_str(raw);
    prompt.push_str("\n\nReturn the corrected file.");
    prompt
}

fn truncate_utf8(text: &str, cap: usize) -> &str {
    if text.len() <= cap {
        return text;
    }
    let mut end = cap;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// First fenced code block in the completion
pub fn extract_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```[a-zA-Z]*\n([\s\S]*?)```").unwrap();
    re.captures(content)
        .map(|caps| caps[1].trim_end().to_string())
        .filter(|code| !code.trim().is_empty())
}

/// `EXPLANATION:` preamble, up to the first code fence
pub fn extract_explanation(content: &str) -> Option<String> {
    let idx = content.find("EXPLANATION:")?;
    let rest = &content[idx + "EXPLANATION:".len()..];
    let end = rest.find("```").unwrap_or(rest.len());
    let text = rest[..end].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
