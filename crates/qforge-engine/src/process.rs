//! # Subprocess Adapter
//!
//! Uniform interface over external tool invocation. Timeouts and caller
//! cancellation both propagate as a child-process kill; captured stdio is
//! size-bounded so a chatty tool cannot blow up memory.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use qforge_core::{QForgeError, QResult};

/// Per-stream capture limit
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Captured result of one subprocess run
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined, the shape most output parsers want
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Abstract executor so runners can be exercised without real tools
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> QResult<ExecOutput>;
}

/// Executor backed by `tokio::process`
pub struct TokioProcessExecutor;

#[async_trait]
impl ProcessExecutor for TokioProcessExecutor {
    async fn run(
        &self,
        cancel: &CancellationToken,
        workdir: &Path,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> QResult<ExecOutput> {
        debug!(program, ?args, workdir = %workdir.display(), "spawning subprocess");
        let started = Instant::now();

        let mut child = Command::new(program)
            .args(args)
            .current_dir(workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| QForgeError::Subprocess {
                program: program.to_string(),
                reason: format!("spawn failed: {e}"),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_capped(stdout));
        let stderr_task = tokio::spawn(read_capped(stderr));

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| QForgeError::Subprocess {
                program: program.to_string(),
                reason: format!("wait failed: {e}"),
            })?,
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                return Err(QForgeError::Cancelled);
            }
            _ = tokio::time::sleep(timeout) => {
                let _ = child.start_kill();
                return Err(QForgeError::Subprocess {
                    program: program.to_string(),
                    reason: "timed out".to_string(),
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
            duration: started.elapsed(),
        })
    }
}

async fn read_capped<R>(reader: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if captured.len() < MAX_CAPTURE_BYTES {
                    let take = n.min(MAX_CAPTURE_BYTES - captured.len());
                    captured.extend_from_slice(&buf[..take]);
                }
                // keep draining past the cap so the child never blocks
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&captured).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_output_and_exit() {
        let executor = TokioProcessExecutor;
        let output = executor
            .run(
                &CancellationToken::new(),
                Path::new("."),
                "sh",
                &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert!(output.combined().contains("out"));
        assert!(output.combined().contains("err"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let executor = TokioProcessExecutor;
        let err = executor
            .run(
                &CancellationToken::new(),
                Path::new("."),
                "sleep",
                &["30".to_string()],
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        match err {
            QForgeError::Subprocess { reason, .. } => assert_eq!(reason, "timed out"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_kills_child() {
        let executor = TokioProcessExecutor;
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = executor
            .run(
                &cancel,
                Path::new("."),
                "sleep",
                &["30".to_string()],
                Duration::from_secs(60),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QForgeError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_program_is_subprocess_error() {
        let executor = TokioProcessExecutor;
        let err = executor
            .run(
                &CancellationToken::new(),
                Path::new("."),
                "definitely-not-a-real-tool-qf",
                &[],
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QForgeError::Subprocess { .. }));
    }
}
