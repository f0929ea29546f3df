//! Task execution in an isolated child process.
//!
//! Every task runs in a fresh child spawned from the current executable with
//! the `analyze` subcommand. The child:
//!
//! 1. Reads an [`AnalysisJob`] as JSON from stdin
//! 2. Applies `RLIMIT_AS` to itself
//! 3. Runs the analysis and prints the [`AnalysisOutcome`] as JSON on stdout
//!
//! The child leads its own process group, so the browser it starts belongs to
//! that group. The parent enforces a hard wall-clock timeout and kills the
//! whole group when it expires; leftovers are killed after a normal exit too.
//! Child stderr is passed through to the consumer's stderr line by line.

mod child;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::config::{AnalysisEnvironment, PROCESS_TIMEOUT_MESSAGE, STDERR_TAIL_LINES};
use crate::error_handling::ExecutorError;
use crate::models::{AnalysisKind, AnalysisOutcome};

pub use child::{apply_memory_limit, run_analysis, run_job};

/// Everything a child needs to run one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub kind: AnalysisKind,
    pub domain: String,
    /// The `<analysis>_config` document from the task request
    pub config: Value,
    pub environment: AnalysisEnvironment,
}

/// Runs analysis jobs in child processes with a hard timeout.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    environment: AnalysisEnvironment,
}

impl TaskExecutor {
    /// Executor re-invoking the current binary as `analyze`.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the current executable cannot be located.
    pub fn new(timeout: Duration, environment: AnalysisEnvironment) -> std::io::Result<Self> {
        Ok(Self::with_command(
            std::env::current_exe()?,
            vec!["analyze".to_string()],
            timeout,
            environment,
        ))
    }

    /// Executor running an arbitrary program that speaks the job protocol.
    pub fn with_command(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Duration,
        environment: AnalysisEnvironment,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            environment,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one analysis. Never fails: every failure becomes an `{exception}` outcome.
    pub async fn execute(&self, kind: AnalysisKind, domain: &str, config: Value) -> AnalysisOutcome {
        let job = AnalysisJob {
            kind,
            domain: domain.to_string(),
            config,
            environment: self.environment.clone(),
        };
        let started = std::time::Instant::now();
        info!("Executing {} for {}", kind, domain);

        match self.run_child(&job).await {
            Ok(outcome) => {
                info!(
                    "Finished {} for {} in {:.1}s{}",
                    kind,
                    domain,
                    started.elapsed().as_secs_f64(),
                    if outcome.is_exception() { " with exception" } else { "" }
                );
                outcome
            }
            Err(ExecutorError::Timeout) => {
                warn!("Analysis of {} timed out after {:?}", domain, self.timeout);
                AnalysisOutcome::exception(PROCESS_TIMEOUT_MESSAGE)
            }
            Err(e) => {
                error!("Analysis of {} failed: {}", domain, e);
                AnalysisOutcome::exception(e.to_string())
            }
        }
    }

    async fn run_child(&self, job: &AnalysisJob) -> Result<AnalysisOutcome, ExecutorError> {
        let input = serde_json::to_vec(job)?;
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(ExecutorError::Spawn)?;
        let pid = child.id();
        debug!("Spawned analysis process {:?}", pid);

        // A child that exits before reading its job reports why through its exit status.
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    warn!("Could not pass job to analysis process: {}", e);
                }
            });
        }
        let stdout = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        });
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            match stderr {
                Some(stderr) => forward_stderr(stderr, STDERR_TAIL_LINES).await,
                None => Vec::new(),
            }
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    debug!("Analysis process {:?} already gone: {}", pid, e);
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(ExecutorError::Timeout);
            }
        };
        // Browser processes may outlive a child that exited on its own.
        kill_process_group(pid);
        let status = status.map_err(ExecutorError::Wait)?;

        let stdout = match stdout_task.await {
            Ok(read) => read.map_err(ExecutorError::Wait)?,
            Err(e) => return Err(ExecutorError::Wait(std::io::Error::other(e))),
        };
        let tail = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(ExecutorError::ExitStatus {
                status: status.to_string(),
                stderr: tail.join("\n"),
            });
        }
        Ok(serde_json::from_slice(&stdout)?)
    }
}

/// Copies child stderr to our stderr line by line and returns the last `keep` lines.
async fn forward_stderr<R: AsyncRead + Unpin>(stderr: R, keep: usize) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(keep);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                eprintln!("{}", line);
                if tail.len() == keep {
                    tail.pop_front();
                }
                if keep > 0 {
                    tail.push_back(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading analysis stderr: {}", e);
                break;
            }
        }
    }
    tail.into()
}

/// Kills every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) => debug!("Killed process group {}", pid),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!("Could not kill process group {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str, timeout: Duration) -> TaskExecutor {
        TaskExecutor::with_command(
            "/bin/sh",
            vec!["-c".to_string(), script.to_string()],
            timeout,
            AnalysisEnvironment::default(),
        )
    }

    #[tokio::test]
    async fn test_child_outcome_is_parsed() {
        let executor = shell(
            r#"cat > /dev/null; echo '{"resolved":{"reachable":false,"error_msg":"Timeout"}}'"#,
            Duration::from_secs(10),
        );
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert!(!outcome.is_exception());
        assert_eq!(outcome.into_value()["resolved"]["error_msg"], "Timeout");
    }

    #[tokio::test]
    async fn test_hung_child_times_out() {
        let executor = shell("sleep 30", Duration::from_millis(200));
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert_eq!(
            outcome.into_value(),
            serde_json::json!({"exception": "Process timeout"})
        );

        // The executor stays usable after a timeout.
        let executor = shell(r#"cat > /dev/null; echo '{"exception":"boom"}'"#, Duration::from_secs(10));
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert!(outcome.is_exception());
    }

    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        // Zombies waiting for their new parent to reap them count as gone.
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!(
            "cat > /dev/null; sleep 300 & echo $! > {}; wait",
            pid_file.display()
        );
        let executor = shell(&script, Duration::from_millis(500));
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert_eq!(
            outcome.into_value(),
            serde_json::json!({"exception": "Process timeout"})
        );

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut gone = false;
        for _ in 0..30 {
            if !is_running(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gone, "grandchild {} survived the timeout", pid);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_leftover_processes_killed_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("leftover.pid");
        let script = format!(
            "cat > /dev/null; sleep 300 > /dev/null 2>&1 & echo $! > {}; echo '{{\"done\":true}}'",
            pid_file.display()
        );
        let executor = shell(&script, Duration::from_secs(10));
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert_eq!(outcome.into_value(), serde_json::json!({"done": true}));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut gone = false;
        for _ in 0..30 {
            if !is_running(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gone, "leftover {} survived the child", pid);
    }

    #[tokio::test]
    async fn test_forward_stderr_keeps_bounded_tail() {
        let input: &[u8] = b"one\ntwo\nthree\nfour\n";
        assert_eq!(forward_stderr(input, 2).await, vec!["three", "four"]);
        let input: &[u8] = b"only\n";
        assert_eq!(forward_stderr(input, 5).await, vec!["only"]);
        let input: &[u8] = b"dropped\n";
        assert!(forward_stderr(input, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_successful_child_stderr_does_not_leak_into_outcome() {
        let executor = shell(
            r#"cat > /dev/null; echo 'progress line' >&2; echo '{"done":true}'"#,
            Duration::from_secs(10),
        );
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert_eq!(outcome.into_value(), serde_json::json!({"done": true}));
    }

    #[tokio::test]
    async fn test_failing_child_becomes_exception() {
        let executor = shell("cat > /dev/null; echo broken >&2; exit 3", Duration::from_secs(10));
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        let value = outcome.into_value();
        let message = value["exception"].as_str().unwrap();
        assert!(message.contains("broken"), "{}", message);
    }

    #[tokio::test]
    async fn test_unparsable_output_becomes_exception() {
        let executor = shell("cat > /dev/null; echo not-json", Duration::from_secs(10));
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert!(outcome.is_exception());
    }

    #[tokio::test]
    async fn test_missing_program_becomes_exception() {
        let executor = TaskExecutor::with_command(
            "/nonexistent/analyzer",
            Vec::new(),
            Duration::from_secs(1),
            AnalysisEnvironment::default(),
        );
        let outcome = executor
            .execute(AnalysisKind::LandscapeAnalysis, "example.com", Value::Null)
            .await;
        assert!(outcome.into_value()["exception"]
            .as_str()
            .unwrap()
            .starts_with("Failed to spawn"));
    }
}
