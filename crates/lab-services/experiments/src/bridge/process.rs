//! Runs external scripts through the configured interpreter and captures
//! their console output.
//!
//! The invoker knows nothing about training; it starts `interpreter script
//! args...` in the project directory, echoes both streams through `tracing`
//! while they are produced, and reports the outcome as a [`ProcessOutput`]
//! or a [`LabError`].

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{LabError, Result};
use lab_error::LAUNCH_FAILURE_CODE;

/// Captured result of a process that exited successfully.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Accumulates process output, optionally keeping only the most recent
/// `limit` bytes.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
    limit: Option<usize>,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);

        let Some(limit) = self.limit else {
            return;
        };
        if self.text.len() <= limit {
            return;
        }

        let mut cut = self.text.len() - limit;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        self.text.drain(..cut);
        self.truncated = true;
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Launches interpreter processes for the training project.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    interpreter: OsString,
    work_dir: PathBuf,
    env_vars: HashMap<String, String>,
    timeout: Option<Duration>,
    max_output_bytes: Option<usize>,
}

impl ProcessInvoker {
    pub fn new(interpreter: impl Into<OsString>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            work_dir: work_dir.into(),
            env_vars: HashMap::new(),
            timeout: None,
            max_output_bytes: None,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(&config.interpreter, &config.project_root)
            .with_timeout(config.timeout())
            .with_max_output_bytes(config.max_output_bytes)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Add an environment variable for every launched process
    pub fn set_env_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env_vars.insert(key.into(), value.into());
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `PYTHONPATH` with the project root in front of any inherited entries.
    fn python_path(&self) -> Result<OsString> {
        let mut entries = vec![self.work_dir.clone()];
        if let Some(existing) = std::env::var_os("PYTHONPATH") {
            entries.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(entries)
            .map_err(|e| LabError::ProcessLaunch(format!("invalid PYTHONPATH entry: {e}")))
    }

    /// Runs `interpreter script args...` and waits for it to finish.
    ///
    /// # Errors
    ///
    /// * `LabError::ProcessLaunch` if the process cannot be started
    /// * `LabError::ProcessExit` if it exits with a nonzero code or is killed
    ///   by a signal; the payload is stderr, or stdout when stderr is empty
    /// * `LabError::Timeout` if a timeout is configured and expires first
    pub async fn run(&self, script: &str, args: &[String]) -> Result<ProcessOutput> {
        let started = Instant::now();

        info!(
            interpreter = %self.interpreter.to_string_lossy(),
            script,
            args = %args.join(" "),
            "Launching process"
        );

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .args(args)
            .current_dir(&self.work_dir)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONPATH", self.python_path()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            LabError::ProcessLaunch(format!(
                "{} {script}: {e} (exit code {LAUNCH_FAILURE_CODE})",
                self.interpreter.to_string_lossy()
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LabError::ProcessLaunch("no stdout handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LabError::ProcessLaunch("no stderr handle".to_string()))?;

        let stdout_task = tokio::spawn(drain(stdout, Stream::Stdout, self.max_output_bytes));
        let stderr_task = tokio::spawn(drain(stderr, Stream::Stderr, self.max_output_bytes));

        let status = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(script, timeout = ?limit, "Process timed out, killing it");
                        if let Err(e) = child.kill().await {
                            warn!(script, error = %e, "Failed to kill timed out process");
                        }
                        stdout_task.abort();
                        stderr_task.abort();
                        return Err(LabError::Timeout(format!(
                            "{script} did not finish within {limit:?}"
                        )));
                    }
                }
            }
            None => child.wait().await?,
        };

        let stdout = stdout_task
            .await
            .map_err(|e| LabError::Internal(format!("stdout reader failed: {e}")))?;
        let stderr = stderr_task
            .await
            .map_err(|e| LabError::Internal(format!("stderr reader failed: {e}")))?;

        let duration = started.elapsed();
        let exit_code = status.code().unwrap_or(LAUNCH_FAILURE_CODE);

        if !status.success() {
            warn!(script, exit_code, duration = ?duration, "Process failed");
            let output = if stderr.is_empty() { stdout } else { stderr };
            return Err(LabError::ProcessExit {
                code: exit_code,
                output,
            });
        }

        info!(script, exit_code, duration = ?duration, "Process completed");

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            duration,
        })
    }
}

async fn drain<R>(reader: R, stream: Stream, limit: Option<usize>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = OutputBuffer::new(limit);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let echoed = text.trim_end_matches(['\n', '\r']);
                match stream {
                    Stream::Stdout => info!(stream = stream.as_str(), "{echoed}"),
                    Stream::Stderr => warn!(stream = stream.as_str(), "{echoed}"),
                }
                buffer.push(&text);
            }
            Err(e) => {
                warn!(stream = stream.as_str(), error = %e, "Failed reading process output");
                break;
            }
        }
    }

    if buffer.is_truncated() {
        debug!(stream = stream.as_str(), "Process output truncated to its tail");
    }
    buffer.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_with_script(name: &str, body: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(name), body).unwrap();
        dir
    }

    fn sh(dir: &TempDir) -> ProcessInvoker {
        ProcessInvoker::new("sh", dir.path())
    }

    #[tokio::test]
    async fn test_successful_run_captures_stdout_and_args() {
        let dir = project_with_script("echo.sh", "echo \"args: $1 $2\"\necho done\n");
        let output = sh(&dir)
            .run("echo.sh", &["--config".to_string(), "a.yaml".to_string()])
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "args: --config a.yaml\ndone\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_environment_includes_project_root() {
        let dir = project_with_script(
            "env.sh",
            "echo \"unbuffered=$PYTHONUNBUFFERED\"\necho \"path=$PYTHONPATH\"\n",
        );
        let output = sh(&dir).run("env.sh", &[]).await.unwrap();

        assert!(output.stdout.contains("unbuffered=1"));
        let root = dir.path().to_string_lossy().to_string();
        assert!(output.stdout.contains(&format!("path={root}")));
    }

    #[tokio::test]
    async fn test_custom_env_var_is_passed() {
        let dir = project_with_script("custom.sh", "echo \"$LAB_MARKER\"\n");
        let mut invoker = sh(&dir);
        invoker.set_env_var("LAB_MARKER", "marker-value");

        let output = invoker.run("custom.sh", &[]).await.unwrap();
        assert_eq!(output.stdout.trim(), "marker-value");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let dir = project_with_script("fail.sh", "echo partial\necho 'boom' >&2\nexit 3\n");
        let err = sh(&dir).run("fail.sh", &[]).await.unwrap_err();

        match err {
            LabError::ProcessExit { code, output } => {
                assert_eq!(code, 3);
                assert_eq!(output, "boom\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_falls_back_to_stdout() {
        let dir = project_with_script("quiet.sh", "echo 'only stdout'\nexit 1\n");
        let err = sh(&dir).run("quiet.sh", &[]).await.unwrap_err();

        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.detail(), "only stdout\n");
    }

    #[tokio::test]
    async fn test_signal_termination_uses_sentinel_code() {
        let dir = project_with_script("killed.sh", "kill -KILL $$\n");
        let err = sh(&dir).run("killed.sh", &[]).await.unwrap_err();

        assert!(matches!(
            err,
            LabError::ProcessExit { code: LAUNCH_FAILURE_CODE, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_launch_error() {
        let dir = TempDir::new().unwrap();
        let invoker = ProcessInvoker::new("/nonexistent/bin/python-lab", dir.path());
        let err = invoker.run("train.py", &[]).await.unwrap_err();

        assert!(matches!(err, LabError::ProcessLaunch(_)));
        assert!(err.to_string().contains("-1"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = project_with_script("slow.sh", "sleep 5\n");
        let invoker = sh(&dir).with_timeout(Some(Duration::from_millis(200)));

        let started = Instant::now();
        let err = invoker.run("slow.sh", &[]).await.unwrap_err();

        assert!(matches!(err, LabError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_output_cap_keeps_tail() {
        let dir = project_with_script(
            "chatty.sh",
            "i=0\nwhile [ $i -lt 50 ]; do echo \"line $i\"; i=$((i+1)); done\necho 'accuracy 0.95 500'\n",
        );
        let invoker = sh(&dir).with_max_output_bytes(Some(32));
        let output = invoker.run("chatty.sh", &[]).await.unwrap();

        assert!(output.stdout.len() <= 32);
        assert!(output.stdout.ends_with("accuracy 0.95 500\n"));
    }

    #[test]
    fn test_output_buffer_respects_char_boundaries() {
        let mut buffer = OutputBuffer::new(Some(4));
        buffer.push("héllo");
        assert!(buffer.is_truncated());
        let text = buffer.into_string();
        assert!(text.len() <= 4);
        assert!(text.ends_with("llo"));
    }

    #[test]
    fn test_output_buffer_unbounded() {
        let mut buffer = OutputBuffer::new(None);
        buffer.push("a\n");
        buffer.push("b\n");
        assert!(!buffer.is_truncated());
        assert_eq!(buffer.into_string(), "a\nb\n");
    }
}
