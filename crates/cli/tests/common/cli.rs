//! CLI command execution helpers
//!
//! Wraps the built `pathwatch` binary with an isolated config directory and
//! convenient assertions.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// CLI command builder
pub struct PathwatchCommand {
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl PathwatchCommand {
    /// Create a command whose default config lives under `working_dir`
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        let mut env = HashMap::new();
        env.insert(
            "XDG_CONFIG_HOME".to_string(),
            working_dir.join("xdg").display().to_string(),
        );
        env.insert("RUST_LOG".to_string(), "warn".to_string());

        Self {
            working_dir,
            args: Vec::new(),
            env,
        }
    }

    /// Add command arguments
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set environment variable
    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_pathwatch"));
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .env_remove("RUST_LOG")
            .envs(&self.env);
        command
    }

    /// Run to completion
    pub fn execute(&self) -> Result<CommandResult> {
        let start = Instant::now();
        let output = self.command().output().context("Failed to execute command")?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    /// Execute and assert success
    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }

        Ok(result)
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }

        Ok(result)
    }

    /// Start a long-running command and stream its stdout lines
    pub fn spawn(&self) -> Result<RunningCommand> {
        let mut child = self
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn command")?;

        let stdout = child.stdout.take().context("stdout not captured")?;
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(RunningCommand { child, lines })
    }
}

/// A spawned command; killed on drop
pub struct RunningCommand {
    child: Child,
    lines: mpsc::Receiver<String>,
}

impl RunningCommand {
    /// Next stdout line, waiting at most `timeout`
    pub fn next_line(&self, timeout: Duration) -> Result<String> {
        self.lines
            .recv_timeout(timeout)
            .context("no output line before timeout")
    }
}

impl Drop for RunningCommand {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout lines parsed as JSON
    pub fn json_lines(&self) -> Result<Vec<serde_json::Value>> {
        self.stdout
            .lines()
            .map(|line| serde_json::from_str(line).with_context(|| format!("not JSON: {line}")))
            .collect()
    }

    /// Check if stderr contains text
    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }
}

/// Macro for convenient command construction
///
/// Usage:
/// ```
/// pathwatch!(dir, "monitor", path, "--poll").assert_success()?;
/// ```
#[macro_export]
macro_rules! pathwatch {
    ($dir:expr, $($arg:expr),*) => {{
        let mut cmd = $crate::common::cli::PathwatchCommand::new($dir);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}
