//! Buffered subprocess execution
//!
//! [`SubprocessExecutor`] spawns the CLI (or any allow-listed executable) with
//! a sanitized environment, captures its output, and enforces a deadline with
//! graceful termination: SIGTERM first, SIGKILL after a grace period.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::config::{ClaudeConfig, DANGEROUS_ENV_VARS};
use crate::error::{ClaudeError, Result};
use crate::subprocess::registry::ProcessRegistry;
use crate::types::CommandResult;

/// How long a terminated process gets to exit before it is killed
pub(crate) const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Per-call execution options
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Deadline override; the config default applies when unset
    pub timeout: Option<Duration>,
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
    /// Extra environment variables, merged over the sanitized base
    pub env: HashMap<String, String>,
    /// Data written to the child's stdin before reading output
    pub input: Option<String>,
}

impl ExecOptions {
    /// Options with a deadline override
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

/// Async executor for CLI subprocesses
#[derive(Clone)]
pub struct SubprocessExecutor {
    pub(crate) config: Arc<ClaudeConfig>,
    pub(crate) registry: ProcessRegistry,
}

impl SubprocessExecutor {
    /// Create an executor over the given configuration
    #[must_use]
    pub fn new(config: Arc<ClaudeConfig>) -> Self {
        Self {
            config,
            registry: ProcessRegistry::new(),
        }
    }

    /// Number of executions currently in flight
    #[must_use]
    pub fn active_processes(&self) -> usize {
        self.registry.active_count()
    }

    /// Run a command to completion, capturing stdout and stderr.
    ///
    /// A non-zero exit code is an error. On timeout the child is terminated
    /// gracefully, then killed once [`TERMINATION_GRACE`] elapses.
    pub async fn execute(&self, argv: &[String], opts: ExecOptions) -> Result<CommandResult> {
        let command_line = self.validate(argv)?;
        let timeout = opts.timeout.unwrap_or(self.config.default_timeout);

        log::debug!("Executing `{command_line}` with timeout {timeout:?}");

        let started = Instant::now();
        let mut child = self.spawn(argv, &opts)?;

        // Stdin is fed from its own task, concurrent with output draining;
        // a writer blocked on a full pipe must not stall the deadline below.
        if let Some(input) = opts.input.clone() {
            if let Some(mut stdin) = child.stdin.take() {
                tokio::spawn(async move {
                    if let Err(err) = stdin.write_all(input.as_bytes()).await {
                        log::debug!("stdin write ended early: {err}");
                    }
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let guard = self.registry.register();
        let cancelled = guard.token();

        let status = tokio::select! {
            status = child.wait() => status?,
            () = tokio::time::sleep(timeout) => {
                log::warn!("`{command_line}` exceeded {timeout:?}, terminating");
                terminate_child(&mut child).await;
                return Err(ClaudeError::timeout(command_line, timeout));
            }
            () = cancelled.cancelled() => {
                terminate_child(&mut child).await;
                return Err(ClaudeError::connection(format!(
                    "`{command_line}` cancelled during shutdown"
                )));
            }
        };
        drop(guard);

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
        let exit_code = status.code().unwrap_or(-1);

        if !status.success() {
            log::debug!("`{command_line}` exited with code {exit_code}");
            return Err(ClaudeError::process(command_line, exit_code, stdout, stderr));
        }

        Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
            duration: started.elapsed(),
            command: command_line,
            timestamp: Utc::now(),
        })
    }

    /// Cancel every in-flight execution and wait for the registry to drain
    pub async fn cleanup(&self) {
        self.registry.shutdown(TERMINATION_GRACE).await;
    }

    /// Reject empty and disallowed commands; returns the display command line
    pub(crate) fn validate(&self, argv: &[String]) -> Result<String> {
        let Some(program) = argv.first() else {
            return Err(ClaudeError::invalid_config("empty command"));
        };
        let allowed = &self.config.allowed_commands;
        if !allowed.is_empty() {
            let name = program_name(program);
            if !allowed.iter().any(|a| a == program || a == name) {
                return Err(ClaudeError::CommandRejected(program.clone()));
            }
        }
        Ok(argv.join(" "))
    }

    pub(crate) fn spawn(&self, argv: &[String], opts: &ExecOptions) -> Result<Child> {
        let mut env = self.config.subprocess_env();
        for (key, value) in &opts.env {
            if DANGEROUS_ENV_VARS.contains(&key.as_str()) {
                log::warn!("Ignoring override of dangerous environment variable {key}");
                continue;
            }
            env.insert(key.clone(), value.clone());
        }

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .env_clear()
            .envs(&env)
            .stdin(if opts.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }

        command.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ClaudeError::cli_not_found(&argv[0])
            } else {
                ClaudeError::Io(err)
            }
        })
    }
}

/// Terminate a child: SIGTERM, wait out the grace period, then SIGKILL.
pub(crate) async fn terminate_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .await;
        if tokio::time::timeout(TERMINATION_GRACE, child.wait())
            .await
            .is_ok()
        {
            return;
        }
        log::warn!("Process {pid} ignored SIGTERM, killing");
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn program_name(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}
