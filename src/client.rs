//! High-level client facade
//!
//! [`ClaudeClient`] ties the pieces together: it builds command lines,
//! executes them under the configured retry policy, scrapes session IDs and
//! content out of the CLI's output, and tracks sessions and workspaces so
//! [`ClaudeClient::close`] can tear everything down.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;

use crate::config::ClaudeConfig;
use crate::error::{ClaudeError, Result};
use crate::parser::parse_transcript;
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::session::{Session, SessionTracker};
use crate::subprocess::{CommandBuilder, ExecOptions, SubprocessExecutor};
use crate::types::{
    ClaudeResponse, CommandResult, OutputFormat, ResponseMetadata, SessionAwareResponse,
    SessionId, SessionInfo, StreamChunk, WorkspaceId, WorkspaceInfo,
};
use crate::workspace::WorkspaceManager;

/// Options for a plain [`ClaudeClient::query`]
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Output format requested from the CLI
    pub output_format: Option<OutputFormat>,
    /// Session to resume
    pub resume: Option<SessionId>,
    /// Files attached to the query
    pub files: Vec<String>,
    /// Deadline override
    pub timeout: Option<Duration>,
    /// Working directory for the CLI, usually a workspace path
    pub cwd: Option<PathBuf>,
}

/// Options for a session-aware query
#[derive(Debug, Clone, Default)]
pub struct SessionQueryOptions {
    /// Explicit session to resume; wins over `resume_last`
    pub session_id: Option<SessionId>,
    /// Resume the most recently seen session when no explicit one is given
    pub resume_last: bool,
    /// Deadline override
    pub timeout: Option<Duration>,
    /// Working directory for the CLI
    pub cwd: Option<PathBuf>,
}

struct ClientInner {
    config: Arc<ClaudeConfig>,
    executor: SubprocessExecutor,
    workspaces: WorkspaceManager,
    sessions: SessionTracker,
    last_session_id: Mutex<Option<SessionId>>,
    closed: AtomicBool,
}

/// Async client for the Claude CLI.
///
/// Cheap to clone; all clones share the same executor, session records, and
/// workspace registry.
#[derive(Clone)]
pub struct ClaudeClient {
    inner: Arc<ClientInner>,
}

impl ClaudeClient {
    /// Create a client over the given configuration
    pub fn new(config: ClaudeConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            inner: Arc::new(ClientInner {
                executor: SubprocessExecutor::new(config.clone()),
                workspaces: WorkspaceManager::new(&config),
                sessions: SessionTracker::default(),
                last_session_id: Mutex::new(None),
                closed: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Create a client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClaudeConfig::from_env())
    }

    /// The client's configuration
    #[must_use]
    pub fn config(&self) -> &ClaudeConfig {
        &self.inner.config
    }

    /// A command builder seeded from this client's configuration
    pub fn command_builder(&self) -> Result<CommandBuilder> {
        self.ensure_open()?;
        Ok(CommandBuilder::from_config(&self.inner.config))
    }

    /// Send a prompt and wait for the full response.
    ///
    /// Retryable failures (timeouts, connection errors) are re-attempted
    /// under the configured retry policy.
    pub async fn query(&self, prompt: &str, opts: QueryOptions) -> Result<ClaudeResponse> {
        self.ensure_open()?;

        let mut builder = CommandBuilder::from_config(&self.inner.config).prompt(prompt);
        if let Some(format) = opts.output_format {
            builder = builder.output_format(format);
        }
        if let Some(session_id) = &opts.resume {
            builder = builder.resume(session_id);
        }
        for file in &opts.files {
            builder = builder.file(file);
        }
        let argv = builder.build();

        let exec_opts = ExecOptions {
            timeout: opts.timeout,
            cwd: opts.cwd.clone(),
            ..ExecOptions::default()
        };
        let result = self.execute_with_retry(&argv, &exec_opts).await?;

        let parsed = parse_transcript(&result.stdout);
        let session_id = parsed
            .session_id
            .map(SessionId::from)
            .or_else(|| opts.resume.clone());
        if let Some(id) = &session_id {
            self.remember_session(id);
        }

        Ok(ClaudeResponse {
            content: parsed.content,
            session_id,
            metadata: ResponseMetadata {
                exit_code: result.exit_code,
                duration: result.duration,
                command: result.command,
                output_format: opts.output_format,
                resumed_session: opts.resume,
                is_error: parsed.is_error,
                error: parsed.error,
                skipped_lines: parsed.skipped_lines,
            },
        })
    }

    /// Send a prompt with full session handling.
    ///
    /// Forces the `stream-json` output format plus `--verbose` so the CLI
    /// emits the event stream the parser scrapes session IDs from, applies
    /// the configured prefix prompt, and resumes either the explicit session
    /// or the last one seen.
    pub async fn query_with_session(
        &self,
        prompt: &str,
        opts: SessionQueryOptions,
    ) -> Result<SessionAwareResponse> {
        self.ensure_open()?;

        let resume = opts.session_id.clone().or_else(|| {
            if opts.resume_last {
                self.inner.last_session_id.lock().clone()
            } else {
                None
            }
        });

        let prompt = self.inner.config.apply_prefix_prompt(prompt);
        let mut builder = CommandBuilder::from_config(&self.inner.config)
            .prompt(prompt)
            .output_format(OutputFormat::StreamJson)
            .flag("verbose");
        if let Some(session_id) = &resume {
            builder = builder.resume(session_id);
        }
        let argv = builder.build();

        let exec_opts = ExecOptions {
            timeout: opts.timeout,
            cwd: opts.cwd.clone(),
            ..ExecOptions::default()
        };
        let result = self.execute_with_retry(&argv, &exec_opts).await?;

        let parsed = parse_transcript(&result.stdout);
        let session_id = parsed.session_id.map(SessionId::from);
        if let Some(id) = &session_id {
            self.remember_session(id);
        }
        if parsed.is_error {
            log::warn!(
                "Session query reported an error: {}",
                parsed.error.as_deref().unwrap_or("unknown")
            );
        }

        Ok(SessionAwareResponse {
            content: parsed.content,
            session_id,
            raw_json: parsed.raw_result,
            metadata: ResponseMetadata {
                exit_code: result.exit_code,
                duration: result.duration,
                command: result.command,
                output_format: Some(OutputFormat::StreamJson),
                resumed_session: resume,
                is_error: parsed.is_error,
                error: parsed.error,
                skipped_lines: parsed.skipped_lines,
            },
        })
    }

    /// Send a prompt and stream the raw output as it arrives
    pub fn stream_query(
        &self,
        prompt: &str,
        opts: QueryOptions,
    ) -> Result<impl Stream<Item = Result<StreamChunk>> + Send + 'static> {
        self.ensure_open()?;

        let mut builder = CommandBuilder::from_config(&self.inner.config).prompt(prompt);
        if let Some(format) = opts.output_format {
            builder = builder.output_format(format);
        }
        if let Some(session_id) = &opts.resume {
            builder = builder.resume(session_id);
        }
        let argv = builder.build();

        let exec_opts = ExecOptions {
            timeout: opts.timeout,
            cwd: opts.cwd,
            ..ExecOptions::default()
        };
        Ok(self.inner.executor.execute_streaming(argv, exec_opts))
    }

    /// Run an arbitrary (allow-listed) command without retry
    pub async fn execute_command(
        &self,
        argv: &[String],
        opts: ExecOptions,
    ) -> Result<CommandResult> {
        self.ensure_open()?;
        self.inner.executor.execute(argv, opts).await
    }

    /// Start a fresh session; its ID is assigned by the first query
    pub fn create_session(&self) -> Result<Session> {
        self.ensure_open()?;
        Ok(Session::new(self.clone(), None))
    }

    /// Reattach to a known session ID
    pub fn resume_session(&self, session_id: SessionId) -> Result<Session> {
        self.ensure_open()?;
        Ok(Session::new(self.clone(), Some(session_id)))
    }

    /// Session records seen by this client
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.inner.sessions.list()
    }

    /// Look up one session record
    #[must_use]
    pub fn get_session(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.inner.sessions.get(session_id)
    }

    /// The most recently seen session ID
    #[must_use]
    pub fn last_session_id(&self) -> Option<SessionId> {
        self.inner.last_session_id.lock().clone()
    }

    /// Create an isolated workspace seeded with the given files
    pub async fn create_workspace(&self, files: &[PathBuf]) -> Result<WorkspaceInfo> {
        self.ensure_open()?;
        self.inner.workspaces.create(files).await
    }

    /// Workspaces created by this client and not yet cleaned up
    pub async fn list_workspaces(&self) -> Vec<WorkspaceInfo> {
        self.inner.workspaces.list().await
    }

    /// Remove a workspace; unknown IDs are a no-op
    pub async fn cleanup_workspace(&self, workspace_id: &WorkspaceId) -> Result<()> {
        self.inner.workspaces.cleanup(workspace_id).await
    }

    /// Number of subprocesses currently in flight
    #[must_use]
    pub fn active_processes(&self) -> usize {
        self.inner.executor.active_processes()
    }

    /// Shut the client down: cancel in-flight executions and, when
    /// configured, remove all tracked workspaces. Idempotent; every other
    /// operation fails with [`ClaudeError::ClientClosed`] afterwards.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::info!("Closing client");
        self.inner.executor.cleanup().await;
        if self.inner.config.workspace_cleanup_on_exit {
            self.inner.workspaces.cleanup_all().await?;
        }
        Ok(())
    }

    pub(crate) fn tracker(&self) -> &SessionTracker {
        &self.inner.sessions
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ClaudeError::ClientClosed);
        }
        Ok(())
    }

    fn remember_session(&self, session_id: &SessionId) {
        self.inner.sessions.touch(session_id);
        *self.inner.last_session_id.lock() = Some(session_id.clone());
    }

    async fn execute_with_retry(
        &self,
        argv: &[String],
        opts: &ExecOptions,
    ) -> Result<CommandResult> {
        let retry = RetryConfig {
            max_retries: self.inner.config.max_retries,
            base_delay: self.inner.config.retry_delay,
            ..RetryConfig::default()
        };
        retry_with_backoff(&retry, |_| {
            self.inner.executor.execute(argv, opts.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(cli_path: &str) -> ClaudeClient {
        let config = ClaudeConfig::builder()
            .cli_path(cli_path)
            .max_retries(0)
            .build();
        ClaudeClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn closed_client_rejects_queries() {
        let client = client_for("echo");
        client.close().await.unwrap();

        let err = client
            .query("hello", QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClaudeError::ClientClosed));
        assert!(matches!(
            client.command_builder().unwrap_err(),
            ClaudeError::ClientClosed
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let client = client_for("echo");
        client.close().await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_construction() {
        let config = ClaudeConfig::builder().cli_path("").build();
        assert!(ClaudeClient::new(config).is_err());
    }

    #[tokio::test]
    async fn query_against_echo_degrades_to_plain_text() {
        // `echo` just prints its arguments, exercising the raw-stdout
        // degradation path end to end.
        let client = client_for("echo");
        let config = client.config().clone();
        assert!(!config.safe_mode);

        let response = client
            .query("hello there", QueryOptions::default())
            .await
            .unwrap();
        assert!(response.content.contains("hello there"));
        assert!(response.session_id.is_none());
        assert_eq!(response.metadata.exit_code, 0);
    }

    #[tokio::test]
    async fn raw_transcript_scrapes_session_through_execute_command() {
        // A stand-in CLI that ignores its arguments and prints a fixed
        // stream-json transcript.
        let script = r#"printf '%s\n' \
            '{"type":"system","subtype":"init","session_id":"sess-1"}' \
            '{"type":"result","is_error":false,"result":"done","session_id":"sess-1"}'"#;
        let config = ClaudeConfig::builder()
            .cli_path("sh")
            .max_retries(0)
            .build();
        let client = ClaudeClient::new(config).unwrap();

        // Bypass the builder so `sh -c <script>` runs directly.
        let argv: Vec<String> = vec!["sh".into(), "-c".into(), script.into()];
        let result = client
            .execute_command(&argv, ExecOptions::default())
            .await
            .unwrap();
        let parsed = crate::parser::parse_transcript(&result.stdout);
        assert_eq!(parsed.session_id.as_deref(), Some("sess-1"));
        assert_eq!(parsed.content, "done");
    }

    #[tokio::test]
    async fn sessions_are_tracked_and_terminated_on_drop() {
        let client = client_for("echo");
        let session = client.resume_session(SessionId::from("s-9")).unwrap();
        assert_eq!(session.id().map(SessionId::as_str), Some("s-9"));

        let info = client.get_session(&SessionId::from("s-9")).unwrap();
        assert_eq!(info.status, crate::types::SessionStatus::Created);

        drop(session);
        let info = client.get_session(&SessionId::from("s-9")).unwrap();
        assert_eq!(info.status, crate::types::SessionStatus::Terminated);
    }
}
