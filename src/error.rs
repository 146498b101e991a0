//! Error types for the Claude CLI SDK

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the Claude CLI SDK
#[derive(Error, Debug)]
pub enum ClaudeError {
    /// Claude CLI executable not found or not installed
    #[error("Claude CLI not found: {0}")]
    CliNotFound(String),

    /// Connection-level failure while talking to the child process
    #[error("Connection error: {0}")]
    Connection(String),

    /// Command exited with a non-zero exit code
    #[error("Command `{command}` failed with exit code {exit_code}")]
    Process {
        /// The command line that was executed
        command: String,
        /// Process exit code
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Command did not finish before its deadline
    #[error("Command `{command}` timed out after {timeout:?}")]
    Timeout {
        /// The command line that was executed
        command: String,
        /// The configured deadline
        timeout: Duration,
    },

    /// Command rejected by the configured allow-list
    #[error("Command not allowed: {0}")]
    CommandRejected(String),

    /// Authentication failure reported by the CLI; never retried
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limit reported by the CLI, with an optional server backoff hint
    #[error("Rate limit exceeded")]
    RateLimit {
        /// Server-supplied minimum delay before retrying
        retry_after: Option<Duration>,
    },

    /// Workspace directory could not be created
    #[error("Failed to create workspace at {path}: {reason}")]
    WorkspaceCreation {
        /// Path that could not be created
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Workspace directory could not be removed
    #[error("Failed to clean up workspace at {path}: {reason}")]
    WorkspaceCleanup {
        /// Path that could not be removed
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// JSON decode error when parsing CLI output
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted on a closed client
    #[error("Client is closed")]
    ClientClosed,

    /// Circuit breaker is open and rejecting calls
    #[error("Circuit breaker is open; retry after {recovery_timeout:?}")]
    CircuitOpen {
        /// Time the breaker waits before allowing a trial call
        recovery_timeout: Duration,
    },
}

/// Result type alias for Claude CLI SDK operations
pub type Result<T> = std::result::Result<T, ClaudeError>;

impl ClaudeError {
    /// Create a CLI not found error naming the attempted executable
    pub fn cli_not_found(program: impl Into<String>) -> Self {
        Self::CliNotFound(format!(
            "`{}` was not found on PATH. Install the Claude CLI with:\n\
             npm install -g @anthropic-ai/claude-code",
            program.into()
        ))
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a process error
    pub fn process(
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Process {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout,
        }
    }

    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    #[must_use]
    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimit { retry_after }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the retry policy may re-attempt the failed operation.
    ///
    /// Process failures are deterministic more often than not, so they are
    /// excluded here and opted into separately via
    /// [`RetryConfig::retry_execution_failures`](crate::retry::RetryConfig).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimit { .. } | Self::Connection(_) | Self::Io(_)
        )
    }
}
