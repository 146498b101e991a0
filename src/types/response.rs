//! Execution results, responses, and bookkeeping records

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identifiers::{SessionId, WorkspaceId};

/// Output formats accepted by the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// Single JSON document
    Json,
    /// One JSON object per output line
    StreamJson,
}

impl OutputFormat {
    /// CLI flag value for this format
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::StreamJson => "stream-json",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Text
    }
}

/// Result of one buffered command execution. Produced exactly once per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Process exit code
    pub exit_code: i32,
    /// Decoded standard output
    pub stdout: String,
    /// Decoded standard error
    pub stderr: String,
    /// Wall-clock execution time
    pub duration: Duration,
    /// The command line that was executed
    pub command: String,
    /// When the command completed
    pub timestamp: DateTime<Utc>,
}

impl CommandResult {
    /// Whether the command exited with code 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Origin stream of a [`StreamChunk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    /// Child process standard output
    Stdout,
    /// Child process standard error
    Stderr,
}

/// One chunk of streamed output, in arrival order.
///
/// Chunks from stdout and stderr are interleaved by arrival; no ordering is
/// promised between the two streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Decoded chunk content
    pub content: String,
    /// Which stream the chunk came from
    pub source: StreamSource,
    /// When the chunk was read
    pub timestamp: DateTime<Utc>,
}

impl StreamChunk {
    /// Chunk stamped with the current time
    #[must_use]
    pub fn new(content: String, source: StreamSource) -> Self {
        Self {
            content,
            source,
            timestamp: Utc::now(),
        }
    }
}

/// Response from a plain query
#[derive(Debug, Clone)]
pub struct ClaudeResponse {
    /// Response content
    pub content: String,
    /// Session ID, when one was supplied or recovered
    pub session_id: Option<SessionId>,
    /// Execution metadata
    pub metadata: ResponseMetadata,
}

/// Response from a session-aware query, with the extracted session ID and the
/// raw terminal event when one was observed
#[derive(Debug, Clone)]
pub struct SessionAwareResponse {
    /// Best-known response content
    pub content: String,
    /// Session ID recovered from the event stream
    pub session_id: Option<SessionId>,
    /// Full terminal `result` record, when present
    pub raw_json: Option<Value>,
    /// Execution metadata
    pub metadata: ResponseMetadata,
}

/// Metadata attached to every response
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Process exit code
    pub exit_code: i32,
    /// Wall-clock execution time
    pub duration: Duration,
    /// The command line that was executed
    pub command: String,
    /// Output format requested from the CLI
    pub output_format: Option<OutputFormat>,
    /// Session ID that was resumed, if any
    pub resumed_session: Option<SessionId>,
    /// Whether the terminal event flagged an error
    pub is_error: bool,
    /// Error text from the terminal event, when flagged
    pub error: Option<String>,
    /// Output lines that failed to decode as JSON during scraping
    pub skipped_lines: usize,
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not yet used
    Created,
    /// At least one query has run
    Active,
    /// Dropped or explicitly closed
    Terminated,
}

/// Bookkeeping record for a client-managed session.
///
/// The CLI owns the actual conversation state; this record only tracks the
/// identifier the client replays on resumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub session_id: SessionId,
    /// Current lifecycle state
    pub status: SessionStatus,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// Last time a query ran in this session
    pub last_activity: DateTime<Utc>,
}

/// Record of an isolated workspace directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    /// Workspace identifier
    pub workspace_id: WorkspaceId,
    /// Directory backing the workspace
    pub path: PathBuf,
    /// When the workspace was created
    pub created_at: DateTime<Utc>,
    /// Total size of copied files in bytes
    pub size_bytes: u64,
    /// Number of files in the workspace
    pub file_count: u64,
}
