//! Async SDK for driving the Claude CLI as a subprocess.
//!
//! The CLI owns authentication and conversation state; this crate owns the
//! plumbing around it: building argument vectors, spawning the process with a
//! sanitized environment, enforcing deadlines with graceful termination,
//! streaming output, retrying transient failures, and scraping session IDs
//! out of the CLI's stream-json output so conversations can be resumed.
//!
//! # Quick start
//!
//! ```no_run
//! use claude_cli_sdk::{ClaudeClient, ClaudeConfig, QueryOptions};
//!
//! # async fn run() -> claude_cli_sdk::Result<()> {
//! let client = ClaudeClient::new(ClaudeConfig::default())?;
//! let response = client.query("What is 2 + 2?", QueryOptions::default()).await?;
//! println!("{}", response.content);
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Sessions
//!
//! ```no_run
//! use claude_cli_sdk::{ClaudeClient, ClaudeConfig};
//!
//! # async fn run() -> claude_cli_sdk::Result<()> {
//! let client = ClaudeClient::new(ClaudeConfig::default())?;
//! let mut session = client.create_session()?;
//! session.query("My name is Ada.").await?;
//! let reply = session.query("What is my name?").await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod parser;
pub mod retry;
pub mod session;
pub mod subprocess;
pub mod types;
pub mod workspace;

pub use client::{ClaudeClient, QueryOptions, SessionQueryOptions};
pub use config::{ClaudeConfig, ClaudeConfigBuilder};
pub use error::{ClaudeError, Result};
pub use parser::{ParsedTranscript, parse_transcript};
pub use retry::{CircuitBreaker, CircuitState, RetryConfig, retry_with_backoff};
pub use session::Session;
pub use subprocess::{CommandBuilder, ExecOptions, SubprocessExecutor};
pub use types::{
    ClaudeResponse, CommandResult, ContentBlock, OutputFormat, ResponseMetadata,
    SessionAwareResponse, SessionId, SessionInfo, SessionStatus, StreamChunk, StreamEvent,
    StreamSource, WorkspaceId, WorkspaceInfo,
};
pub use workspace::WorkspaceManager;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
